//! Response state: the writer handlers fill in and the finished response
//! handed back to the transport.
//!
//! A [`ResponseWriter`] lives inside a pooled [`Context`](crate::Context) and
//! is cleared, not freed, between requests. When the chain completes its
//! contents are copied out into an owned [`Response`].

use bytes::Bytes;
use http::StatusCode;
use http::header::{HeaderName, HeaderValue};
use http_body_util::Full;
use tracing::warn;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseWriter::bytes`].
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    EventStream, // text/event-stream  (SSE)
    Html,        // text/html; charset=utf-8
    Json,        // application/json
    OctetStream, // application/octet-stream
    Text,        // text/plain; charset=utf-8
    Xml,         // application/xml
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The response-writing handle exposed to middleware and handlers.
///
/// Status defaults to `200 OK`. Writes append to the body, so a middleware
/// may write before or after [`Context::next`](crate::Context::next):
///
/// ```rust
/// use trellis::{BoxFuture, Context, StatusCode};
///
/// fn create(c: &mut Context) -> BoxFuture<'_> {
///     Box::pin(async move {
///         c.response()
///             .set_status(StatusCode::CREATED)
///             .header("location", "/users/99")
///             .json(br#"{"id":99}"#);
///     })
/// }
/// ```
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    written: bool,
}

impl ResponseWriter {
    pub(crate) fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Vec::new(),
            written: false,
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Whether anything (status, header or body) has been set this request.
    pub fn is_written(&self) -> bool { self.written }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self.written = true;
        self
    }

    /// Appends a header. Repeated names are sent as repeated lines.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self.written = true;
        self
    }

    /// Case-insensitive lookup of the first header named `name`.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Appends raw bytes to the body.
    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.body.extend_from_slice(bytes);
        self.written = true;
        self
    }

    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.write(s.as_bytes())
    }

    /// Sets `text/plain` and appends `body`.
    pub fn text(&mut self, body: &str) -> &mut Self {
        self.bytes(ContentType::Text, body.as_bytes())
    }

    /// Sets `application/json` and appends `body`. Bytes come from your
    /// serialiser of choice; trellis does not look at them.
    pub fn json(&mut self, body: &[u8]) -> &mut Self {
        self.bytes(ContentType::Json, body)
    }

    pub fn bytes(&mut self, content_type: ContentType, body: &[u8]) -> &mut Self {
        self.set_content_type(content_type);
        self.write(body)
    }

    fn set_content_type(&mut self, content_type: ContentType) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
        self.header("content-type", content_type.as_str());
    }

    /// Drops status, headers and body. Capacity is kept.
    pub(crate) fn clear(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.written = false;
    }

    /// Copies the current state out, leaving the buffers in place for reuse.
    pub(crate) fn snapshot(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::copy_from_slice(&self.body),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A finished response, detached from the pooled context that produced it.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    /// A response with no headers and no body.
    pub fn empty(status: StatusCode) -> Self {
        Self { status, headers: Vec::new(), body: Bytes::new() }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive lookup of the first header named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the type hyper sends. Headers that are not valid HTTP
    /// are dropped with a warning rather than failing the whole response.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(n), Ok(v)) => { headers.append(n, v); }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_is_replaced_not_duplicated() {
        let mut w = ResponseWriter::new();
        w.text("a").json(b"{}");
        let count = w.headers.iter().filter(|(k, _)| k == "content-type").count();
        assert_eq!(count, 1);
        assert_eq!(w.get_header("Content-Type"), Some("application/json"));
        assert_eq!(w.body(), b"a{}");
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut w = ResponseWriter::new();
        w.write(&[0u8; 512]).set_status(StatusCode::IM_A_TEAPOT);
        let cap = w.body.capacity();
        w.clear();
        assert!(w.body().is_empty());
        assert_eq!(w.status(), StatusCode::OK);
        assert!(!w.is_written());
        assert_eq!(w.body.capacity(), cap);
    }

    #[test]
    fn into_http_skips_bad_headers() {
        let mut w = ResponseWriter::new();
        w.header("x-ok", "1").header("bad header", "2").write_str("hi");
        let res = w.snapshot().into_http();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ok").unwrap(), "1");
        assert_eq!(res.headers().len(), 1);
    }
}
