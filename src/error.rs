//! Unified error types.

use thiserror::Error;

/// The error type returned by trellis's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP responses
/// written through the [`Context`](crate::Context), not as `Error`s. This type
/// surfaces infrastructure failures: parsing the bind address, binding to a
/// port, or a route table that cannot be built.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// A route that was rejected while the tree was being built.
///
/// Registration happens once at startup, so these are reported immediately
/// and loudly: [`Router`](crate::Router) and [`Group`](crate::Group) panic
/// with the rendered message rather than letting a bad table reach `serve`.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid route `{path}`: duplicate parameter `{name}`")]
    DuplicateParam { path: String, name: String },

    #[error("invalid route `{path}`: {source}")]
    Conflict {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_errors_name_the_path() {
        let err = RouteError::DuplicateParam {
            path: "/a/:id/b/:id".to_owned(),
            name: "id".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "invalid route `/a/:id/b/:id`: duplicate parameter `id`"
        );

        let err: Error = RouteError::InvalidPath { path: "/a//b".to_owned(), reason: "empty segment" }.into();
        assert_eq!(err.to_string(), "invalid route `/a//b`: empty segment");
    }
}
