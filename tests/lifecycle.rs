//! End-to-end request lifecycle: reset/done ordering, chain control flow,
//! panics, cancellation and context reuse, driven through `Router::dispatch`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trellis::{AppContext, BoxFuture, Context, Method, Request, Router, StatusCode};

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    log: Log,
    handle: Option<u32>,
    next_handle: u32,
}

impl Recorder {
    fn push(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_owned());
    }
}

impl AppContext for Recorder {
    fn reset(&mut self, req: &Request) {
        self.next_handle += 1;
        self.handle = Some(self.next_handle);
        self.push(&format!("reset {}", req.path()));
        if req.path() == "/reset-boom" {
            panic!("reset failed");
        }
    }

    fn done(&mut self) {
        self.handle = None;
        self.push("done");
    }
}

fn app(log: &Log) -> Router<Recorder> {
    let log = Arc::clone(log);
    Router::with_app_context(move || Recorder { log: Arc::clone(&log), handle: None, next_handle: 0 })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn outer(c: &mut Context<Recorder>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.app().push("outer before");
        c.next().await;
        c.app().push("outer after");
    })
}

fn inner(c: &mut Context<Recorder>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.app().push("inner before");
        c.next().await;
        c.app().push("inner after");
    })
}

fn gate(c: &mut Context<Recorder>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.app().push("gate");
        c.response().set_status(StatusCode::FORBIDDEN);
    })
}

fn handler(c: &mut Context<Recorder>) -> BoxFuture<'_> {
    Box::pin(async move {
        assert!(c.app().handle.is_some(), "reset must run before the handler");
        c.app().push("handler");
        c.response().text("ok");
    })
}

fn explode(c: &mut Context<Recorder>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.response().write_str("partial");
        panic!("boom");
    })
}

fn faulty(c: &mut Context<Recorder>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.app().push("faulty");
        panic!("middleware failed");
    })
}

fn stall(c: &mut Context<Recorder>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.app().push("stall");
        std::future::pending::<()>().await;
    })
}

#[tokio::test]
async fn chain_runs_in_order_between_reset_and_done() {
    let log = Log::default();
    let app = app(&log)
        .middleware(outer)
        .group("/g", |g| {
            g.middleware(inner).get("/x", handler);
        });

    let res = app.dispatch(Request::new(Method::Get, "/g/x")).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), b"ok");
    assert_eq!(entries(&log), [
        "reset /g/x",
        "outer before",
        "inner before",
        "handler",
        "inner after",
        "outer after",
        "done",
    ]);
}

#[tokio::test]
async fn short_circuit_skips_the_rest() {
    let log = Log::default();
    let app = app(&log).middleware(outer).group("/admin", |admin| {
        admin.middleware(gate).middleware(inner).get("", handler);
    });

    let res = app.dispatch(Request::new(Method::Get, "/admin")).await;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(res.body().is_empty());
    assert_eq!(entries(&log), ["reset /admin", "outer before", "gate", "outer after", "done"]);
}

#[tokio::test]
async fn panics_become_500_and_still_run_done() {
    let log = Log::default();
    let app = app(&log).middleware(outer).get("/boom", explode).get("/fine", handler);

    let res = app.dispatch(Request::new(Method::Get, "/boom")).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.body().is_empty(), "partial output is discarded");
    // The panic unwinds through `outer`, so its post-next half never runs.
    assert_eq!(entries(&log), ["reset /boom", "outer before", "done"]);

    // The recycled context serves the next request normally.
    log.lock().unwrap().clear();
    let res = app.dispatch(Request::new(Method::Get, "/fine")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), b"ok");
    assert_eq!(entries(&log).last().map(String::as_str), Some("done"));
}

#[tokio::test]
async fn dropped_request_still_runs_done() {
    let log = Log::default();
    let app = app(&log).get("/slow", stall);

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        app.dispatch(Request::new(Method::Get, "/slow")),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(entries(&log), ["reset /slow", "stall", "done"]);
}

#[tokio::test]
async fn reused_context_starts_clean() {
    fn leaky(c: &mut Context<Recorder>) -> BoxFuture<'_> {
        Box::pin(async move {
            c.response().set_status(StatusCode::ACCEPTED).header("x-leak", "1").write_str("first");
        })
    }

    fn observer(c: &mut Context<Recorder>) -> BoxFuture<'_> {
        Box::pin(async move {
            assert!(c.param("id").is_none());
            assert!(!c.response_ref().is_written());
            assert_eq!(c.response_ref().status(), StatusCode::OK);
            assert!(c.response_ref().get_header("x-leak").is_none());
            c.response().write_str("second");
        })
    }

    let log = Log::default();
    let app = app(&log).get("/a/:id", leaky).get("/b", observer);

    let first = app.dispatch(Request::new(Method::Get, "/a/1")).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app.dispatch(Request::new(Method::Get, "/b")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.body(), b"second");
    assert!(second.header("x-leak").is_none());
}

#[tokio::test]
async fn reset_and_done_bracket_every_request() {
    let log = Log::default();
    let app = Arc::new(app(&log).get("/", handler));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let app = Arc::clone(&app);
        tasks.spawn(async move { app.dispatch(Request::new(Method::Get, "/")).await });
    }
    while let Some(res) = tasks.join_next().await {
        assert_eq!(res.unwrap().body(), b"ok");
    }

    let log = entries(&log);
    assert_eq!(log.iter().filter(|e| e.starts_with("reset")).count(), 32);
    assert_eq!(log.iter().filter(|e| *e == "done").count(), 32);
    assert_eq!(log.iter().filter(|e| *e == "handler").count(), 32);
}

#[tokio::test]
async fn middleware_panic_before_next_still_runs_done_once() {
    let log = Log::default();
    let app = app(&log).group("/mw", |g| {
        g.middleware(faulty).get("", handler);
    });

    let res = app.dispatch(Request::new(Method::Get, "/mw")).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(entries(&log), ["reset /mw", "faulty", "done"]);
}

#[tokio::test]
async fn reset_panic_skips_the_chain_but_runs_done_once() {
    let log = Log::default();
    let app = app(&log).middleware(outer).get("/reset-boom", handler);

    let res = app.dispatch(Request::new(Method::Get, "/reset-boom")).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(entries(&log), ["reset /reset-boom", "done"]);
}

/// Globals whose `done` hook fails on its first run only.
struct FlakyDone {
    done_calls: Arc<AtomicUsize>,
}

impl AppContext for FlakyDone {
    fn reset(&mut self, _req: &Request) {}

    fn done(&mut self) {
        if self.done_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("done failed");
        }
    }
}

fn flaky_ok(c: &mut Context<FlakyDone>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.response().text("ok");
    })
}

#[tokio::test]
async fn done_panic_becomes_500_and_next_request_is_served() {
    let done_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&done_calls);
    let app = Router::with_app_context(move || FlakyDone { done_calls: Arc::clone(&calls) })
        .get("/", flaky_ok);

    let first = app.dispatch(Request::new(Method::Get, "/")).await;
    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(first.body().is_empty());
    assert_eq!(done_calls.load(Ordering::SeqCst), 1, "a failed done hook is not retried");

    let second = app.dispatch(Request::new(Method::Get, "/")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.body(), b"ok");
    assert_eq!(done_calls.load(Ordering::SeqCst), 2);
}
