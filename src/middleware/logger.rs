//! Access logging.

use std::time::Instant;

use tracing::{Level, event};

use crate::app::AppContext;
use crate::context::Context;
use crate::handler::{BoxFuture, Handler};

/// Logs one event per request with method, status, path, matched route and
/// the time spent downstream of this middleware.
///
/// Register it first so the timing covers every later middleware and the
/// handler, and so not-found requests are logged too:
///
/// ```rust
/// use trellis::{Router, middleware::Logger};
/// use tracing::Level;
///
/// let app = Router::new().middleware(Logger::new(Level::DEBUG));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Logger {
    level: Level,
}

impl Logger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl<G: AppContext> Handler<G> for Logger {
    fn call<'a>(&'a self, c: &'a mut Context<G>) -> BoxFuture<'a> {
        Box::pin(async move {
            let start = Instant::now();
            c.next().await;
            let elapsed = start.elapsed();

            let method = c.method();
            let status = c.response_ref().status().as_u16();
            let path = c.path();
            let route = c.route().unwrap_or("-");

            // `event!` needs the level as a constant.
            macro_rules! log_at {
                ($lvl:expr) => {
                    event!($lvl, %method, status, path, route, ?elapsed, "request")
                };
            }
            if self.level == Level::ERROR {
                log_at!(Level::ERROR);
            } else if self.level == Level::WARN {
                log_at!(Level::WARN);
            } else if self.level == Level::INFO {
                log_at!(Level::INFO);
            } else if self.level == Level::DEBUG {
                log_at!(Level::DEBUG);
            } else {
                log_at!(Level::TRACE);
            }
        })
    }
}
