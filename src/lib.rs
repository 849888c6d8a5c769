//! # trellis
//!
//! A small HTTP framework built around three ideas:
//!
//! - **Pooled request contexts.** Each request borrows a [`Context`] from a
//!   free-list and returns it afterwards. Buffers and the application's own
//!   globals object survive between requests; request data does not.
//! - **Explicit middleware chains.** Middleware is a handler that calls
//!   [`Context::next`] to run the rest of the chain, and can do work on both
//!   sides of that call, or skip it to short-circuit.
//! - **Nested route groups.** Groups carry a path prefix and a middleware
//!   stack. Routes are flattened at registration into a full path and a
//!   complete chain, so a request costs one radix-tree lookup.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use trellis::{AppContext, BoxFuture, Config, Context, Request, Router, Server};
//! use trellis::middleware::Logger;
//!
//! struct Globals {
//!     served: u64,
//! }
//!
//! impl AppContext for Globals {
//!     fn reset(&mut self, _req: &Request) { self.served += 1; }
//!     fn done(&mut self) {}
//! }
//!
//! fn user(c: &mut Context<Globals>) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let id = c.param("id").unwrap_or("unknown").to_owned();
//!         let served = c.app().served;
//!         c.response().text(&format!("user {id} (context used {served} times)"));
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trellis::Error> {
//!     let app = Router::with_app_context(|| Globals { served: 0 })
//!         .middleware(Logger::default())
//!         .group("/users", |users| {
//!             users.get("/:id", user);
//!         });
//!
//!     Server::new(Config::bind("0.0.0.0:3000")?).serve(app).await
//! }
//! ```

mod app;
mod config;
mod context;
mod dispatch;
mod error;
mod handler;
mod method;
mod path;
mod pool;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use app::AppContext;
pub use config::Config;
pub use context::Context;
pub use error::{Error, RouteError};
pub use handler::{BoxFuture, BoxedHandler, Handler, boxed};
pub use http::StatusCode;
pub use method::Method;
pub use pool::DEFAULT_POOL_CAPACITY;
pub use request::{Params, Request};
pub use response::{ContentType, Response, ResponseWriter};
pub use router::{Chain, Group, Resolution, Router};
pub use server::Server;
