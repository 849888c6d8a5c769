//! Built-in middleware.
//!
//! Middleware is any [`Handler`](crate::Handler) that calls
//! [`Context::next`](crate::Context::next). These are the cross-cutting ones
//! most services want on the root router.

mod logger;

pub use logger::Logger;
