//! Application globals, a logging middleware and nested groups in one file.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example all_in_one
//!
//! Try:
//!   curl http://localhost:3007/
//!   curl http://localhost:3007/users
//!   curl http://localhost:3007/users/42
//!   curl http://localhost:3007/users/42/profile

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;
use trellis::middleware::Logger;
use trellis::{AppContext, BoxFuture, Config, Context, Request, Router, Server};

/// Stand-in for a database pool: hands out numbered connections.
#[derive(Default)]
struct Database {
    opened: AtomicU64,
}

impl Database {
    fn connect(&self) -> u64 {
        self.opened.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Everything a handler needs besides the request itself.
struct Globals {
    db: Arc<Database>,
    /// Per-request connection; opened in `reset`, closed in `done`.
    conn: Option<u64>,
}

impl AppContext for Globals {
    fn reset(&mut self, _req: &Request) {
        self.conn = Some(self.db.connect());
    }

    fn done(&mut self) {
        if let Some(conn) = self.conn.take() {
            info!(conn, "connection released");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), trellis::Error> {
    tracing_subscriber::fmt::init();

    let db = Arc::new(Database::default());
    let app = Router::with_app_context(move || Globals { db: Arc::clone(&db), conn: None })
        .middleware(Logger::default())
        .get("/", home)
        .group("/users", |users| {
            users.get("", list_users);
            users.group("/:id", |user| {
                user.get("", show_user);
                user.get("/profile", user_profile);
            });
        });

    Server::new(Config::bind("0.0.0.0:3007")?).serve(app).await
}

// GET /
fn home(c: &mut Context<Globals>) -> BoxFuture<'_> {
    Box::pin(async move {
        info!(conn = ?c.app().conn, "found user");
        c.response().text("Welcome Home");
    })
}

// GET /users
fn list_users(c: &mut Context<Globals>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.response().text("Users");
    })
}

// GET /users/:id
fn show_user(c: &mut Context<Globals>) -> BoxFuture<'_> {
    Box::pin(async move {
        let id = c.param("id").unwrap_or_default().to_owned();
        c.response().text(&format!("Welcome user with id {id}"));
    })
}

// GET /users/:id/profile
fn user_profile(c: &mut Context<Globals>) -> BoxFuture<'_> {
    Box::pin(async move {
        let id = c.param("id").unwrap_or_default().to_owned();
        let conn = c.app().conn.unwrap_or_default();
        c.response().text(&format!("Here's the profile of user {id} (via connection {conn})"));
    })
}
