//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Error;
use crate::pool::DEFAULT_POOL_CAPACITY;

/// Settings handed to [`Server::new`](crate::Server::new).
///
/// ```rust
/// use std::time::Duration;
/// use trellis::Config;
///
/// let config = Config::bind("0.0.0.0:3000")?
///     .pool_capacity(256)
///     .shutdown_grace(Duration::from_secs(25));
/// # Ok::<(), trellis::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) addr: SocketAddr,
    pub(crate) pool_capacity: usize,
    pub(crate) shutdown_grace: Option<Duration>,
}

impl Config {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, pool_capacity: DEFAULT_POOL_CAPACITY, shutdown_grace: None }
    }

    /// Parses a `host:port` string.
    pub fn bind(addr: &str) -> Result<Self, Error> {
        addr.parse()
            .map(Self::new)
            .map_err(|_| Error::InvalidAddress(addr.to_owned()))
    }

    /// Upper bound on idle request contexts kept for reuse. Contexts released
    /// beyond it are dropped.
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// How long to wait for in-flight connections after a shutdown signal.
    /// Without a grace period the server waits for all of them.
    ///
    /// On Kubernetes keep this below `terminationGracePeriodSeconds`.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    pub fn addr(&self) -> SocketAddr { self.addr }
}
