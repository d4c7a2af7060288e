//! Helpers for testing the web server and the service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using a [`Server`], hold on to it until all requests to it have been made. Dropping
//!    the server stops it, and further connections are refused.
//!
//!  - Tests against a real Redis server only run if `BOOKCACHE_TEST_REDIS_URL` is set. Start
//!    such tests with [`redis_or_skip!`].

use std::net::{SocketAddr, TcpListener};

use axum::Router;
use reqwest::Url;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Environment variable with the URL of a Redis server for tests.
pub const REDIS_URL_ENV: &str = "BOOKCACHE_TEST_REDIS_URL";

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the bookcache crates and mutes all
///    other logs (such as hyper or redis).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("bookcache_service=trace,bookcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Returns the URL of the Redis server to test against, if one is configured.
pub fn redis_url() -> Option<String> {
    std::env::var(REDIS_URL_ENV)
        .ok()
        .filter(|url| !url.is_empty())
}

/// Returns early from a test if no Redis server is configured.
#[macro_export]
macro_rules! redis_or_skip {
    () => {
        if $crate::redis_url().is_none() {
            println!(
                "Skipping test, set {} to run it against Redis",
                $crate::REDIS_URL_ENV
            );
            return;
        }
    };
}

/// A HTTP server on an ephemeral local port, running for as long as it is held.
///
/// Must be created from within a tokio runtime.
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl Server {
    /// Serves the given router.
    pub fn new(router: Router) -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let server = axum_server::from_tcp(listener).serve(router.into_make_service());
        let handle = tokio::spawn(async move {
            server.await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://{}/{}", self.socket, path).parse().unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
