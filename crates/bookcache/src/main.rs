//! Bookcache.
//!
//! Bookcache is a web service that answers book searches from a shared cache in front of a slow,
//! rate-limited search API. Entries are refreshed ahead of their expiry by a single caller at a
//! time, and a circuit breaker routes around the cache when its store fails.

#![warn(
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;


#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
