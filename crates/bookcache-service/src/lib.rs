//! Read-through caching for a slow, rate-limited book search API.
//!
//! The interesting parts live in [`caching`]: probabilistic early recomputation on top of a
//! shared store, single-flight recomputation guarded by a distributed lock, and a circuit
//! breaker that routes around the store when it fails. [`search`] contains the upstream
//! adapters, and [`services`] wires everything together.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod search;
pub mod services;
