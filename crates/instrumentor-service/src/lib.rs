//! Core of the instrumentor: a request-coalescing cache for instrumented sources,
//! invalidated by filesystem changes.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod instrument;
pub mod services;
pub mod watcher;
