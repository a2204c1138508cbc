//! # Instrumentor Caching infrastructure
//!
//! Instrumenting a source file is expensive, and a test page typically requests the same set of
//! files over and over again, often many of them concurrently. This module contains the
//! in-memory cache that makes this cheap, and the plumbing that keeps it in sync with the files
//! on disk.
//!
//! ## Request Coalescing
//!
//! The [`CoalescingCache`] guarantees that at most one load per key is running at any time.
//! A request goes through the following steps:
//!
//! - If a value for the key is cached, it is returned right away.
//! - Otherwise the request is queued up as a waiter for the key.
//! - If no load for the key is in flight, one is spawned using the [`ExternalLoader`].
//! - Once the load completes, a successful value is stored, and every queued waiter receives
//!   the very same result, in the order the waiters were queued.
//!
//! Errors are never cached. A failed load is reported to all of its waiters, and the next
//! request for the key starts a fresh load.
//!
//! ## Invalidation
//!
//! Cached values are kept for the lifetime of the process, unless they are invalidated. The
//! [`InvalidatingCache`] subscribes to a [`ChangeWatcher`](crate::watcher::ChangeWatcher) and
//! removes the entry belonging to every changed file, as determined by its [`KeyScheme`].
//! Request paths and changed files have to agree on their keys, which is why both go through
//! [`normalize_key`].
//!
//! A file that changes while it is being loaded might have been read before the change. The
//! result of such a load is still handed to its waiters, but it is not stored, so the next
//! request loads the file again.
//!
//! ### Metrics
//!
//! Each of these metrics is tagged with a `cache` field corresponding to the loader name:
//!
//! - `caches.access`: All accesses.
//! - `caches.memory.hit`: Accesses served by a cached value.
//! - `caches.channel.hit`: Accesses that joined a load already in flight.
//! - `caches.computation`: Loads actually being run.
//! - `caches.load.error`: Failed loads, additionally tagged with the `error` kind.
//! - `caches.invalidation`: Invalidations, tagged with whether a value was `cached`.

mod cache_error;
mod cache_key;
mod invalidation;
mod memory;
mod store;

pub use cache_error::{LoadError, LoadResult};
pub use cache_key::normalize_key;
pub use invalidation::{InvalidatingCache, KeyScheme};
pub use memory::{CoalescingCache, ExternalLoader, PlaceholderLoader};
pub use store::{KeyedStore, PendingTracker};
