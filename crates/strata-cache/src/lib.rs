//! Strata Cache
//!
//! Memoization of task outputs. A [`CacheKeyDeriver`] fingerprints a task
//! invocation from its signature, its cache version, its inputs and the
//! caller's [`Scope`](strata_config::Scope). A [`CacheStore`] maps those keys
//! to previously produced outputs.
//!
//! There is no explicit invalidation: bumping a task's cache version or
//! changing its signature produces a different key, so stale entries are
//! simply never looked up again. [`CacheStore::clear`] is the only deletion.
//!
//! Backends:
//! - [`InMemoryCacheStore`] for tests and single-process use
//! - [`FsCacheStore`] for a local directory, one JSON file per key
//! - [`SqliteCacheStore`] for a durable store shared between processes

mod deriver;
mod error;
mod fs;
mod hash;
mod key;
mod memory;
mod sqlite;
mod store;

pub use deriver::CacheKeyDeriver;
pub use error::{CacheError, CacheKeyError};
pub use fs::FsCacheStore;
pub use hash::{ContentDigest, HashMethod, HashMethodRegistry};
pub use key::CacheKey;
pub use memory::InMemoryCacheStore;
pub use sqlite::SqliteCacheStore;
pub use store::{CacheStore, CachedOutputs};
