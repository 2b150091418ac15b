//! Result caching for crawl queries.
//!
//! [`ResultCache`] memoizes whole crawl results under the query's cache key.
//! It sits on top of any [`CacheStore`]; a store failure degrades to a miss
//! and never fails the caller.

pub mod result_cache;
pub mod sqlite;
pub mod store;

pub use result_cache::ResultCache;
pub use sqlite::SqliteStore;
pub use store::{CacheStore, MemoryStore};
