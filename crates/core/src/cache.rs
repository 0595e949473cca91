//! Response caching.

mod cached;
mod key;
mod store;

pub use cached::CachedCompleter;
pub use key::CacheKey;
pub use store::{CacheStore, FileCacheStore};
