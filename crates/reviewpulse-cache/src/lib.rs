// Per-account cache stores
// Keeps the last computed result sets around between runs

pub mod cache;
pub mod file_store;

pub use cache::{CacheError, CacheManager, CacheStore, Result};
pub use file_store::FileCacheStore;
