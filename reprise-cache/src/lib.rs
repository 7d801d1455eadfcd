//! Inference cache for browser automation.
//!
//! Resolving a natural-language instruction to an element is slow, costly,
//! and non-deterministic. This crate stores the resolved element under a key
//! and replays it on later runs, falling back to fresh resolution when the
//! page has moved on.
//!
//! - [`CacheStore`]: injectable persisted mapping ([`JsonFileCache`], [`MemoryCache`])
//! - [`CachedExecutor`]: `act_with_cache`, `observe_with_cache`, `act_with_advanced_cache`
//! - [`derive_key`]: keys from URL, title, page text, and instruction
//! - [`Resolver`] / [`PageContext`]: what the executor needs from the browser layer
pub mod executor;
pub mod key;
pub mod page;
pub mod record;
pub mod store;

pub use executor::{AdvancedOptions, CachedExecutor, ExecutorOptions, ExecutorStats};
pub use key::{derive_key, derive_page_key};
pub use page::{PageContext, Resolver};
pub use record::{select_candidate, ActRequest, ActionRecord, CacheEntry};
pub use store::{CacheError, CacheStore, JsonFileCache, MemoryCache};
