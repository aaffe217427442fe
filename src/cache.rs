//! Normalized multi-credential token cache.
//!
//! Records are keyed by [`CacheKey`] strings and stored by [`TokenCacheAccessor`];
//! [`TokenCache`] layers the lookup and write-back rules on top and flushes the serialized state
//! through a [`CachePersistence`] adapter after each mutation.

pub mod accessor;
pub mod item;
pub mod key;
pub mod orchestrator;
pub mod persistence;

pub use accessor::*;
pub use item::*;
pub use key::*;
pub use orchestrator::*;
pub use persistence::*;
