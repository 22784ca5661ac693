//! # Injected TTL Cache
//!
//! Short-lived cache for provider query results and derived health rollups.
//!
//! ```text
//! Arc<dyn CacheService>
//!   ├── MokaCacheService   <- in-process, per-entry TTL
//!   └── NoOpCacheService   <- always-miss, for callers that opt out
//! ```
//!
//! Keys are derived from entity and host identity (see [`keys`]) so that
//! invalidating one stack never touches another. Invalidation is explicit:
//! the task that mutates an entity invalidates its keys before returning.

pub mod errors;
pub mod keys;
pub mod providers;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use providers::{MokaCacheService, NoOpCacheService};
pub use traits::{get_json, set_json, CacheService};
