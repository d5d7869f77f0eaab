//! Folio cache system.
//!
//! One process-wide store shared by every content layer:
//!
//! - **downloaded**: raw file sets fetched from the content repository
//! - **compiled**: pages compiled from those file sets
//! - **mdx-page**: the resolved page handed to callers
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! capacity = 1000
//! ttl_seconds = 1209600
//! ```

mod config;
mod keys;
mod lock;
mod policy;
mod service;
mod store;
mod value;

pub use config::CacheConfig;
pub use keys::{ContentKey, KeyKind};
pub use policy::{FetchPolicy, Retention, Validation, Validator};
pub use service::{CacheFailure, CacheService};
pub use store::{CacheEntry, EntryStore, Freshness, PurgeReport};
pub use value::CacheValue;
