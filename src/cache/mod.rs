//! Scorcio Session Store
//!
//! TTL-bounded key/value storage for serialized preview sessions, keyed by
//! session token. Values are opaque strings; last write wins. An idle
//! session silently expires after the configured TTL and later lookups
//! report it as missing.
//!
//! ## Configuration
//!
//! Store behavior is controlled via `scorcio.toml`:
//!
//! ```toml
//! [cache]
//! ttl_seconds = 3600
//! ```

mod config;
mod store;

pub use config::CacheConfig;
pub use store::{InMemorySessionStore, SessionStore, StoreError};
