//! # zerogpt-store
//!
//! Durable [`HistoryStore`](zerogpt_core::HistoryStore) implementations.
//!
//! ```rust,ignore
//! use zerogpt_store::SqliteHistoryStore;
//!
//! let store = SqliteHistoryStore::from_settings(&settings)?;
//! let agent = AgentBuilder::new()
//!     .provider(provider)
//!     .store(Arc::new(store))
//!     .user_id("alice")
//!     .build()?;
//! ```

pub mod sqlite;

pub use sqlite::SqliteHistoryStore;
