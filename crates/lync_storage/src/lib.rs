//! # Lync Storage
//!
//! Durable key-value storage for the Lync sync engine.
//!
//! Stores are **opaque byte stores** keyed by short strings. They do not
//! interpret the values they hold; the event log and the fetch cache own
//! their own document formats.
//!
//! ## Design Principles
//!
//! - Synchronous-looking `get` / `set` / `remove`
//! - A successful `set` is durable before it returns
//! - Must be `Send + Sync` so one store can back several services
//! - Last writer wins per key
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral state
//! - [`FileStore`] - One file per key inside a directory
//! - [`Namespaced`] - Wrapper that prefixes every key
//!
//! ## Example
//!
//! ```rust
//! use lync_storage::{InMemoryStore, PersistedStore};
//!
//! let store = InMemoryStore::new();
//! store.set("routes", b"[]").unwrap();
//! assert_eq!(store.get("routes").unwrap().as_deref(), Some(&b"[]"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod namespaced;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use namespaced::Namespaced;
pub use store::{validate_key, PersistedStore};
