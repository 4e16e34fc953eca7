//! Storage Module
//!
//! The in-memory heart of SusyDB: a sharded keyspace with TTL support, the
//! background expirer that reaps dead keys, and the pub/sub hub.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐     ┌─────────┐        │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ ... │ Shard 31│        │
//! │  └─────────┘ └─────────┘ └─────────┘     └─────────┘        │
//! │                        ┌─────┐                              │
//! │                        │ Hub │  (pub/sub fan-out)           │
//! │                        └─────┘                              │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ random sampling
//!              ┌─────────────┴─────────────┐
//!              │          Expirer          │
//!              │   (background tokio task) │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use susydb::storage::Store;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let store = Store::new();
//!
//! store.set(Bytes::from("name"), Bytes::from("Suhaan")).unwrap();
//! assert_eq!(
//!     store.get(&Bytes::from("name")).unwrap(),
//!     Some(Bytes::from("Suhaan"))
//! );
//!
//! store
//!     .set_with_ttl(Bytes::from("session"), Bytes::from("token"), Duration::from_secs(3600))
//!     .unwrap();
//!
//! assert_eq!(store.incr_by(&Bytes::from("visits"), 1).unwrap(), 1);
//! ```

pub mod engine;
pub mod expiry;
pub mod pubsub;

pub use engine::{Entry, Store, StoreError, Value};
pub use expiry::{start_expirer, Expirer};
pub use pubsub::{Hub, Subscription};
