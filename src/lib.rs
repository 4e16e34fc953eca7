//! # SusyDB - An In-Memory Key-Value Database
//!
//! SusyDB is a small in-memory database serving a line- and array-framed text
//! protocol compatible with common cache clients. It stores plain strings
//! (with optional TTL and counter semantics) and field-addressed hashes, and
//! carries a publish/subscribe bus for message fan-out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           SusyDB                             │
//! │                                                              │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐            │
//! │  │  Listener  │──▶│  Session   │──▶│  Command   │            │
//! │  │ (semaphore)│   │   loop     │   │  handler   │            │
//! │  └────────────┘   └────────────┘   └─────┬──────┘            │
//! │                                          │                   │
//! │                                          ▼                   │
//! │  ┌────────────┐   ┌───────────────────────────────────────┐  │
//! │  │  Request   │   │                Store                  │  │
//! │  │  parser    │   │  32 × RwLock shard   ┌─────┐          │  │
//! │  └────────────┘   │  keys + sample index │ Hub │ (pub/sub)│  │
//! │                   └──────────▲───────────┴─────┴──────────┘  │
//! │                              │                               │
//! │                   ┌──────────┴───────────┐                   │
//! │                   │       Expirer        │                   │
//! │                   │ (probabilistic sweep)│                   │
//! │                   └──────────────────────┘                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Embedded use
//!
//! The storage engine works without the server in front of it:
//!
//! ```
//! use susydb::storage::Store;
//! use bytes::Bytes;
//!
//! let store = Store::new();
//! store.set(Bytes::from("greeting"), Bytes::from("hello")).unwrap();
//! assert_eq!(
//!     store.get(&Bytes::from("greeting")).unwrap(),
//!     Some(Bytes::from("hello"))
//! );
//! assert_eq!(store.incr_by(&Bytes::from("visits"), 1).unwrap(), 1);
//! ```
//!
//! ## Module overview
//!
//! - [`storage`]: sharded keyspace, TTL expirer, pub/sub hub
//! - [`protocol`]: request framing and reply encoding
//! - [`commands`]: name → handler dispatch
//! - [`connection`]: per-client session loop
//!
//! ## Expiry
//!
//! Keys with a TTL are reclaimed two ways: **lazily**, when a reader finds
//! them dead, and **actively**, by a background task that samples random keys
//! per shard and keeps sampling any shard where a quarter of the sample had
//! expired. The active path keeps memory bounded even for keys nobody reads.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionError};
pub use protocol::{parse_request, ParseError, Reply};
pub use storage::{start_expirer, Expirer, Hub, Store, StoreError, Subscription};

/// The default listen address.
pub const DEFAULT_ADDR: &str = ":7379";

/// Crate version, reported by INFO.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
