//! Connection Handling
//!
//! Each accepted socket is served by its own async task running the session
//! loop in [`handler`]. The listener in the server binary gates admission
//! with a semaphore; everything after acceptance lives here.
//!
//! ```text
//! listener ── accept ──▶ tokio::spawn(handle_connection(...))
//!                                │
//!                                ▼
//!                    read ▸ parse ▸ execute ▸ reply
//!                                │
//!                                └─ SUBSCRIBE: forward pub/sub messages
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError};
