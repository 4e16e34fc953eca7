//! Command Processing
//!
//! The layer between the wire and the storage engine. A tokenized request
//! comes in, a [`Reply`](crate::protocol::Reply) comes out.
//!
//! ```text
//! client request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ protocol parser │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │      Store      │
//! └─────────────────┘
//! ```
//!
//! Supported commands: SET, SETEX, GET, INCR, INCRBY, DEL, HSET, HGET,
//! HGETALL, HDEL, INFO, PING, PUBLISH. SUBSCRIBE is handled by the session
//! loop because it takes over the connection.

pub mod handler;

pub use handler::CommandHandler;
