//! Wire Protocol
//!
//! Framing and encoding for the text protocol SusyDB speaks. Requests arrive
//! either as inline command lines or as length-prefixed arrays (see
//! [`parser`]); replies are encoded by [`types`].
//!
//! ```text
//! client ──▶ "SET greeting hello\r\n"            (inline form)
//! client ──▶ "*3\r\n$3\r\nSET\r\n$8\r\n..."      (array form)
//! server ──▶ "+OK\r\n"
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_request, tokenize, ParseError};
pub use types::{message_frame, subscribe_ack, Reply, CRLF};
