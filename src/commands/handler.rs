//! Command Dispatch
//!
//! Takes a tokenized request, routes it by its uppercased first token, and
//! produces a [`Reply`]. Handlers validate arity, pull their arguments out of
//! the token list, and call into the storage engine.
//!
//! ```text
//! ["SET", "greeting", "hello"]
//!        │
//!        ▼
//! ┌─────────────────┐      ┌─────────────┐
//! │ CommandHandler  │ ───▶ │    Store    │
//! │ dispatch match  │      └─────────────┘
//! └────────┬────────┘
//!          ▼
//!       Reply::Ok
//! ```
//!
//! Two conventions carried through every handler:
//!
//! - Command names are case-insensitive; arity errors always name the command
//!   in lowercase.
//! - Value-bearing commands (SET, SETEX, HSET, PUBLISH) join their trailing
//!   tokens with a single space, so unquoted multi-word values survive the
//!   inline form.
//!
//! SUBSCRIBE is absent here on purpose: it takes over the whole connection
//! and is handled by the session loop in the `connection` module.

use crate::protocol::Reply;
use crate::storage::{Store, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Executes commands against a shared [`Store`].
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a handler over `store`.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Executes one tokenized request and returns the reply to write.
    pub fn execute(&self, parts: &[Bytes]) -> Reply {
        let name = match parts.first() {
            Some(first) => match std::str::from_utf8(first) {
                Ok(name) => name.to_ascii_uppercase(),
                Err(_) => return Reply::Error("unknown command".to_string()),
            },
            None => return Reply::Error("unknown command".to_string()),
        };

        match name.as_str() {
            "SET" => self.cmd_set(parts),
            "SETEX" => self.cmd_setex(parts),
            "GET" => self.cmd_get(parts),
            "INCR" => self.cmd_incr(parts),
            "INCRBY" => self.cmd_incrby(parts),
            "DEL" => self.cmd_del(parts),
            "HSET" => self.cmd_hset(parts),
            "HGET" => self.cmd_hget(parts),
            "HGETALL" => self.cmd_hgetall(parts),
            "HDEL" => self.cmd_hdel(parts),
            "INFO" => self.cmd_info(parts),
            "PING" => Reply::Pong,
            "PUBLISH" => self.cmd_publish(parts),
            _ => Reply::Error("unknown command".to_string()),
        }
    }

    // ========================================================================
    // String commands
    // ========================================================================

    /// SET key value...
    fn cmd_set(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 3 {
            return Reply::wrong_arity("set");
        }
        let key = parts[1].clone();
        let value = join_tokens(&parts[2..]);

        match self.store.set(key, value) {
            Ok(()) => Reply::Ok,
            Err(err) => Reply::Error(err.to_string()),
        }
    }

    /// SETEX key seconds value...
    fn cmd_setex(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 4 {
            return Reply::wrong_arity("setex");
        }
        let key = parts[1].clone();
        let seconds: i64 = match parse_integer(&parts[2]) {
            Some(seconds) => seconds,
            None => return Reply::Error("invalid expire time in 'setex' command".to_string()),
        };
        let value = join_tokens(&parts[3..]);

        let result = if seconds > 0 {
            self.store
                .set_with_ttl(key, value, Duration::from_secs(seconds as u64))
        } else {
            self.store.set(key, value)
        };
        match result {
            Ok(()) => Reply::Ok,
            Err(err) => Reply::Error(err.to_string()),
        }
    }

    /// GET key
    fn cmd_get(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 2 {
            return Reply::wrong_arity("get");
        }
        match self.store.get(&parts[1]) {
            Ok(Some(value)) => Reply::Value(value),
            Ok(None) => Reply::NullBulk,
            Err(err) => Reply::Warn(err.to_string()),
        }
    }

    /// INCR key
    fn cmd_incr(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 2 {
            return Reply::wrong_arity("incr");
        }
        match self.store.incr_by(&parts[1], 1) {
            Ok(value) => Reply::Integer(value),
            Err(err) => Reply::Error(err.to_string()),
        }
    }

    /// INCRBY key delta
    fn cmd_incrby(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 3 {
            return Reply::wrong_arity("incrby");
        }
        let delta: i64 = match parse_integer(&parts[2]) {
            Some(delta) => delta,
            None => return Reply::Error("value is not an integer or out of range".to_string()),
        };
        match self.store.incr_by(&parts[1], delta) {
            Ok(value) => Reply::Integer(value),
            Err(err) => Reply::Error(err.to_string()),
        }
    }

    /// DEL key
    fn cmd_del(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 2 {
            return Reply::wrong_arity("del");
        }
        self.store.delete(&parts[1]);
        Reply::Ok
    }

    // ========================================================================
    // Hash commands
    // ========================================================================

    /// HSET key field value...
    fn cmd_hset(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 4 {
            return Reply::wrong_arity("hset");
        }
        let key = parts[1].clone();
        let field = parts[2].clone();
        let value = join_tokens(&parts[3..]);

        match self.store.hset(key, field, value) {
            Ok(()) => Reply::Ok,
            Err(err @ StoreError::WrongType) => Reply::Warn(err.to_string()),
            Err(err) => Reply::Error(err.to_string()),
        }
    }

    /// HGET key field
    fn cmd_hget(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 3 {
            return Reply::wrong_arity("hget");
        }
        match self.store.hget(&parts[1], &parts[2]) {
            Ok(Some(value)) => Reply::Value(value),
            Ok(None) => Reply::NullBulk,
            Err(err) => Reply::Warn(err.to_string()),
        }
    }

    /// HGETALL key
    fn cmd_hgetall(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 2 {
            return Reply::wrong_arity("hgetall");
        }
        match self.store.hget_all(&parts[1]) {
            Ok(Some(fields)) => Reply::FieldPairs(fields.into_iter().collect()),
            Ok(None) => Reply::EmptyArray,
            Err(err) => Reply::Warn(err.to_string()),
        }
    }

    /// HDEL key field
    fn cmd_hdel(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 3 {
            return Reply::wrong_arity("hdel");
        }
        match self.store.hdel(&parts[1], &parts[2]) {
            Ok(true) => Reply::Integer(1),
            Ok(false) => Reply::Integer(0),
            Err(err) => Reply::Warn(err.to_string()),
        }
    }

    // ========================================================================
    // Admin and pub/sub commands
    // ========================================================================

    /// INFO
    fn cmd_info(&self, _parts: &[Bytes]) -> Reply {
        Reply::Bulk(Bytes::from(self.store.info()))
    }

    /// PUBLISH channel message...
    fn cmd_publish(&self, parts: &[Bytes]) -> Reply {
        if parts.len() < 3 {
            return Reply::wrong_arity("publish");
        }
        let channel = String::from_utf8_lossy(&parts[1]).into_owned();
        let message = join_tokens(&parts[2..]);

        let delivered = self.store.hub.publish(&channel, message);
        Reply::Integer(delivered as i64)
    }
}

/// Joins tokens with single spaces, so `SET k a b c` stores `"a b c"`.
fn join_tokens(parts: &[Bytes]) -> Bytes {
    if parts.len() == 1 {
        return parts[0].clone();
    }
    let mut joined = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            joined.push(b' ');
        }
        joined.extend_from_slice(part);
    }
    Bytes::from(joined)
}

fn parse_integer(bytes: &Bytes) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
