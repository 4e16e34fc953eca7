//! Reply Encoding
//!
//! Everything the server writes back to a client. The wire format follows the
//! classic cache-protocol markers (`+`, `-`, `:`, `$`, `*`) with one
//! deliberate quirk kept for compatibility with the line-oriented bench
//! client: value hits are written as a bare `<bytes>\r\n` without a `$len`
//! prefix, and HGETALL streams unframed `field\nvalue\n` pairs. INFO is a
//! conventionally framed bulk.
//!
//! Errors come in two severities: `-ERR` for hard failures and `-WARN` for
//! semantic rejections such as wrong-type operations.

use bytes::Bytes;

/// The line terminator used throughout the protocol.
pub const CRLF: &[u8] = b"\r\n";

/// A reply ready to be encoded onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK\r\n`
    Ok,
    /// `+PONG\r\n`
    Pong,
    /// `:<n>\r\n`
    Integer(i64),
    /// Bare `<bytes>\r\n`, used for GET/HGET hits.
    Value(Bytes),
    /// `$-1\r\n`, the absent-key reply.
    NullBulk,
    /// `*0\r\n`, the absent-hash reply for HGETALL.
    EmptyArray,
    /// `$<len>\r\n<bytes>\r\n`, used for INFO.
    Bulk(Bytes),
    /// Unframed `field\nvalue\n` pairs, used for a present HGETALL.
    FieldPairs(Vec<(Bytes, Bytes)>),
    /// `-ERR <message>\r\n`
    Error(String),
    /// `-WARN <message>\r\n`
    Warn(String),
}

impl Reply {
    /// The standard arity error for `cmd` (lowercase command name).
    pub fn wrong_arity(cmd: &str) -> Reply {
        Reply::Error(format!("wrong number of arguments for '{cmd}' command"))
    }

    /// Encodes this reply into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Encodes this reply into an existing buffer.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Ok => out.extend_from_slice(b"+OK\r\n"),
            Reply::Pong => out.extend_from_slice(b"+PONG\r\n"),
            Reply::Integer(n) => {
                out.push(b':');
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(CRLF);
            }
            Reply::Value(bytes) => {
                out.extend_from_slice(bytes);
                out.extend_from_slice(CRLF);
            }
            Reply::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            Reply::EmptyArray => out.extend_from_slice(b"*0\r\n"),
            Reply::Bulk(bytes) => {
                out.push(b'$');
                out.extend_from_slice(bytes.len().to_string().as_bytes());
                out.extend_from_slice(CRLF);
                out.extend_from_slice(bytes);
                out.extend_from_slice(CRLF);
            }
            Reply::FieldPairs(pairs) => {
                for (field, value) in pairs {
                    out.extend_from_slice(field);
                    out.push(b'\n');
                    out.extend_from_slice(value);
                    out.push(b'\n');
                }
            }
            Reply::Error(message) => {
                out.extend_from_slice(b"-ERR ");
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(CRLF);
            }
            Reply::Warn(message) => {
                out.extend_from_slice(b"-WARN ");
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(CRLF);
            }
        }
    }
}

/// The acknowledgement frame written once after a SUBSCRIBE:
/// `*3\r\n$9\r\nsubscribe\r\n$<len>\r\n<channel>\r\n:1\r\n`.
pub fn subscribe_ack(channel: &str) -> Vec<u8> {
    format!(
        "*3\r\n$9\r\nsubscribe\r\n${}\r\n{}\r\n:1\r\n",
        channel.len(),
        channel
    )
    .into_bytes()
}

/// One delivered pub/sub message:
/// `*3\r\n$7\r\nmessage\r\n$<len>\r\n<channel>\r\n$<len>\r\n<payload>\r\n`.
pub fn message_frame(channel: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + channel.len() + payload.len());
    out.extend_from_slice(b"*3\r\n$7\r\nmessage\r\n");
    out.push(b'$');
    out.extend_from_slice(channel.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(channel.as_bytes());
    out.extend_from_slice(CRLF);
    out.push(b'$');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(payload);
    out.extend_from_slice(CRLF);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_replies() {
        assert_eq!(Reply::Ok.encode(), b"+OK\r\n");
        assert_eq!(Reply::Pong.encode(), b"+PONG\r\n");
        assert_eq!(Reply::Integer(1000).encode(), b":1000\r\n");
        assert_eq!(Reply::Integer(-42).encode(), b":-42\r\n");
        assert_eq!(Reply::NullBulk.encode(), b"$-1\r\n");
        assert_eq!(Reply::EmptyArray.encode(), b"*0\r\n");
    }

    #[test]
    fn value_is_unframed() {
        assert_eq!(Reply::Value(Bytes::from("hello")).encode(), b"hello\r\n");
        assert_eq!(Reply::Value(Bytes::new()).encode(), b"\r\n");
    }

    #[test]
    fn bulk_is_length_framed() {
        assert_eq!(
            Reply::Bulk(Bytes::from("hello")).encode(),
            b"$5\r\nhello\r\n"
        );
    }

    #[test]
    fn field_pairs() {
        let reply = Reply::FieldPairs(vec![(Bytes::from("name"), Bytes::from("Ann"))]);
        assert_eq!(reply.encode(), b"name\nAnn\n");
    }

    #[test]
    fn errors_and_warnings() {
        assert_eq!(
            Reply::Error("unknown command".into()).encode(),
            b"-ERR unknown command\r\n"
        );
        assert_eq!(
            Reply::wrong_arity("set").encode(),
            &b"-ERR wrong number of arguments for 'set' command\r\n"[..]
        );
        assert_eq!(Reply::Warn("WRONGTYPE".into()).encode(), b"-WARN WRONGTYPE\r\n");
    }

    #[test]
    fn pubsub_frames() {
        assert_eq!(
            subscribe_ack("news"),
            b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n"
        );
        assert_eq!(
            message_frame("news", b"hi"),
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n"
        );
    }
}
