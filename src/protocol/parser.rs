//! Request Framing
//!
//! SusyDB accepts two request forms on the same port:
//!
//! - **Inline**: a single `\n`-terminated line, split on spaces. Tokens may be
//!   double-quoted to contain spaces, and `\` escapes the next byte (so `\"`
//!   is a literal quote and `\\` a literal backslash). A trailing `\r` is
//!   tolerated.
//! - **Array**: `*N\r\n` followed by N bulk strings `$L\r\n<L bytes>\r\n`,
//!   recognized by the leading `*`. Bulk payloads are binary safe.
//!
//! The parser is incremental: it works over whatever bytes the connection has
//! buffered and returns `Ok(None)` when a frame is not yet complete, so the
//! caller can read more and retry. A successful parse reports how many bytes
//! were consumed so the caller can advance its buffer.

use bytes::Bytes;
use thiserror::Error;

/// Errors for malformed array frames. Inline lines never fail to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The frame does not start with a `*N` header.
    #[error("invalid array header: {0}")]
    InvalidArrayHeader(String),

    /// The array element count is not an integer.
    #[error("invalid array count: {0}")]
    InvalidArrayCount(String),

    /// An element does not start with a `$L` header.
    #[error("invalid bulk string header: {0}")]
    InvalidBulkHeader(String),

    /// A bulk string length is not a non-negative integer.
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(String),
}

/// Attempts to parse one request from `buf`.
///
/// Returns `Ok(Some((args, consumed)))` for a complete request, `Ok(None)`
/// when more bytes are needed, or an error for a malformed array frame. An
/// empty `args` vector (blank line, empty array) is valid and should be
/// ignored by the caller.
pub fn parse_request(buf: &[u8]) -> Result<Option<(Vec<Bytes>, usize)>, ParseError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] == b'*' {
        parse_array(buf)
    } else {
        parse_inline(buf)
    }
}

/// Splits an inline command line into tokens, honoring double quotes and
/// backslash escapes. Any escaped byte is taken literally.
pub fn tokenize(line: &[u8]) -> Vec<Bytes> {
    let mut parts = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for &byte in line {
        if escaped {
            current.push(byte);
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'"' => in_quotes = !in_quotes,
            b' ' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(Bytes::from(std::mem::take(&mut current)));
                }
            }
            _ => current.push(byte),
        }
    }

    if !current.is_empty() {
        parts.push(Bytes::from(current));
    }
    parts
}

fn parse_inline(buf: &[u8]) -> Result<Option<(Vec<Bytes>, usize)>, ParseError> {
    let (line, consumed) = match take_line(buf, 0) {
        Some(found) => found,
        None => return Ok(None),
    };
    Ok(Some((tokenize(trim(line)), consumed)))
}

fn parse_array(buf: &[u8]) -> Result<Option<(Vec<Bytes>, usize)>, ParseError> {
    let (line, mut pos) = match take_line(buf, 0) {
        Some(found) => found,
        None => return Ok(None),
    };

    let header = trim(line);
    if header.is_empty() || header[0] != b'*' {
        return Err(ParseError::InvalidArrayHeader(lossy(header)));
    }
    let count = match parse_int(&header[1..]) {
        Some(count) => count,
        None => return Err(ParseError::InvalidArrayCount(lossy(&header[1..]))),
    };

    let mut args = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let (line, payload_start) = match take_line(buf, pos) {
            Some(found) => found,
            None => return Ok(None),
        };

        let header = trim(line);
        if header.is_empty() || header[0] != b'$' {
            return Err(ParseError::InvalidBulkHeader(lossy(header)));
        }
        let length = match parse_int(&header[1..]) {
            Some(length) if length >= 0 => length as usize,
            _ => return Err(ParseError::InvalidBulkLength(lossy(&header[1..]))),
        };

        // Payload plus its trailing CRLF.
        let end = payload_start + length + 2;
        if buf.len() < end {
            return Ok(None);
        }
        args.push(Bytes::copy_from_slice(
            &buf[payload_start..payload_start + length],
        ));
        pos = end;
    }

    Ok(Some((args, pos)))
}

/// Returns the bytes up to the next `\n` (exclusive) and the offset just
/// past it, or `None` if no newline has arrived yet.
fn take_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let newline = buf[start..].iter().position(|&byte| byte == b'\n')?;
    Some((&buf[start..start + newline], start + newline + 1))
}

fn trim(line: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = line.len();
    while start < end && line[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && line[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &line[start..end]
}

fn parse_int(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
