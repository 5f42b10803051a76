//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode client commands and parse store replies, including the
//! nested array reply returned by `SCAN`.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::io::BufRead;

use crate::client::{ClientError, ClientResult};

/// Nesting limit for array replies; SCAN needs two levels.
const MAX_DEPTH: usize = 8;

/// Largest bulk string the server may send (the store's own `proto-max-bulk-len`).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Array elements reserved up front; larger arrays grow as items arrive.
const MAX_PREALLOC_ITEMS: i64 = 1024;

/// RESP reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style replies.
    Simple(Vec<u8>),
    /// -ERR ... replies.
    Error(Vec<u8>),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays.
    Array(Vec<RespValue>),
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    push_u64(out, args.len() as u64);
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        push_u64(out, arg.len() as u64);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one RESP value from the buffered reader.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_value(reader, line_buf, 0)
}

fn read_value<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> ClientResult<RespValue> {
    if depth > MAX_DEPTH {
        return Err(ClientError::Protocol("reply nested too deeply"));
    }

    read_line(reader, line_buf)?;
    let (&tag, rest) = line_buf
        .split_first()
        .ok_or(ClientError::Protocol("empty reply line"))?;

    match tag {
        b'+' => Ok(RespValue::Simple(rest.to_vec())),
        b'-' => Ok(RespValue::Error(rest.to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            if len <= 0 {
                return Ok(RespValue::Array(Vec::new()));
            }
            let mut items = Vec::with_capacity(len.min(MAX_PREALLOC_ITEMS) as usize);
            for _ in 0..len {
                items.push(read_value(reader, line_buf, depth + 1)?);
            }
            Ok(RespValue::Array(items))
        }
        _ => Err(ClientError::Protocol("unknown reply type")),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    if len > MAX_BULK_LEN {
        return Err(ClientError::Protocol("bulk string too large"));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != *b"\r\n" {
        return Err(ClientError::Protocol("bulk string missing CRLF"));
    }
    Ok(RespValue::Bulk(Some(data)))
}

/// Splits a `SCAN` reply into the next cursor and the matched keys.
///
/// Expected shape: `*2 [$cursor, *N [$key ...]]`.
pub fn parse_scan_reply(reply: RespValue) -> ClientResult<(u64, Vec<Vec<u8>>)> {
    let mut parts = match reply {
        RespValue::Array(parts) if parts.len() == 2 => parts,
        RespValue::Error(message) => return Err(ClientError::from_reply(message)),
        _ => return Err(ClientError::UnexpectedResponse { command: "SCAN" }),
    };

    let keys = match parts.pop() {
        Some(RespValue::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                RespValue::Bulk(Some(key)) => Ok(key),
                _ => Err(ClientError::UnexpectedResponse { command: "SCAN" }),
            })
            .collect::<ClientResult<Vec<_>>>()?,
        _ => return Err(ClientError::UnexpectedResponse { command: "SCAN" }),
    };

    let cursor = match parts.pop() {
        Some(RespValue::Bulk(Some(raw))) => parse_u64(&raw)?,
        _ => return Err(ClientError::UnexpectedResponse { command: "SCAN" }),
    };

    Ok((cursor, keys))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(ClientError::Protocol("connection closed"));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ClientError::Protocol("line missing CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, data),
    };
    let value = i64::try_from(parse_u64(digits)?)
        .map_err(|_| ClientError::Protocol("integer out of range"))?;
    Ok(if negative { -value } else { value })
}

fn parse_u64(data: &[u8]) -> ClientResult<u64> {
    if data.is_empty() {
        return Err(ClientError::Protocol("empty integer"));
    }
    let mut value: u64 = 0;
    for &b in data {
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol("invalid integer"));
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as u64);
    }
    Ok(value)
}

/// Formats `value` as ASCII digits into a stack buffer.
///
/// Returns the buffer and the number of valid leading bytes.
pub fn encode_u64(mut value: u64) -> ([u8; 20], usize) {
    let mut buf = [0u8; 20];
    if value == 0 {
        buf[0] = b'0';
        return (buf, 1);
    }
    let mut len = 0;
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    (buf, len)
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    let (buf, len) = encode_u64(value);
    out.extend_from_slice(&buf[..len]);
}
