//! RESP (Redis Serialization Protocol) encoding and decoding.
//!
//! The decoder works incrementally over a [`BytesMut`] read buffer: it either
//! yields one complete frame together with the number of bytes it occupied on
//! the wire, or reports that more data is needed. The consumed-byte count is
//! what the replication code sums into its acknowledgement offset, so it must
//! be exact.

use bytes::{Buf, BytesMut};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
}

/// A single RESP value as it appears on the wire.
#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    NullBulkString,
    Array(Vec<RespValue>),
    NullArray,
}

impl RespValue {
    /// Encodes the value into its exact wire representation.
    ///
    /// `decode` of the result yields the original value back, which the
    /// replication offset accounting relies on.
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(value) => format!("+{}\r\n", value),
            RespValue::Error(value) => format!("-{}\r\n", value),
            RespValue::Integer(value) => format!(":{}\r\n", value),
            RespValue::BulkString(value) => format!("${}\r\n{}\r\n", value.len(), value),
            RespValue::NullBulkString => "$-1\r\n".to_string(),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());
                for element in elements {
                    encoded.push_str(&element.encode());
                }
                encoded
            }
            RespValue::NullArray => "*-1\r\n".to_string(),
        }
    }

    /// Builds the array-of-bulk-strings form every client command uses.
    pub fn command(parts: &[&str]) -> RespValue {
        RespValue::Array(
            parts
                .iter()
                .map(|part| RespValue::BulkString(part.to_string()))
                .collect(),
        )
    }

    /// Attempts to decode one complete frame from the front of `buffer`.
    ///
    /// * `Ok(Some((value, consumed)))` - a full frame was decoded and its
    ///   `consumed` bytes were drained from the buffer
    /// * `Ok(None)` - the buffer holds only a partial frame; read more bytes
    /// * `Err(RespError)` - the buffer contents are not valid RESP
    pub fn decode(buffer: &mut BytesMut) -> Result<Option<(RespValue, usize)>, RespError> {
        match parse_frame(buffer, 0)? {
            Some((value, end)) => {
                buffer.advance(end);
                Ok(Some((value, end)))
            }
            None => Ok(None),
        }
    }
}

/// Parses one frame starting at `start`, returning the value and the index
/// one past its final byte.
fn parse_frame(buffer: &[u8], start: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(line_end) = find_line_end(buffer, start) else {
        return Ok(None);
    };

    let line = &buffer[start..line_end - 2];

    if line.is_empty() {
        return Err(RespError::Protocol("empty frame header".to_string()));
    }

    let payload = std::str::from_utf8(&line[1..]).map_err(|_| RespError::InvalidUtf8)?;

    match line[0] {
        b'+' => Ok(Some((
            RespValue::SimpleString(payload.to_string()),
            line_end,
        ))),
        b'-' => Ok(Some((RespValue::Error(payload.to_string()), line_end))),
        b':' => {
            let value = payload
                .parse::<i64>()
                .map_err(|_| RespError::Protocol(format!("invalid integer {}", payload)))?;

            Ok(Some((RespValue::Integer(value), line_end)))
        }
        b'$' => parse_bulk_string(buffer, payload, line_end),
        b'*' => parse_array(buffer, payload, line_end),
        other => Err(RespError::Protocol(format!(
            "unknown prefix byte {:#04x}",
            other
        ))),
    }
}

fn parse_bulk_string(
    buffer: &[u8],
    payload: &str,
    line_end: usize,
) -> Result<Option<(RespValue, usize)>, RespError> {
    let declared_length = parse_length(payload)?;

    let Some(length) = declared_length else {
        return Ok(Some((RespValue::NullBulkString, line_end)));
    };

    let content_end = line_end + length + 2;

    if buffer.len() < content_end {
        return Ok(None);
    }

    if &buffer[line_end + length..content_end] != b"\r\n" {
        return Err(RespError::Protocol(
            "bulk string missing CRLF terminator".to_string(),
        ));
    }

    let content = std::str::from_utf8(&buffer[line_end..line_end + length])
        .map_err(|_| RespError::InvalidUtf8)?;

    Ok(Some((
        RespValue::BulkString(content.to_string()),
        content_end,
    )))
}

fn parse_array(
    buffer: &[u8],
    payload: &str,
    line_end: usize,
) -> Result<Option<(RespValue, usize)>, RespError> {
    let declared_length = parse_length(payload)?;

    let Some(length) = declared_length else {
        return Ok(Some((RespValue::NullArray, line_end)));
    };

    let mut elements = Vec::with_capacity(length);
    let mut position = line_end;

    for _ in 0..length {
        match parse_frame(buffer, position)? {
            Some((element, next_position)) => {
                elements.push(element);
                position = next_position;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(elements), position)))
}

/// Parses a `$`/`*` length field. `-1` is the null marker; anything else must
/// be a non-negative integer.
fn parse_length(payload: &str) -> Result<Option<usize>, RespError> {
    let length = payload
        .parse::<i64>()
        .map_err(|_| RespError::Protocol(format!("invalid length {}", payload)))?;

    match length {
        -1 => Ok(None),
        n if n < 0 => Err(RespError::Protocol(format!("invalid length {}", n))),
        n => Ok(Some(n as usize)),
    }
}

/// Returns the index one past the first `\r\n` at or after `start`.
fn find_line_end(buffer: &[u8], start: usize) -> Option<usize> {
    if start >= buffer.len() {
        return None;
    }

    buffer[start..]
        .windows(2)
        .position(|window| window == b"\r\n")
        .map(|position| start + position + 2)
}
