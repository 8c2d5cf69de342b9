//! The in-memory keyspace: string entries with optional expiry and
//! append-only streams.
//!
//! A key belongs to at most one domain (string or stream). Expiry is checked
//! lazily on access against a monotonic clock; there is no background
//! eviction.

use std::collections::HashMap;
use std::fmt;

use tokio::time::Instant;

pub type KeyValueStore = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: DataType,
    pub expiration: Option<Instant>,
}

impl Value {
    /// An entry is expired once the monotonic clock reaches its deadline.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expiration, Some(expires_at) if now >= expires_at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    String(String),
    Stream(Stream),
}

/// A stream entry identifier, ordered numerically by its
/// (milliseconds, sequence) pair. The string form is `ms-seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// One message in a stream. Field order is preserved exactly as given to
/// XADD, because the flat RESP reply encodes fields in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(String, String)>,
}

/// An append-only sequence of messages with strictly increasing IDs.
///
/// XADD validates the new ID against `last_id` before calling [`Stream::append`],
/// so the vector stays sorted and the last element is always the maximum.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
}

impl Stream {
    pub fn new() -> Self {
        Stream {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The highest ID in the stream, if any.
    pub fn last_id(&self) -> Option<StreamId> {
        self.entries.last().map(|entry| entry.id)
    }

    /// Appends an entry whose ID the caller has already validated as greater
    /// than `last_id`.
    pub fn append(&mut self, entry: StreamEntry) {
        self.entries.push(entry);
    }

    /// All entries with `start <= id <= end`, in order.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<&StreamEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.id >= start && entry.id <= end)
            .collect()
    }

    /// All entries with `id > after`, in order.
    pub fn entries_after(&self, after: StreamId) -> Vec<&StreamEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.id > after)
            .collect()
    }
}
