//! A Redis-compatible key-value and stream server.
//!
//! This crate implements a small in-memory server that speaks the Redis
//! Serialization Protocol (RESP) and supports:
//!
//! - String operations with millisecond expiry (GET, SET, INCR, DEL, TYPE, KEYS)
//! - Append-only stream operations (XADD, XRANGE, XREAD with blocking reads)
//! - Per-connection transactions (MULTI, EXEC, DISCARD)
//! - Master-replica replication with write propagation and WAIT
//!
//! A process runs in one of two roles. A master accepts writes, fans them out
//! to attached replicas and coordinates WAIT acknowledgements; a replica
//! performs the PSYNC handshake, consumes the master's command stream and
//! answers REPLCONF GETACK with its consumed-byte offset.
//!
//! The server uses async/await with Tokio; each connection owns one reader
//! task.

pub mod commands;
pub mod connection;
pub mod key_value_store;
pub mod replication;
pub mod resp;
pub mod server;
pub mod state;
pub mod transaction;
