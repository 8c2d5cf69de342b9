//! Master-replica replication.
//!
//! The master side keeps a [`ReplicationState`]: the replication ID minted at
//! boot, the atomic master offset, the set of attached replica connections
//! and a broadcast channel of acknowledgement events that WAIT subscribes to.
//!
//! The replica side performs the outbound handshake (PING, REPLCONF
//! listening-port, REPLCONF capa psync2, PSYNC ? -1), consumes the RDB bulk
//! the master ships, then applies the command stream while keeping an exact
//! ledger of consumed bytes for REPLCONF GETACK answers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info, warn};

use crate::commands::CommandHandler;
use crate::key_value_store::KeyValueStore;
use crate::resp::{RespError, RespValue};
use crate::server::RedisServer;
use crate::state::State;

/// Commands a master re-encodes and fans out to every attached replica.
pub const PROPAGATED_COMMANDS: [&str; 2] = ["SET", "DEL"];

/// The empty RDB snapshot shipped during a full resync, as the hex blob the
/// wire contract fixes (REDIS0011 header, metadata, EOF opcode, checksum).
const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a7265\
6469732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d62\
617365c000fff06e3bfec0ff5aa2";

pub fn empty_rdb_bytes() -> Vec<u8> {
    (0..EMPTY_RDB_HEX.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&EMPTY_RDB_HEX[i..i + 2], 16).unwrap_or_default())
        .collect()
}

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RESP parse error: {0}")]
    Resp(#[from] RespError),
    #[error("connection to master closed")]
    ConnectionClosed,
    #[error("unexpected reply from master: {0}")]
    UnexpectedMasterReply(String),
}

/// One REPLCONF ACK received from a replica.
#[derive(Debug, Clone, PartialEq)]
pub struct AckEvent {
    pub client_address: String,
    pub offset: u64,
}

/// An attached replica: its write half and the last offset it acknowledged.
#[derive(Debug)]
pub struct ReplicaHandle {
    writer: Arc<RwLock<OwnedWriteHalf>>,
    acked_offset: AtomicU64,
}

impl ReplicaHandle {
    pub fn acked_offset(&self) -> u64 {
        self.acked_offset.load(Ordering::Acquire)
    }
}

/// Process-wide replication state on the master side.
#[derive(Debug)]
pub struct ReplicationState {
    repl_id: String,
    master_repl_offset: AtomicU64,
    replicas: Mutex<HashMap<String, Arc<ReplicaHandle>>>,
    ack_events: broadcast::Sender<AckEvent>,
}

impl ReplicationState {
    pub fn new() -> Self {
        let (ack_events, _) = broadcast::channel(64);

        ReplicationState {
            repl_id: Alphanumeric.sample_string(&mut rand::rng(), 40),
            master_repl_offset: AtomicU64::new(0),
            replicas: Mutex::new(HashMap::new()),
            ack_events,
        }
    }

    /// The 40-character replication ID minted at boot.
    pub fn repl_id(&self) -> &str {
        &self.repl_id
    }

    /// Total encoded byte count of all propagated write commands. Grows once
    /// per propagation event, not once per replica.
    pub fn master_repl_offset(&self) -> u64 {
        self.master_repl_offset.load(Ordering::Acquire)
    }

    pub async fn replica_count(&self) -> usize {
        self.replicas.lock().await.len()
    }

    /// Attaches a replica after the full resync payload has been sent.
    pub async fn register_replica(&self, client_address: String, writer: Arc<RwLock<OwnedWriteHalf>>) {
        let handle = Arc::new(ReplicaHandle {
            writer,
            acked_offset: AtomicU64::new(0),
        });

        self.replicas.lock().await.insert(client_address.clone(), handle);
        info!(replica = %client_address, "replica attached");
    }

    pub async fn remove_replica(&self, client_address: &str) {
        if self.replicas.lock().await.remove(client_address).is_some() {
            info!(replica = %client_address, "replica detached");
        }
    }

    /// Fans a write command out to every attached replica and advances the
    /// master offset by its encoded length, once.
    pub async fn propagate(&self, command: &RespValue) {
        let encoded = command.encode();

        self.master_repl_offset
            .fetch_add(encoded.len() as u64, Ordering::AcqRel);

        self.fan_out(encoded.as_bytes()).await;
    }

    /// Sends `REPLCONF GETACK *` to every replica so each reports its
    /// offset. GETACK traffic does not count into the master offset.
    pub async fn broadcast_getack(&self) {
        let encoded = RespValue::command(&["REPLCONF", "GETACK", "*"]).encode();

        self.fan_out(encoded.as_bytes()).await;
    }

    /// The replica handles are copied out under the lock; the writes happen
    /// outside it. A replica whose socket write fails is evicted.
    async fn fan_out(&self, payload: &[u8]) {
        let replicas: Vec<(String, Arc<ReplicaHandle>)> = self
            .replicas
            .lock()
            .await
            .iter()
            .map(|(address, handle)| (address.clone(), Arc::clone(handle)))
            .collect();

        for (address, handle) in replicas {
            if let Err(e) = write_to_replica(&handle, payload).await {
                warn!(replica = %address, error = %e, "evicting replica after failed write");
                self.remove_replica(&address).await;
            }
        }
    }

    /// Records a `REPLCONF ACK <offset>` from a replica connection and wakes
    /// any WAIT subscribed to acknowledgement events.
    pub async fn record_ack(&self, client_address: &str, offset: u64) {
        if let Some(handle) = self.replicas.lock().await.get(client_address) {
            handle.acked_offset.store(offset, Ordering::Release);
        }

        let _ = self.ack_events.send(AckEvent {
            client_address: client_address.to_string(),
            offset,
        });
    }

    pub fn subscribe_acks(&self) -> broadcast::Receiver<AckEvent> {
        self.ack_events.subscribe()
    }
}

impl Default for ReplicationState {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_to_replica(handle: &ReplicaHandle, payload: &[u8]) -> tokio::io::Result<()> {
    let mut writer_guard = handle.writer.write().await;
    writer_guard.write_all(payload).await?;
    writer_guard.flush().await
}

/// Performs the replica's outbound handshake and consumes the RDB bulk.
///
/// Returns the read buffer with any bytes the master sent past the RDB, so
/// the command-consumption loop starts with nothing lost.
pub async fn perform_handshake(
    stream: &mut TcpStream,
    listening_port: u16,
) -> Result<BytesMut, ReplicationError> {
    let mut buffer = BytesMut::with_capacity(4096);

    let reply = exchange(stream, &mut buffer, &["PING"]).await?;
    expect_simple_string(&reply, "PONG")?;

    let port = listening_port.to_string();
    let reply = exchange(stream, &mut buffer, &["REPLCONF", "listening-port", &port]).await?;
    expect_simple_string(&reply, "OK")?;

    let reply = exchange(stream, &mut buffer, &["REPLCONF", "capa", "psync2"]).await?;
    expect_simple_string(&reply, "OK")?;

    let reply = exchange(stream, &mut buffer, &["PSYNC", "?", "-1"]).await?;
    validate_fullresync(&reply)?;

    consume_rdb_payload(stream, &mut buffer).await?;
    info!("handshake with master complete");

    Ok(buffer)
}

async fn exchange(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    command: &[&str],
) -> Result<RespValue, ReplicationError> {
    stream
        .write_all(RespValue::command(command).encode().as_bytes())
        .await?;
    stream.flush().await?;

    loop {
        if let Some((value, _)) = RespValue::decode(buffer)? {
            return Ok(value);
        }

        if stream.read_buf(buffer).await? == 0 {
            return Err(ReplicationError::ConnectionClosed);
        }
    }
}

fn expect_simple_string(reply: &RespValue, expected: &str) -> Result<(), ReplicationError> {
    match reply {
        RespValue::SimpleString(value) if value == expected => Ok(()),
        other => Err(ReplicationError::UnexpectedMasterReply(format!(
            "{:?}",
            other
        ))),
    }
}

fn validate_fullresync(reply: &RespValue) -> Result<(), ReplicationError> {
    let RespValue::SimpleString(line) = reply else {
        return Err(ReplicationError::UnexpectedMasterReply(format!(
            "{:?}",
            reply
        )));
    };

    let pattern = Regex::new(r"^FULLRESYNC [a-zA-Z0-9]{40} \d+$")
        .expect("FULLRESYNC pattern is valid");

    if !pattern.is_match(line) {
        return Err(ReplicationError::UnexpectedMasterReply(line.clone()));
    }

    Ok(())
}

/// Reads the `$<len>\r\n<len raw bytes>` RDB bulk that follows FULLRESYNC.
/// Unlike a bulk string, the payload has no trailing CRLF.
async fn consume_rdb_payload(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
) -> Result<(), ReplicationError> {
    let header_end = loop {
        if let Some(position) = buffer.windows(2).position(|window| window == b"\r\n") {
            break position + 2;
        }

        if stream.read_buf(buffer).await? == 0 {
            return Err(ReplicationError::ConnectionClosed);
        }
    };

    let header = String::from_utf8_lossy(&buffer[..header_end - 2]).to_string();

    let length = header
        .strip_prefix('$')
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| ReplicationError::UnexpectedMasterReply(header.clone()))?;

    let _ = buffer.split_to(header_end);

    while buffer.len() < length {
        if stream.read_buf(buffer).await? == 0 {
            return Err(ReplicationError::ConnectionClosed);
        }
    }

    let _ = buffer.split_to(length);

    Ok(())
}

/// Consumes the master's command stream on a replica.
///
/// Every decoded frame advances the consumed-byte ledger by its exact wire
/// length. `REPLCONF GETACK *` is answered with the ledger value from before
/// the GETACK itself; every other command is applied with its reply
/// suppressed, because the replication stream has no reply channel. Errors
/// applying a propagated command are logged and skipped.
pub async fn handle_master_connection(
    mut stream: TcpStream,
    server: Arc<RedisServer>,
    replication: Arc<ReplicationState>,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    mut buffer: BytesMut,
) {
    let mut bytes_consumed: u64 = 0;

    loop {
        let (value, frame_length) = match RespValue::decode(&mut buffer) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                match stream.read_buf(&mut buffer).await {
                    Ok(0) => {
                        info!("connection to master closed");
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!(error = %e, "failed to read from master");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "protocol error on master connection");
                return;
            }
        };

        let command_handler = match CommandHandler::new(&value) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(error = %e, "skipping malformed command from master");
                bytes_consumed += frame_length as u64;
                continue;
            }
        };

        if command_handler.is_getack() {
            let ack = RespValue::command(&["REPLCONF", "ACK", &bytes_consumed.to_string()]);

            if let Err(e) = stream.write_all(ack.encode().as_bytes()).await {
                error!(error = %e, "failed to send ACK to master");
                return;
            }

            bytes_consumed += frame_length as u64;
            continue;
        }

        if let Err(e) = command_handler
            .execute(
                &server,
                &replication,
                "master",
                Arc::clone(&store),
                Arc::clone(&state),
            )
            .await
        {
            warn!(command = %command_handler.name, error = %e, "failed to apply command from master");
        }

        bytes_consumed += frame_length as u64;
    }
}
