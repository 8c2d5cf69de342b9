//! The per-client connection loop.
//!
//! Each accepted connection gets one reader task that decodes RESP frames,
//! routes them through its own transaction buffer, executes them against the
//! shared state and writes replies back. A connection that issues PSYNC is
//! upgraded in place: the full-resync payload is sent and the write half is
//! registered with the replication state for fan-out.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::{
    commands::{
        dispatch_command, CommandError, CommandHandler, CommandResult, DispatchResult,
    },
    key_value_store::KeyValueStore,
    replication::{empty_rdb_bytes, ReplicationState},
    resp::RespValue,
    server::{RedisRole, RedisServer},
    state::State,
    transaction::TransactionBuffer,
};

pub async fn handle_client_connection(
    stream: TcpStream,
    server: Arc<RedisServer>,
    replication: Arc<ReplicationState>,
    client_address: String,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(RwLock::new(writer));

    let mut buffer = BytesMut::with_capacity(4096);
    let mut transaction = TransactionBuffer::new();

    loop {
        let value = match RespValue::decode(&mut buffer) {
            Ok(Some((value, _))) => value,
            Ok(None) => match reader.read_buf(&mut buffer).await {
                Ok(0) => {
                    debug!(client = %client_address, "connection closed");
                    replication.remove_replica(&client_address).await;
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!(client = %client_address, error = %e, "read failed");
                    replication.remove_replica(&client_address).await;
                    break;
                }
            },
            // Malformed framing: close the connection without a reply.
            Err(e) => {
                debug!(client = %client_address, error = %e, "protocol error, closing");
                replication.remove_replica(&client_address).await;
                break;
            }
        };

        let command_handler = match CommandHandler::new(&value) {
            Ok(handler) => handler,
            Err(e) => {
                write_reply(&writer, &e.as_string()).await;
                continue;
            }
        };

        if matches!(server.role, RedisRole::Replica(_))
            && server.is_write_command(&command_handler.name)
        {
            write_reply(&writer, &CommandError::WriteCommandToReplica.as_string()).await;
            continue;
        }

        let dispatch_result = match dispatch_command(command_handler, &mut transaction) {
            Ok(result) => result,
            Err(e) => {
                write_reply(&writer, &e.as_string()).await;
                continue;
            }
        };

        match dispatch_result {
            DispatchResult::Immediate(response) => {
                write_reply(&writer, &response).await;
            }
            DispatchResult::ExecuteSingle(command) => {
                let result = command
                    .execute(
                        &server,
                        &replication,
                        &client_address,
                        Arc::clone(&store),
                        Arc::clone(&state),
                    )
                    .await;

                match result {
                    Ok(CommandResult::Response(response)) => {
                        write_reply(&writer, &response).await;
                    }
                    Ok(CommandResult::NoResponse) => {}
                    Ok(CommandResult::FullResync(header)) => {
                        match send_full_resync(&writer, &header).await {
                            Ok(()) => {
                                replication
                                    .register_replica(
                                        client_address.clone(),
                                        Arc::clone(&writer),
                                    )
                                    .await;
                            }
                            Err(e) => {
                                info!(client = %client_address, error = %e, "full resync failed");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        write_reply(&writer, &e.as_string()).await;
                    }
                }
            }
            DispatchResult::ExecuteBatch(commands) => {
                // One outer array header, then each queued command's reply
                // bytes in order. Replies are buffered here, never written
                // before the whole batch has run.
                let mut replies = Vec::with_capacity(commands.len() + 1);
                replies.push(format!("*{}\r\n", commands.len()));

                for command in commands {
                    let result = command
                        .execute(
                            &server,
                            &replication,
                            &client_address,
                            Arc::clone(&store),
                            Arc::clone(&state),
                        )
                        .await;

                    match result {
                        Ok(CommandResult::Response(response)) => replies.push(response),
                        Ok(_) => {}
                        Err(e) => replies.push(e.as_string()),
                    }
                }

                write_reply(&writer, &replies.join("")).await;
            }
        }
    }
}

/// Sends the FULLRESYNC header followed by the empty RDB bulk. The RDB
/// payload is `$<len>\r\n<bytes>` with no trailing CRLF.
async fn send_full_resync(
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    header: &str,
) -> tokio::io::Result<()> {
    let rdb = empty_rdb_bytes();

    let mut writer_guard = writer.write().await;
    writer_guard.write_all(header.as_bytes()).await?;
    writer_guard
        .write_all(format!("${}\r\n", rdb.len()).as_bytes())
        .await?;
    writer_guard.write_all(&rdb).await?;
    writer_guard.flush().await
}

async fn write_reply(writer: &Arc<RwLock<OwnedWriteHalf>>, response: &str) {
    let mut writer_guard = writer.write().await;

    if let Err(e) = writer_guard.write_all(response.as_bytes()).await {
        error!(error = %e, "failed to write reply");
        return;
    }

    if let Err(e) = writer_guard.flush().await {
        error!(error = %e, "failed to flush reply");
    }
}
