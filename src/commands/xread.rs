use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, Mutex},
    time::{timeout_at, Instant},
};

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{encode_entries, parse_read_baseline},
    },
    key_value_store::{DataType, KeyValueStore, StreamId},
    resp::RespValue,
    state::{State, StreamSubscriber},
};

pub struct XreadArguments {
    /// `None` - plain snapshot read; `Some(0)` - block indefinitely;
    /// `Some(ms)` - block with a deadline
    blocking_duration: Option<u64>,
    key_id_pairs: Vec<(String, String)>,
}

impl XreadArguments {
    /// Parses `XREAD [BLOCK ms] STREAMS key [key ...] id [id ...]`.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 3 {
            return Err(CommandError::InvalidXReadCommand);
        }

        let (blocking_duration, streams_index) = match arguments[0].to_lowercase().as_str() {
            "block" => {
                let duration_ms = arguments[1]
                    .parse::<u64>()
                    .map_err(|_| CommandError::InvalidXReadBlockDuration)?;

                if arguments.len() < 5 || arguments[2].to_lowercase() != "streams" {
                    return Err(CommandError::InvalidXReadOption);
                }

                (Some(duration_ms), 3)
            }
            "streams" => (None, 1),
            _ => return Err(CommandError::InvalidXReadOption),
        };

        let pairs = &arguments[streams_index..];

        if pairs.len() % 2 != 0 {
            return Err(CommandError::InvalidXReadCommand);
        }

        let key_count = pairs.len() / 2;
        let mut key_id_pairs = Vec::with_capacity(key_count);

        for i in 0..key_count {
            key_id_pairs.push((pairs[i].clone(), pairs[key_count + i].clone()));
        }

        Ok(Self {
            blocking_duration,
            key_id_pairs,
        })
    }
}

/// Handles the XREAD command.
///
/// For each listed stream, returns the entries with IDs strictly greater
/// than the given baseline. `$` resolves to the stream's tail at the moment
/// the command arrives (the zero ID for a missing or empty stream), so it
/// only ever matches entries appended afterwards and is meaningful with
/// BLOCK.
///
/// Without BLOCK the current snapshot is returned, possibly an empty array.
/// With BLOCK the command parks on a per-key wakeup channel until an XADD
/// signals one of the watched keys, then re-scans under the store lock; a
/// finite block duration that elapses first yields a null bulk string.
pub async fn xread(
    client_address: &str,
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xread_arguments = XreadArguments::parse(arguments)?;

    let baselines =
        resolve_baselines(Arc::clone(&store), xread_arguments.key_id_pairs).await?;

    let Some(block_ms) = xread_arguments.blocking_duration else {
        let snapshot = read_streams(Arc::clone(&store), &baselines).await?;
        return Ok(CommandResult::Response(snapshot.encode()));
    };

    // Subscribe before the first scan so an XADD landing between the scan
    // and the park cannot be missed.
    let (sender, mut receiver) = mpsc::channel(1);
    add_subscribers(Arc::clone(&state), &baselines, client_address, sender).await;

    let snapshot = match read_streams(Arc::clone(&store), &baselines).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            remove_subscribers(state, &baselines, client_address).await;
            return Err(e);
        }
    };

    if !is_empty_reply(&snapshot) {
        remove_subscribers(state, &baselines, client_address).await;
        return Ok(CommandResult::Response(snapshot.encode()));
    }

    let deadline = match block_ms {
        0 => None,
        ms => Some(Instant::now() + Duration::from_millis(ms)),
    };

    let reply = loop {
        let woken = match deadline {
            Some(deadline) => match timeout_at(deadline, receiver.recv()).await {
                Ok(signal) => signal.is_some(),
                Err(_) => break None,
            },
            None => receiver.recv().await.is_some(),
        };

        if !woken {
            break None;
        }

        let rescan = match read_streams(Arc::clone(&store), &baselines).await {
            Ok(rescan) => rescan,
            Err(e) => {
                remove_subscribers(state, &baselines, client_address).await;
                return Err(e);
            }
        };

        if !is_empty_reply(&rescan) {
            break Some(rescan);
        }
    };

    remove_subscribers(state, &baselines, client_address).await;

    match reply {
        Some(value) => Ok(CommandResult::Response(value.encode())),
        None => Ok(CommandResult::Response(RespValue::NullBulkString.encode())),
    }
}

/// Resolves each requested ID into a concrete baseline, fixing `$` to the
/// stream tail as of now.
async fn resolve_baselines(
    store: Arc<Mutex<KeyValueStore>>,
    key_id_pairs: Vec<(String, String)>,
) -> Result<Vec<(String, StreamId)>, CommandError> {
    let store_guard = store.lock().await;
    let mut baselines = Vec::with_capacity(key_id_pairs.len());

    for (key, raw_id) in key_id_pairs {
        let baseline = if raw_id == "$" {
            match store_guard.get(&key) {
                Some(value) => {
                    let DataType::Stream(ref stream) = value.data else {
                        return Err(CommandError::InvalidDataTypeForKey);
                    };

                    stream.last_id().unwrap_or(StreamId::ZERO)
                }
                None => StreamId::ZERO,
            }
        } else {
            parse_read_baseline(&raw_id).map_err(CommandError::InvalidStreamId)?
        };

        baselines.push((key, baseline));
    }

    Ok(baselines)
}

/// Collects the entries strictly after each baseline. Streams with nothing
/// new are omitted from the outer array.
async fn read_streams(
    store: Arc<Mutex<KeyValueStore>>,
    baselines: &[(String, StreamId)],
) -> Result<RespValue, CommandError> {
    let store_guard = store.lock().await;
    let mut result_streams = Vec::new();

    for (key, baseline) in baselines {
        let Some(value) = store_guard.get(key) else {
            continue;
        };

        let DataType::Stream(ref stream) = value.data else {
            return Err(CommandError::InvalidDataTypeForKey);
        };

        let entries = stream.entries_after(*baseline);

        if !entries.is_empty() {
            result_streams.push(RespValue::Array(vec![
                RespValue::BulkString(key.clone()),
                encode_entries(&entries),
            ]));
        }
    }

    Ok(RespValue::Array(result_streams))
}

fn is_empty_reply(value: &RespValue) -> bool {
    matches!(value, RespValue::Array(elements) if elements.is_empty())
}

async fn add_subscribers(
    state: Arc<Mutex<State>>,
    baselines: &[(String, StreamId)],
    client_address: &str,
    sender: mpsc::Sender<()>,
) {
    let mut state_guard = state.lock().await;

    for (key, _) in baselines {
        state_guard.add_stream_subscriber(
            key.clone(),
            StreamSubscriber {
                client_address: client_address.to_string(),
                sender: sender.clone(),
            },
        );
    }
}

async fn remove_subscribers(
    state: Arc<Mutex<State>>,
    baselines: &[(String, StreamId)],
    client_address: &str,
) {
    let mut state_guard = state.lock().await;

    for (key, _) in baselines {
        state_guard.remove_stream_subscriber(key, client_address);
    }
}
