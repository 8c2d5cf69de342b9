use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{parse_entry_id_spec, EntryIdSpec, ID_MUST_BE_POSITIVE, ID_TOO_SMALL},
    },
    key_value_store::{DataType, KeyValueStore, Stream, StreamEntry, StreamId, Value},
    resp::RespValue,
    state::State,
};

/// Represents the parsed arguments for the XADD command.
pub struct XaddArguments {
    /// The stream key the entry is appended to
    key: String,
    /// The requested entry ID: `*`, `ms-*` or an explicit `ms-seq`
    id: String,
    /// Field-value pairs in the order the client sent them
    fields: Vec<(String, String)>,
}

impl XaddArguments {
    /// Parses `XADD key id field value [field value ...]`.
    ///
    /// At least one field-value pair is required and pairs must be complete
    /// (an even number of trailing arguments).
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 4 || arguments[2..].len() % 2 != 0 {
            return Err(CommandError::InvalidXAddCommand);
        }

        Ok(Self {
            key: arguments[0].clone(),
            id: arguments[1].clone(),
            fields: arguments[2..]
                .chunks(2)
                .map(|chunk| (chunk[0].clone(), chunk[1].clone()))
                .collect(),
        })
    }
}

/// Handles the XADD command.
///
/// Resolves the requested ID against the stream's current tail, appends the
/// entry, wakes any blocked XREAD on the key and replies with the resolved ID
/// as a bulk string.
///
/// ID resolution:
/// - `*` - current unix milliseconds, sequence 0; if the tail is already at
///   or past that millisecond, the tail's millisecond with the next sequence
/// - `ms-*` - sequence 0 for a new millisecond, `last.seq + 1` within the
///   tail's millisecond; rejected for `0-*` on an empty stream since it would
///   produce the reserved `0-0`
/// - `ms-seq` - must be strictly greater than the tail; `0-0` is always
///   rejected
pub async fn xadd(
    store: Arc<Mutex<KeyValueStore>>,
    state: Arc<Mutex<State>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xadd_arguments = XaddArguments::parse(arguments)?;

    let id_spec =
        parse_entry_id_spec(&xadd_arguments.id).map_err(CommandError::InvalidStreamId)?;

    let mut store_guard = store.lock().await;

    let last_id = match store_guard.get(&xadd_arguments.key) {
        Some(value) => {
            let DataType::Stream(ref stream) = value.data else {
                return Err(CommandError::InvalidDataTypeForKey);
            };

            stream.last_id()
        }
        None => None,
    };

    let id = resolve_entry_id(id_spec, last_id, current_unix_ms())
        .map_err(CommandError::InvalidStreamId)?;

    let entry = StreamEntry {
        id,
        fields: xadd_arguments.fields,
    };

    match store_guard.get_mut(&xadd_arguments.key) {
        Some(value) => {
            let DataType::Stream(ref mut stream) = value.data else {
                return Err(CommandError::InvalidDataTypeForKey);
            };

            stream.append(entry);
        }
        None => {
            let mut stream = Stream::new();
            stream.append(entry);

            store_guard.insert(
                xadd_arguments.key.clone(),
                Value {
                    data: DataType::Stream(stream),
                    expiration: None,
                },
            );
        }
    }

    drop(store_guard);

    let state_guard = state.lock().await;
    state_guard.notify_stream_subscribers(&xadd_arguments.key);

    Ok(CommandResult::Response(
        RespValue::BulkString(id.to_string()).encode(),
    ))
}

/// Resolves an ID specification against the stream's tail.
///
/// Generated IDs must stay strictly increasing even if the wall clock steps
/// backwards, so auto-generation never goes below the tail's millisecond.
fn resolve_entry_id(
    spec: EntryIdSpec,
    last_id: Option<StreamId>,
    now_ms: u64,
) -> Result<StreamId, String> {
    match spec {
        EntryIdSpec::Auto => match last_id {
            Some(last) if last.ms >= now_ms => Ok(StreamId::new(last.ms, last.seq + 1)),
            _ => Ok(StreamId::new(now_ms, 0)),
        },
        EntryIdSpec::AutoSequence(ms) => match last_id {
            None => {
                if ms == 0 {
                    Err(ID_MUST_BE_POSITIVE.to_string())
                } else {
                    Ok(StreamId::new(ms, 0))
                }
            }
            Some(last) => {
                if ms < last.ms {
                    Err(ID_TOO_SMALL.to_string())
                } else if ms == last.ms {
                    Ok(StreamId::new(ms, last.seq + 1))
                } else {
                    Ok(StreamId::new(ms, 0))
                }
            }
        },
        EntryIdSpec::Explicit(id) => {
            if id == StreamId::ZERO {
                return Err(ID_MUST_BE_POSITIVE.to_string());
            }

            match last_id {
                Some(last) if id <= last => Err(ID_TOO_SMALL.to_string()),
                _ => Ok(id),
            }
        }
    }
}

fn current_unix_ms() -> u64 {
    Timestamp::now().as_millisecond().max(0) as u64
}
