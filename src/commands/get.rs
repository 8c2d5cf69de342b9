use std::sync::Arc;

use tokio::{sync::Mutex, time::Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

/// Handles the GET command.
///
/// A live string value is returned as a simple string; an absent or expired
/// key yields a null bulk string. Expired entries are swept here, on access.
pub async fn get(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::InvalidGetCommand);
    }

    let key = &arguments[0];
    let mut store_guard = store.lock().await;

    let Some(value) = store_guard.get(key) else {
        return Ok(CommandResult::Response(RespValue::NullBulkString.encode()));
    };

    if value.is_expired(Instant::now()) {
        store_guard.remove(key);
        return Ok(CommandResult::Response(RespValue::NullBulkString.encode()));
    }

    match value.data {
        DataType::String(ref stored) => Ok(CommandResult::Response(
            RespValue::SimpleString(stored.clone()).encode(),
        )),
        DataType::Stream(_) => Err(CommandError::InvalidDataTypeForKey),
    }
}
