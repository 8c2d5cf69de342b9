use std::sync::Arc;

use tokio::{sync::Mutex, time::Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

/// Handles the TYPE command: `+string`, `+stream` or `+none`.
pub async fn type_command(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::InvalidTypeCommand);
    }

    let key = &arguments[0];
    let mut store_guard = store.lock().await;

    let Some(value) = store_guard.get(key) else {
        return Ok(CommandResult::Response(
            RespValue::SimpleString("none".to_string()).encode(),
        ));
    };

    if value.is_expired(Instant::now()) {
        store_guard.remove(key);

        return Ok(CommandResult::Response(
            RespValue::SimpleString("none".to_string()).encode(),
        ));
    }

    let type_name = match value.data {
        DataType::String(_) => "string",
        DataType::Stream(_) => "stream",
    };

    Ok(CommandResult::Response(
        RespValue::SimpleString(type_name.to_string()).encode(),
    ))
}
