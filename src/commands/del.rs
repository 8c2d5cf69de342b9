use std::sync::Arc;

use tokio::{sync::Mutex, time::Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::RedisRole,
};

/// Handles the DEL command.
///
/// Replies with the number of keys actually removed. An entry that has
/// already expired is dropped from the map but not counted, the same way a
/// lazy GET sweep would have removed it first.
pub async fn del(
    role: &RedisRole,
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.is_empty() {
        return Err(CommandError::InvalidDelCommand);
    }

    let now = Instant::now();
    let mut removed: i64 = 0;

    let mut store_guard = store.lock().await;

    for key in &arguments {
        if let Some(value) = store_guard.remove(key) {
            if !value.is_expired(now) {
                removed += 1;
            }
        }
    }

    match role {
        RedisRole::Master => Ok(CommandResult::Response(
            RespValue::Integer(removed).encode(),
        )),
        RedisRole::Replica(_) => Ok(CommandResult::NoResponse),
    }
}
