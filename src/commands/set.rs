use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
    server::RedisRole,
};

pub struct SetArguments {
    key: String,
    value: String,
    expiration: Option<Instant>,
}

impl SetArguments {
    /// Parses `SET key value [PX milliseconds]`.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::InvalidSetCommand);
        }

        let mut expiration: Option<Instant> = None;

        if arguments.len() == 4 {
            if arguments[2].to_lowercase() != "px" {
                return Err(CommandError::InvalidSetCommandArgument);
            }

            let milliseconds = arguments[3]
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidSetCommandExpiration)?;

            expiration = Some(Instant::now() + Duration::from_millis(milliseconds));
        }

        Ok(Self {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            expiration,
        })
    }
}

/// Handles the SET command.
///
/// The insert atomically replaces any prior entry, which also resets any
/// prior expiry. Only a master replies `+OK`; a replica applies the write
/// silently because the replication stream has no reply channel.
pub async fn set(
    role: &RedisRole,
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    store_guard.insert(
        set_arguments.key,
        Value {
            data: DataType::String(set_arguments.value),
            expiration: set_arguments.expiration,
        },
    );

    match role {
        RedisRole::Master => Ok(CommandResult::Response(
            RespValue::SimpleString("OK".to_string()).encode(),
        )),
        RedisRole::Replica(_) => Ok(CommandResult::NoResponse),
    }
}
