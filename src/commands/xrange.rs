use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        stream_utils::{encode_entries, parse_range_bound},
    },
    key_value_store::{DataType, KeyValueStore, StreamId},
    resp::RespValue,
};

pub struct XrangeArguments {
    key: String,
    start: StreamId,
    end: StreamId,
}

impl XrangeArguments {
    /// Parses `XRANGE key start end` with `-`/`+` as the min/max sentinels.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 3 {
            return Err(CommandError::InvalidXRangeCommand);
        }

        let start =
            parse_range_bound(&arguments[1], true).map_err(CommandError::InvalidStreamId)?;
        let end =
            parse_range_bound(&arguments[2], false).map_err(CommandError::InvalidStreamId)?;

        Ok(Self {
            key: arguments[0].clone(),
            start,
            end,
        })
    }
}

/// Handles the XRANGE command: all entries with `start <= id <= end`, each as
/// `[id, [field, value, ...]]`. A missing key yields an empty array.
pub async fn xrange(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let xrange_arguments = XrangeArguments::parse(arguments)?;

    let store_guard = store.lock().await;

    let Some(value) = store_guard.get(&xrange_arguments.key) else {
        return Ok(CommandResult::Response(
            RespValue::Array(Vec::new()).encode(),
        ));
    };

    let DataType::Stream(ref stream) = value.data else {
        return Err(CommandError::InvalidDataTypeForKey);
    };

    let entries = stream.range(xrange_arguments.start, xrange_arguments.end);

    Ok(CommandResult::Response(encode_entries(&entries).encode()))
}
