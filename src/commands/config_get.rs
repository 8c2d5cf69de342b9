use std::sync::Arc;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisServer,
};

pub struct ConfigGetArguments {
    parameter: String,
}

impl ConfigGetArguments {
    /// Parses `CONFIG GET <parameter>`; GET is the only supported
    /// subcommand.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 || arguments[0].to_uppercase() != "GET" {
            return Err(CommandError::InvalidConfigGetCommand);
        }

        Ok(Self {
            parameter: arguments[1].to_lowercase(),
        })
    }
}

/// Handles `CONFIG GET dir|dbfilename`, replying `[parameter, value]`.
pub fn config_get(
    server: &Arc<RedisServer>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let config_arguments = ConfigGetArguments::parse(arguments)?;

    let value = match config_arguments.parameter.as_str() {
        "dir" => server.dir.clone().unwrap_or_default(),
        "dbfilename" => server.dbfilename.clone().unwrap_or_default(),
        _ => return Err(CommandError::InvalidConfigGetCommandArgument),
    };

    Ok(CommandResult::Response(
        RespValue::Array(vec![
            RespValue::BulkString(config_arguments.parameter),
            RespValue::BulkString(value),
        ])
        .encode(),
    ))
}
