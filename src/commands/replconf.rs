use std::sync::Arc;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicationState,
    resp::RespValue,
};

pub struct ReplconfArguments {
    subcommand: String,
    rest: Vec<String>,
}

impl ReplconfArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.is_empty() || arguments.len() > 2 {
            return Err(CommandError::InvalidReplconfCommand);
        }

        Ok(Self {
            subcommand: arguments[0].to_lowercase(),
            rest: arguments[1..].to_vec(),
        })
    }
}

/// Handles the REPLCONF command on a master's client connection.
///
/// `listening-port` and `capa` are handshake configuration and reply `+OK`.
/// `ACK <offset>` is a replica reporting how far it has consumed the
/// replication stream: it is recorded against the sending connection and
/// produces no reply. `GETACK` is ignored on a master.
pub async fn replconf(
    client_address: &str,
    replication: &Arc<ReplicationState>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let replconf_arguments = ReplconfArguments::parse(arguments)?;

    match replconf_arguments.subcommand.as_str() {
        "ack" => {
            let offset = replconf_arguments
                .rest
                .first()
                .and_then(|raw| raw.parse::<u64>().ok())
                .ok_or(CommandError::InvalidReplconfCommand)?;

            replication.record_ack(client_address, offset).await;

            Ok(CommandResult::NoResponse)
        }
        "getack" => Ok(CommandResult::NoResponse),
        _ => Ok(CommandResult::Response(
            RespValue::SimpleString("OK".to_string()).encode(),
        )),
    }
}
