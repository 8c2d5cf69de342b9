use std::sync::Arc;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicationState,
    resp::RespValue,
};

pub struct PsyncArguments {
    repl_id: String,
}

impl PsyncArguments {
    /// Parses `PSYNC <replid|?> <offset|-1>`. The offset must be numeric but
    /// is otherwise unused: only full resyncs are served.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::InvalidPsyncCommand);
        }

        arguments[1]
            .parse::<i64>()
            .map_err(|_| CommandError::InvalidPsyncOffset)?;

        Ok(Self {
            repl_id: arguments[0].clone(),
        })
    }
}

/// Handles the PSYNC command on the master.
///
/// Replies with the `+FULLRESYNC <replid> <offset>` header; the connection
/// orchestrator follows it with the empty RDB payload and registers the
/// connection as a replica. Only a full resync is supported, so a replica
/// asking to continue from a known replication ID is rejected unless the ID
/// matches ours.
pub fn psync(
    replication: &Arc<ReplicationState>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let psync_arguments = PsyncArguments::parse(arguments)?;

    if psync_arguments.repl_id != "?" && psync_arguments.repl_id != replication.repl_id() {
        return Err(CommandError::InvalidPsyncReplicationId);
    }

    Ok(CommandResult::FullResync(
        RespValue::SimpleString(format!(
            "FULLRESYNC {} {}",
            replication.repl_id(),
            replication.master_repl_offset()
        ))
        .encode(),
    ))
}
