use std::collections::HashSet;
use std::{sync::Arc, time::Duration};

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{timeout_at, Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicationState,
    resp::RespValue,
};

pub struct WaitArguments {
    number_of_replicas: usize,
    /// `None` means no deadline (a timeout argument of 0).
    timeout: Option<Duration>,
}

impl WaitArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::InvalidWaitCommand);
        }

        let number_of_replicas = arguments[0]
            .parse::<usize>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        let timeout_ms = arguments[1]
            .parse::<u64>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        Ok(Self {
            number_of_replicas,
            timeout: match timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        })
    }
}

/// Handles the WAIT command on the master.
///
/// Snapshots the master offset as the target, asks every replica for an ACK
/// via `REPLCONF GETACK *`, then counts distinct replicas whose reported
/// offset reaches the target. The reply fires once, whichever comes first:
/// the requested replica count is reached, or the deadline elapses - in
/// which case the count so far is returned, which may be lower than asked.
///
/// If no write has ever been propagated every replica is trivially caught
/// up, so the current replica count is returned immediately.
pub async fn wait(
    replication: &Arc<ReplicationState>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    let target = replication.master_repl_offset();

    if target == 0 {
        let count = replication.replica_count().await as i64;
        return Ok(CommandResult::Response(RespValue::Integer(count).encode()));
    }

    // Subscribe before broadcasting so a fast ACK cannot slip past us.
    let mut acks = replication.subscribe_acks();
    replication.broadcast_getack().await;

    let deadline = wait_arguments.timeout.map(|timeout| Instant::now() + timeout);
    let mut acked_replicas: HashSet<String> = HashSet::new();

    while acked_replicas.len() < wait_arguments.number_of_replicas {
        let event = match deadline {
            Some(deadline) => match timeout_at(deadline, acks.recv()).await {
                Ok(event) => event,
                Err(_) => break,
            },
            None => acks.recv().await,
        };

        match event {
            Ok(ack) if ack.offset >= target => {
                acked_replicas.insert(ack.client_address);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }

    Ok(CommandResult::Response(
        RespValue::Integer(acked_replicas.len() as i64).encode(),
    ))
}
