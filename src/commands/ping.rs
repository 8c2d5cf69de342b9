use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::RedisRole,
};

pub struct PingArguments;

impl PingArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if !arguments.is_empty() {
            return Err(CommandError::InvalidPingCommand);
        }

        Ok(Self)
    }
}

/// Handles the PING command.
///
/// Only a master replies `+PONG`. A replica absorbs pings silently so the
/// heartbeat pings a master sends down the replication stream never produce
/// an echo on a channel that has no reply slot for them.
pub fn ping(role: &RedisRole, arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    PingArguments::parse(arguments)?;

    match role {
        RedisRole::Master => Ok(CommandResult::Response(
            RespValue::SimpleString("PONG".to_string()).encode(),
        )),
        RedisRole::Replica(_) => Ok(CommandResult::NoResponse),
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::command_handler::CommandResult;
    use crate::server::RedisRole;

    use super::ping;

    #[test]
    fn test_ping_replies_pong_on_master_only() {
        let master_result = ping(&RedisRole::Master, Vec::new()).unwrap();
        assert!(
            matches!(master_result, CommandResult::Response(ref resp) if resp == "+PONG\r\n")
        );

        let replica_role = RedisRole::Replica(("127.0.0.1".to_string(), 6379));
        let replica_result = ping(&replica_role, Vec::new()).unwrap();
        assert!(matches!(replica_result, CommandResult::NoResponse));
    }

    #[test]
    fn test_ping_rejects_arguments() {
        assert!(ping(&RedisRole::Master, vec!["extra".to_string()]).is_err());
    }
}
