use std::sync::Arc;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    replication::ReplicationState,
    resp::RespValue,
    server::{RedisRole, RedisServer},
};

pub struct InfoArguments {
    section: String,
}

impl InfoArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidInfoCommand);
        }

        Ok(Self {
            section: arguments[0].to_lowercase(),
        })
    }
}

/// Handles `INFO replication`: the role plus, on a master, the replication
/// ID and current offset, as a bulk string of `key:value` lines.
pub fn info(
    server: &Arc<RedisServer>,
    replication: &Arc<ReplicationState>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let info_arguments = InfoArguments::parse(arguments)?;

    if info_arguments.section != "replication" {
        return Err(CommandError::InvalidInfoSection);
    }

    let mut lines = vec![format!("role:{}", server.role.as_string())];

    if server.role == RedisRole::Master {
        lines.push(format!("master_replid:{}", replication.repl_id()));
        lines.push(format!(
            "master_repl_offset:{}",
            replication.master_repl_offset()
        ));
    }

    Ok(CommandResult::Response(
        RespValue::BulkString(lines.join("\n")).encode(),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::commands::command_handler::CommandResult;
    use crate::replication::ReplicationState;
    use crate::server::RedisServer;

    use super::info;

    #[test]
    fn test_info_replication_on_master() {
        let server = Arc::new(RedisServer::new(vec!["redstream".to_string()]).unwrap());
        let replication = Arc::new(ReplicationState::new());

        let result = info(&server, &replication, vec!["replication".to_string()]).unwrap();

        let CommandResult::Response(resp) = result else {
            panic!("expected a response");
        };
        assert!(resp.contains("role:master"));
        assert!(resp.contains(&format!("master_replid:{}", replication.repl_id())));
        assert!(resp.contains("master_repl_offset:0"));
    }

    #[test]
    fn test_info_replication_on_replica() {
        let server = Arc::new(
            RedisServer::new(vec![
                "redstream".to_string(),
                "--replicaof".to_string(),
                "127.0.0.1 6379".to_string(),
            ])
            .unwrap(),
        );
        let replication = Arc::new(ReplicationState::new());

        let result = info(&server, &replication, vec!["replication".to_string()]).unwrap();

        let CommandResult::Response(resp) = result else {
            panic!("expected a response");
        };
        assert!(resp.contains("role:slave"));
        assert!(!resp.contains("master_replid"));
    }

    #[test]
    fn test_info_rejects_unknown_sections() {
        let server = Arc::new(RedisServer::new(vec!["redstream".to_string()]).unwrap());
        let replication = Arc::new(ReplicationState::new());

        assert!(info(&server, &replication, vec!["keyspace".to_string()]).is_err());
        assert!(info(&server, &replication, Vec::new()).is_err());
    }
}
