use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    commands::{
        command_error::CommandError,
        config_get::{config_get, ConfigGetArguments},
        del::del,
        echo::{echo, EchoArguments},
        get::get,
        incr::incr,
        info::{info, InfoArguments},
        keys::{keys, KeysArguments},
        ping::{ping, PingArguments},
        psync::{psync, PsyncArguments},
        replconf::{replconf, ReplconfArguments},
        set::{set, SetArguments},
        type_command::type_command,
        wait::{wait, WaitArguments},
        xadd::{xadd, XaddArguments},
        xrange::{xrange, XrangeArguments},
        xread::{xread, XreadArguments},
    },
    key_value_store::KeyValueStore,
    replication::{ReplicationState, PROPAGATED_COMMANDS},
    resp::RespValue,
    server::{RedisRole, RedisServer},
    state::State,
};

/// What a command execution produced.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// No bytes go back on this channel (replica-applied writes, ACKs)
    NoResponse,
    /// A fully encoded RESP reply
    Response(String),
    /// The FULLRESYNC header; the connection orchestrator follows it with
    /// the RDB payload and registers the connection as a replica
    FullResync(String),
}

/// A parsed command: uppercased name, flat string arguments and the original
/// RESP frame (kept for re-encoding during propagation).
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
    pub input: RespValue,
}

impl CommandHandler {
    /// Builds a handler from a decoded RESP frame, which must be an array of
    /// bulk strings with the command name first.
    pub fn new(input: &RespValue) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = input else {
            return Err(CommandError::InvalidCommand);
        };

        let name = match elements.first() {
            Some(RespValue::BulkString(s)) => s.to_uppercase(),
            _ => return Err(CommandError::InvalidCommandArgument),
        };

        let mut arguments = Vec::with_capacity(elements.len().saturating_sub(1));

        for element in &elements[1..] {
            match element {
                RespValue::BulkString(s) => arguments.push(s.clone()),
                _ => return Err(CommandError::InvalidCommandArgument),
            }
        }

        Ok(Self {
            name,
            arguments,
            input: input.clone(),
        })
    }

    /// True for `REPLCONF GETACK ...`, which the replica's master-connection
    /// loop answers itself because only it knows the consumed-byte ledger.
    pub fn is_getack(&self) -> bool {
        self.name == "REPLCONF"
            && self
                .arguments
                .first()
                .is_some_and(|sub| sub.eq_ignore_ascii_case("getack"))
    }

    /// Checks the arguments against the command's expected shape without
    /// executing anything. Used when queueing into a transaction, so a
    /// malformed command is rejected at queue time.
    pub fn validate_command_arguments(&self) -> Option<CommandError> {
        match self.name.as_str() {
            "PING" => PingArguments::parse(self.arguments.clone()).err(),
            "ECHO" => EchoArguments::parse(self.arguments.clone()).err(),
            "GET" => (self.arguments.len() != 1).then_some(CommandError::InvalidGetCommand),
            "SET" => SetArguments::parse(self.arguments.clone()).err(),
            "DEL" => self
                .arguments
                .is_empty()
                .then_some(CommandError::InvalidDelCommand),
            "INCR" => (self.arguments.len() != 1).then_some(CommandError::InvalidIncrCommand),
            "TYPE" => (self.arguments.len() != 1).then_some(CommandError::InvalidTypeCommand),
            "KEYS" => KeysArguments::parse(self.arguments.clone()).err(),
            "XADD" => XaddArguments::parse(self.arguments.clone()).err(),
            "XRANGE" => XrangeArguments::parse(self.arguments.clone()).err(),
            "XREAD" => XreadArguments::parse(self.arguments.clone()).err(),
            "INFO" => InfoArguments::parse(self.arguments.clone()).err(),
            "REPLCONF" => ReplconfArguments::parse(self.arguments.clone()).err(),
            "PSYNC" => PsyncArguments::parse(self.arguments.clone()).err(),
            "WAIT" => WaitArguments::parse(self.arguments.clone()).err(),
            "CONFIG" => ConfigGetArguments::parse(self.arguments.clone()).err(),
            "MULTI" | "EXEC" | "DISCARD" => None,
            _ => Some(CommandError::InvalidCommand),
        }
    }

    /// Executes the command against the shared state.
    ///
    /// Role-dependent behavior lives in the individual handlers (PING and
    /// the write commands reply on a master only). A successful SET or DEL
    /// in master role is additionally re-encoded and propagated to every
    /// attached replica - this is the single propagation point, so writes
    /// executed from inside EXEC propagate exactly like standalone ones.
    pub async fn execute(
        &self,
        server: &Arc<RedisServer>,
        replication: &Arc<ReplicationState>,
        client_address: &str,
        store: Arc<Mutex<KeyValueStore>>,
        state: Arc<Mutex<State>>,
    ) -> Result<CommandResult, CommandError> {
        let result = match self.name.as_str() {
            "PING" => ping(&server.role, self.arguments.clone()),
            "ECHO" => echo(self.arguments.clone()),
            "GET" => get(store, self.arguments.clone()).await,
            "SET" => set(&server.role, store, self.arguments.clone()).await,
            "DEL" => del(&server.role, store, self.arguments.clone()).await,
            "INCR" => incr(store, self.arguments.clone()).await,
            "TYPE" => type_command(store, self.arguments.clone()).await,
            "KEYS" => keys(store, self.arguments.clone()).await,
            "XADD" => xadd(store, state, self.arguments.clone()).await,
            "XRANGE" => xrange(store, self.arguments.clone()).await,
            "XREAD" => xread(client_address, store, state, self.arguments.clone()).await,
            "INFO" => info(server, replication, self.arguments.clone()),
            "REPLCONF" => replconf(client_address, replication, self.arguments.clone()).await,
            "PSYNC" => match server.role {
                RedisRole::Master => psync(replication, self.arguments.clone()),
                RedisRole::Replica(_) => Err(CommandError::InvalidPsyncCommand),
            },
            "WAIT" => match server.role {
                RedisRole::Master => wait(replication, self.arguments.clone()).await,
                RedisRole::Replica(_) => Err(CommandError::WaitNotSupportedByReplica),
            },
            "CONFIG" => config_get(server, self.arguments.clone()),
            _ => Err(CommandError::InvalidCommand),
        }?;

        if server.role == RedisRole::Master && PROPAGATED_COMMANDS.contains(&self.name.as_str()) {
            replication.propagate(&self.input).await;
        }

        Ok(result)
    }
}
