use thiserror::Error;

use crate::resp::RespValue;

/// Argument and domain errors produced by command parsing and execution.
///
/// `as_string` renders the RESP wire form; the bit-exact strings clients and
/// test harnesses match on live here.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CommandError {
    #[error("unknown command")]
    InvalidCommand,
    #[error("invalid command argument")]
    InvalidCommandArgument,
    #[error("invalid PING command")]
    InvalidPingCommand,
    #[error("invalid ECHO command")]
    InvalidEchoCommand,
    #[error("invalid GET command")]
    InvalidGetCommand,
    #[error("invalid SET command")]
    InvalidSetCommand,
    #[error("invalid SET command argument")]
    InvalidSetCommandArgument,
    #[error("invalid SET command expiration")]
    InvalidSetCommandExpiration,
    #[error("invalid DEL command")]
    InvalidDelCommand,
    #[error("invalid INCR command")]
    InvalidIncrCommand,
    #[error("invalid INCR value")]
    InvalidIncrValue,
    #[error("invalid TYPE command")]
    InvalidTypeCommand,
    #[error("invalid KEYS command")]
    InvalidKeysCommand,
    #[error("invalid glob pattern: {0}")]
    InvalidGlobPattern(String),
    #[error("invalid XADD command")]
    InvalidXAddCommand,
    #[error("{0}")]
    InvalidStreamId(String),
    #[error("invalid data type for key")]
    InvalidDataTypeForKey,
    #[error("invalid XRANGE command")]
    InvalidXRangeCommand,
    #[error("invalid XREAD command")]
    InvalidXReadCommand,
    #[error("invalid XREAD command option")]
    InvalidXReadOption,
    #[error("invalid XREAD block duration")]
    InvalidXReadBlockDuration,
    #[error("invalid MULTI command")]
    InvalidMultiCommand,
    #[error("MULTI calls can not be nested")]
    MultiNested,
    #[error("invalid EXEC command")]
    InvalidExecCommand,
    #[error("EXEC without MULTI")]
    ExecWithoutMulti,
    #[error("invalid DISCARD command")]
    InvalidDiscardCommand,
    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,
    #[error("invalid INFO command")]
    InvalidInfoCommand,
    #[error("invalid INFO section")]
    InvalidInfoSection,
    #[error("invalid REPLCONF command")]
    InvalidReplconfCommand,
    #[error("invalid PSYNC command")]
    InvalidPsyncCommand,
    #[error("invalid PSYNC replication ID")]
    InvalidPsyncReplicationId,
    #[error("invalid PSYNC offset")]
    InvalidPsyncOffset,
    #[error("invalid WAIT command")]
    InvalidWaitCommand,
    #[error("invalid WAIT command argument")]
    InvalidWaitCommandArgument,
    #[error("WAIT cannot be used with replica instances")]
    WaitNotSupportedByReplica,
    #[error("write commands not allowed in replica")]
    WriteCommandToReplica,
    #[error("invalid CONFIG GET command")]
    InvalidConfigGetCommand,
    #[error("invalid CONFIG GET command argument")]
    InvalidConfigGetCommandArgument,
}

impl CommandError {
    pub fn as_string(&self) -> String {
        match self {
            // The registry is closed: unknown names get the bare error reply.
            CommandError::InvalidCommand => RespValue::Error("Error".to_string()).encode(),
            CommandError::InvalidIncrValue => {
                RespValue::Error("ERR value is not an integer or out of range".to_string()).encode()
            }
            CommandError::MultiNested => {
                RespValue::Error("ERR MULTI calls can not be nested".to_string()).encode()
            }
            CommandError::ExecWithoutMulti => {
                RespValue::Error("ERR EXEC without MULTI".to_string()).encode()
            }
            CommandError::DiscardWithoutMulti => {
                RespValue::Error("ERR DISCARD without MULTI".to_string()).encode()
            }
            CommandError::InvalidStreamId(message) => {
                RespValue::Error(format!("ERR {}", message)).encode()
            }
            other => RespValue::Error(format!("ERR {}", other)).encode(),
        }
    }
}
