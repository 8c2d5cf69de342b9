use crate::{
    commands::{command_error::CommandError, command_handler::CommandHandler},
    resp::RespValue,
    transaction::TransactionBuffer,
};

/// What the connection should do with a dispatched command.
#[derive(Debug, PartialEq)]
pub enum DispatchResult {
    /// Reply immediately without executing anything (+OK, +QUEUED, *0)
    Immediate(String),
    /// Execute this one command and reply with its result
    ExecuteSingle(CommandHandler),
    /// EXEC: run the queued commands in order and frame their replies under
    /// one outer array
    ExecuteBatch(Vec<CommandHandler>),
}

/// Routes a parsed command through the connection's transaction buffer.
///
/// MULTI, EXEC and DISCARD drive the buffer itself and are never queued.
/// While a transaction is active every other command is validated and
/// appended instead of executed, replying `+QUEUED`; a command with bad
/// arguments is rejected at queue time and does not enter the queue.
pub fn dispatch_command(
    command: CommandHandler,
    transaction: &mut TransactionBuffer,
) -> Result<DispatchResult, CommandError> {
    match command.name.as_str() {
        "MULTI" => {
            if !command.arguments.is_empty() {
                return Err(CommandError::InvalidMultiCommand);
            }

            transaction.start()?;

            Ok(DispatchResult::Immediate(
                RespValue::SimpleString("OK".to_string()).encode(),
            ))
        }
        "EXEC" => {
            if !command.arguments.is_empty() {
                return Err(CommandError::InvalidExecCommand);
            }

            if !transaction.is_active() {
                return Err(CommandError::ExecWithoutMulti);
            }

            let queued = transaction.take();

            if queued.is_empty() {
                Ok(DispatchResult::Immediate(
                    RespValue::Array(Vec::new()).encode(),
                ))
            } else {
                Ok(DispatchResult::ExecuteBatch(queued))
            }
        }
        "DISCARD" => {
            if !command.arguments.is_empty() {
                return Err(CommandError::InvalidDiscardCommand);
            }

            if !transaction.is_active() {
                return Err(CommandError::DiscardWithoutMulti);
            }

            transaction.discard();

            Ok(DispatchResult::Immediate(
                RespValue::SimpleString("OK".to_string()).encode(),
            ))
        }
        _ if transaction.is_active() => {
            // PSYNC upgrades the connection and has no reply slot to frame
            // under EXEC's outer array.
            if command.name == "PSYNC" {
                return Err(CommandError::InvalidPsyncCommand);
            }

            if let Some(error) = command.validate_command_arguments() {
                return Err(error);
            }

            transaction.queue(command);

            Ok(DispatchResult::Immediate(
                RespValue::SimpleString("QUEUED".to_string()).encode(),
            ))
        }
        _ => Ok(DispatchResult::ExecuteSingle(command)),
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::{CommandError, CommandHandler};
    use crate::resp::RespValue;
    use crate::transaction::TransactionBuffer;

    use super::{dispatch_command, DispatchResult};

    fn handler(parts: &[&str]) -> CommandHandler {
        CommandHandler::new(&RespValue::command(parts)).unwrap()
    }

    #[test]
    fn test_commands_outside_a_transaction_execute_directly() {
        let mut transaction = TransactionBuffer::new();

        let result = dispatch_command(handler(&["GET", "k"]), &mut transaction).unwrap();
        assert!(matches!(result, DispatchResult::ExecuteSingle(ref cmd) if cmd.name == "GET"));
    }

    #[test]
    fn test_multi_queue_exec_flow() {
        let mut transaction = TransactionBuffer::new();

        let result = dispatch_command(handler(&["MULTI"]), &mut transaction).unwrap();
        assert_eq!(result, DispatchResult::Immediate("+OK\r\n".to_string()));

        for parts in [&["SET", "a", "1"][..], &["INCR", "a"][..]] {
            let result = dispatch_command(handler(parts), &mut transaction).unwrap();
            assert_eq!(
                result,
                DispatchResult::Immediate("+QUEUED\r\n".to_string()),
                "queueing {:?}",
                parts
            );
        }

        let result = dispatch_command(handler(&["EXEC"]), &mut transaction).unwrap();
        let DispatchResult::ExecuteBatch(batch) = result else {
            panic!("expected a batch");
        };
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].name, "SET");
        assert_eq!(batch[1].name, "INCR");
    }

    #[test]
    fn test_exec_with_empty_queue_replies_empty_array() {
        let mut transaction = TransactionBuffer::new();

        dispatch_command(handler(&["MULTI"]), &mut transaction).unwrap();
        let result = dispatch_command(handler(&["EXEC"]), &mut transaction).unwrap();

        assert_eq!(result, DispatchResult::Immediate("*0\r\n".to_string()));
    }

    #[test]
    fn test_exec_and_discard_without_multi_are_errors() {
        let mut transaction = TransactionBuffer::new();

        assert_eq!(
            dispatch_command(handler(&["EXEC"]), &mut transaction),
            Err(CommandError::ExecWithoutMulti)
        );
        assert_eq!(
            dispatch_command(handler(&["DISCARD"]), &mut transaction),
            Err(CommandError::DiscardWithoutMulti)
        );
    }

    #[test]
    fn test_nested_multi_is_rejected() {
        let mut transaction = TransactionBuffer::new();

        dispatch_command(handler(&["MULTI"]), &mut transaction).unwrap();

        assert_eq!(
            dispatch_command(handler(&["MULTI"]), &mut transaction),
            Err(CommandError::MultiNested)
        );
    }

    #[test]
    fn test_discard_empties_the_queue() {
        let mut transaction = TransactionBuffer::new();

        dispatch_command(handler(&["MULTI"]), &mut transaction).unwrap();
        dispatch_command(handler(&["SET", "a", "1"]), &mut transaction).unwrap();

        let result = dispatch_command(handler(&["DISCARD"]), &mut transaction).unwrap();
        assert_eq!(result, DispatchResult::Immediate("+OK\r\n".to_string()));

        // The queued SET is gone; a later EXEC is a fresh error.
        assert_eq!(
            dispatch_command(handler(&["EXEC"]), &mut transaction),
            Err(CommandError::ExecWithoutMulti)
        );
    }

    #[test]
    fn test_malformed_commands_are_rejected_at_queue_time() {
        let mut transaction = TransactionBuffer::new();

        dispatch_command(handler(&["MULTI"]), &mut transaction).unwrap();

        let result = dispatch_command(handler(&["SET", "only-key"]), &mut transaction);
        assert!(result.is_err());

        // The rejected command did not enter the queue.
        let result = dispatch_command(handler(&["EXEC"]), &mut transaction).unwrap();
        assert_eq!(result, DispatchResult::Immediate("*0\r\n".to_string()));
    }
}
