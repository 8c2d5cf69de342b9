//! Per-connection transaction buffering for MULTI/EXEC/DISCARD.
//!
//! The buffer lives on the connection's reader task, so it needs no locking
//! and disappears with the connection.

use crate::commands::{CommandError, CommandHandler};

#[derive(Debug, Default)]
pub struct TransactionBuffer {
    active: bool,
    queued: Vec<CommandHandler>,
}

impl TransactionBuffer {
    pub fn new() -> Self {
        TransactionBuffer {
            active: false,
            queued: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Activates the buffer for a MULTI. A second MULTI is rejected instead
    /// of silently restarting the queue.
    pub fn start(&mut self) -> Result<(), CommandError> {
        if self.active {
            return Err(CommandError::MultiNested);
        }

        self.active = true;
        self.queued.clear();

        Ok(())
    }

    pub fn queue(&mut self, command: CommandHandler) {
        self.queued.push(command);
    }

    /// Drains the queue for EXEC and deactivates the buffer.
    pub fn take(&mut self) -> Vec<CommandHandler> {
        self.active = false;
        std::mem::take(&mut self.queued)
    }

    /// Clears the queue for DISCARD and deactivates the buffer.
    pub fn discard(&mut self) {
        self.active = false;
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::{CommandError, CommandHandler};
    use crate::resp::RespValue;

    use super::TransactionBuffer;

    fn handler(parts: &[&str]) -> CommandHandler {
        CommandHandler::new(&RespValue::command(parts)).unwrap()
    }

    #[test]
    fn test_start_queue_take() {
        let mut buffer = TransactionBuffer::new();
        assert!(!buffer.is_active());

        buffer.start().unwrap();
        assert!(buffer.is_active());

        buffer.queue(handler(&["SET", "a", "1"]));
        buffer.queue(handler(&["INCR", "a"]));

        let queued = buffer.take();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].name, "SET");
        assert_eq!(queued[1].name, "INCR");
        assert!(!buffer.is_active());

        // A later EXEC sees an empty queue.
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn test_nested_multi_is_rejected() {
        let mut buffer = TransactionBuffer::new();

        buffer.start().unwrap();
        buffer.queue(handler(&["SET", "a", "1"]));

        assert_eq!(buffer.start(), Err(CommandError::MultiNested));

        // The rejection must not clobber the queue already built up.
        assert!(buffer.is_active());
        assert_eq!(buffer.take().len(), 1);
    }

    #[test]
    fn test_discard_clears_and_deactivates() {
        let mut buffer = TransactionBuffer::new();

        buffer.start().unwrap();
        buffer.queue(handler(&["SET", "a", "1"]));
        buffer.discard();

        assert!(!buffer.is_active());
        assert!(buffer.take().is_empty());
    }
}
