use std::sync::Arc;

use tokio::{sync::Mutex, time::Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
};

struct IncrArguments {
    key: String,
}

impl IncrArguments {
    fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidIncrCommand);
        }

        Ok(Self {
            key: arguments[0].clone(),
        })
    }
}

/// Handles the INCR command.
///
/// A missing (or expired) key is created as `"1"`. An existing value must
/// parse as a signed 64-bit integer; overflow and non-integer values fail
/// with the canonical "not an integer" error. The entry's expiry is left
/// untouched in every case, success or failure.
pub async fn incr(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let incr_arguments = IncrArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;

    let entry_is_live = store_guard
        .get(&incr_arguments.key)
        .map(|value| !value.is_expired(Instant::now()))
        .unwrap_or(false);

    if !entry_is_live {
        store_guard.insert(
            incr_arguments.key,
            Value {
                data: DataType::String("1".to_string()),
                expiration: None,
            },
        );

        return Ok(CommandResult::Response(RespValue::Integer(1).encode()));
    }

    let Some(value) = store_guard.get_mut(&incr_arguments.key) else {
        return Err(CommandError::InvalidIncrCommand);
    };

    match value.data {
        DataType::String(ref mut stored) => {
            let current = stored
                .parse::<i64>()
                .map_err(|_| CommandError::InvalidIncrValue)?;
            let incremented = current
                .checked_add(1)
                .ok_or(CommandError::InvalidIncrValue)?;

            *stored = incremented.to_string();

            Ok(CommandResult::Response(
                RespValue::Integer(incremented).encode(),
            ))
        }
        DataType::Stream(_) => Err(CommandError::InvalidDataTypeForKey),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;
    use tokio::time::Instant;

    use crate::commands::command_error::CommandError;
    use crate::commands::command_handler::CommandResult;
    use crate::key_value_store::{DataType, KeyValueStore, Value};

    use super::incr;

    fn string_value(data: &str, expiration: Option<Instant>) -> Value {
        Value {
            data: DataType::String(data.to_string()),
            expiration,
        }
    }

    fn response(result: CommandResult) -> String {
        match result {
            CommandResult::Response(resp) => resp,
            other => panic!("expected a response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_incr_creates_and_increments() {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));

        let result = incr(Arc::clone(&store), vec!["counter".to_string()])
            .await
            .unwrap();
        assert_eq!(response(result), ":1\r\n");

        let result = incr(Arc::clone(&store), vec!["counter".to_string()])
            .await
            .unwrap();
        assert_eq!(response(result), ":2\r\n");
    }

    #[tokio::test]
    async fn test_incr_failure_cases() {
        let mut store = KeyValueStore::new();
        store.insert("word".to_string(), string_value("mango", None));
        store.insert(
            "max".to_string(),
            string_value(&i64::MAX.to_string(), None),
        );
        let store = Arc::new(Mutex::new(store));

        let test_cases = vec!["word", "max"];

        for key in test_cases {
            let result = incr(Arc::clone(&store), vec![key.to_string()]).await;
            assert_eq!(
                result,
                Err(CommandError::InvalidIncrValue),
                "INCR on {}",
                key
            );
        }

        // The failed increments must not have touched the stored values.
        let store_guard = store.lock().await;
        assert_eq!(
            store_guard.get("word").unwrap().data,
            DataType::String("mango".to_string())
        );
    }

    #[tokio::test]
    async fn test_incr_preserves_expiry_on_success() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let mut store = KeyValueStore::new();
        store.insert("counter".to_string(), string_value("41", Some(deadline)));
        let store = Arc::new(Mutex::new(store));

        let result = incr(Arc::clone(&store), vec!["counter".to_string()])
            .await
            .unwrap();
        assert_eq!(response(result), ":42\r\n");

        let store_guard = store.lock().await;
        assert_eq!(store_guard.get("counter").unwrap().expiration, Some(deadline));
    }

    #[tokio::test]
    async fn test_incr_treats_expired_entry_as_absent() {
        let mut store = KeyValueStore::new();
        store.insert(
            "counter".to_string(),
            string_value("99", Some(Instant::now() - Duration::from_millis(1))),
        );
        let store = Arc::new(Mutex::new(store));

        let result = incr(Arc::clone(&store), vec!["counter".to_string()])
            .await
            .unwrap();
        assert_eq!(response(result), ":1\r\n");
    }
}
