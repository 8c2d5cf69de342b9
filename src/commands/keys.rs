use std::sync::Arc;

use globset::Glob;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

pub struct KeysArguments {
    pattern: String,
}

impl KeysArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidKeysCommand);
        }

        Ok(KeysArguments {
            pattern: arguments[0].clone(),
        })
    }
}

/// Handles the KEYS command.
///
/// Returns every live string key matching the glob pattern, in map order
/// (unspecified). Stream keys and expired entries are not listed.
pub async fn keys(
    store: Arc<Mutex<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let keys_arguments = KeysArguments::parse(arguments)?;

    let matcher = Glob::new(&keys_arguments.pattern)
        .map_err(|e| CommandError::InvalidGlobPattern(e.to_string()))?
        .compile_matcher();

    let now = Instant::now();
    let store_guard = store.lock().await;

    let mut matching = Vec::new();

    for (key, value) in store_guard.iter() {
        if !matches!(value.data, DataType::String(_)) || value.is_expired(now) {
            continue;
        }

        if matcher.is_match(key) {
            matching.push(RespValue::BulkString(key.clone()));
        }
    }

    Ok(CommandResult::Response(RespValue::Array(matching).encode()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;
    use tokio::time::Instant;

    use crate::commands::command_handler::CommandResult;
    use crate::key_value_store::{DataType, KeyValueStore, Stream, Value};

    use super::keys;

    fn string_value(expiration: Option<Instant>) -> Value {
        Value {
            data: DataType::String("v".to_string()),
            expiration,
        }
    }

    async fn matching_keys(store: Arc<Mutex<KeyValueStore>>, pattern: &str) -> Vec<String> {
        let result = keys(store, vec![pattern.to_string()]).await.unwrap();

        let CommandResult::Response(resp) = result else {
            panic!("expected a response");
        };

        let mut found: Vec<String> = resp
            .split("\r\n")
            .filter(|line| !line.is_empty() && !line.starts_with('*') && !line.starts_with('$'))
            .map(|line| line.to_string())
            .collect();
        found.sort();
        found
    }

    #[tokio::test]
    async fn test_keys_lists_live_string_keys() {
        let mut store = KeyValueStore::new();
        store.insert("apple".to_string(), string_value(None));
        store.insert("apricot".to_string(), string_value(None));
        store.insert(
            "stale".to_string(),
            string_value(Some(Instant::now() - Duration::from_millis(1))),
        );
        store.insert(
            "events".to_string(),
            Value {
                data: DataType::Stream(Stream::new()),
                expiration: None,
            },
        );
        let store = Arc::new(Mutex::new(store));

        assert_eq!(
            matching_keys(Arc::clone(&store), "*").await,
            vec!["apple".to_string(), "apricot".to_string()]
        );
        assert_eq!(
            matching_keys(Arc::clone(&store), "ap*").await,
            vec!["apple".to_string(), "apricot".to_string()]
        );
        assert_eq!(
            matching_keys(store, "apple").await,
            vec!["apple".to_string()]
        );
    }

    #[tokio::test]
    async fn test_keys_requires_exactly_one_pattern() {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        assert!(keys(store, Vec::new()).await.is_err());
    }
}
