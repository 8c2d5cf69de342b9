//! Shared server state for waking blocked stream readers.
//!
//! A blocked `XREAD` registers one subscriber per watched key. `XADD` pokes
//! every subscriber of the key it appended to with a non-blocking send; a
//! dropped signal is harmless because woken readers re-scan the stream under
//! the store lock before replying.

use std::collections::HashMap;

use tokio::sync::mpsc;

#[derive(Debug)]
pub struct StreamSubscriber {
    pub client_address: String,
    pub sender: mpsc::Sender<()>,
}

#[derive(Debug, Default)]
pub struct State {
    stream_subscribers: HashMap<String, Vec<StreamSubscriber>>,
}

impl State {
    pub fn new() -> Self {
        State {
            stream_subscribers: HashMap::new(),
        }
    }

    pub fn add_stream_subscriber(&mut self, key: String, subscriber: StreamSubscriber) {
        self.stream_subscribers
            .entry(key)
            .or_default()
            .push(subscriber);
    }

    pub fn remove_stream_subscriber(&mut self, key: &str, client_address: &str) {
        if let Some(subscribers) = self.stream_subscribers.get_mut(key) {
            subscribers.retain(|subscriber| subscriber.client_address != client_address);

            if subscribers.is_empty() {
                self.stream_subscribers.remove(key);
            }
        }
    }

    /// Wakes every reader blocked on `key`. Signals to a full channel are
    /// dropped; the reader re-scans anyway.
    pub fn notify_stream_subscribers(&self, key: &str) {
        if let Some(subscribers) = self.stream_subscribers.get(key) {
            for subscriber in subscribers {
                let _ = subscriber.sender.try_send(());
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, key: &str) -> usize {
        self.stream_subscribers
            .get(key)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::{State, StreamSubscriber};

    fn subscriber(client_address: &str) -> (StreamSubscriber, mpsc::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(1);

        (
            StreamSubscriber {
                client_address: client_address.to_string(),
                sender,
            },
            receiver,
        )
    }

    #[test]
    fn test_add_and_remove_stream_subscribers() {
        let mut state = State::new();

        let (first, _first_rx) = subscriber("127.0.0.1:50000");
        let (second, _second_rx) = subscriber("127.0.0.1:50001");

        state.add_stream_subscriber("fruits".to_string(), first);
        state.add_stream_subscriber("fruits".to_string(), second);
        assert_eq!(state.subscriber_count("fruits"), 2);

        state.remove_stream_subscriber("fruits", "127.0.0.1:50000");
        assert_eq!(state.subscriber_count("fruits"), 1);

        state.remove_stream_subscriber("fruits", "127.0.0.1:50001");
        assert_eq!(state.subscriber_count("fruits"), 0);
    }

    #[tokio::test]
    async fn test_notify_wakes_subscribers_of_that_key_only() {
        let mut state = State::new();

        let (fruits_subscriber, mut fruits_rx) = subscriber("127.0.0.1:50000");
        let (sensor_subscriber, mut sensor_rx) = subscriber("127.0.0.1:50001");

        state.add_stream_subscriber("fruits".to_string(), fruits_subscriber);
        state.add_stream_subscriber("sensor".to_string(), sensor_subscriber);

        state.notify_stream_subscribers("fruits");

        assert_eq!(fruits_rx.try_recv(), Ok(()));
        assert!(sensor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_tolerates_full_channels() {
        let mut state = State::new();

        let (stream_subscriber, _rx) = subscriber("127.0.0.1:50000");
        state.add_stream_subscriber("fruits".to_string(), stream_subscriber);

        // Depth-one channel: the second and third signals are dropped.
        state.notify_stream_subscribers("fruits");
        state.notify_stream_subscribers("fruits");
        state.notify_stream_subscribers("fruits");
    }
}
