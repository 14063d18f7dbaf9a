use serde_json::{json, Value as JsonValue};

use crate::constants::TRANSACTION_EVENT_NAME;
use crate::error::BridgeError;

/// Lifecycle stage announced on the push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionEventType {
    /// A live attempt is registered; the caller may read and submit writes.
    Ready,
    /// The transaction committed.
    Complete,
    /// The transaction failed; `error` carries the translated failure.
    Error,
}

impl TransactionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionEventType::Ready => "ready",
            TransactionEventType::Complete => "complete",
            TransactionEventType::Error => "error",
        }
    }
}

/// Push notification describing transaction progress.
///
/// This channel is the only reliable way for the remote caller to learn a
/// transaction's outcome; the `begin` request itself resolves as soon as the
/// attempt loop is started. Under conflict retry the same transaction id may
/// announce `ready` more than once.
#[derive(Clone, Debug)]
pub struct TransactionEvent {
    pub event_type: TransactionEventType,
    pub transaction_id: String,
    pub app_name: String,
    pub database_id: String,
    pub error: Option<BridgeError>,
}

impl TransactionEvent {
    /// Name of the named event this payload travels under.
    pub fn name(&self) -> &'static str {
        TRANSACTION_EVENT_NAME
    }

    pub fn to_wire(&self) -> JsonValue {
        let mut body = json!({
            "type": self.event_type.as_str(),
            "txId": self.transaction_id,
            "appName": self.app_name,
            "databaseId": self.database_id,
        });
        if let Some(error) = &self.error {
            body["error"] = json!({
                "code": error.code_str(),
                "message": error.message(),
            });
        }
        body
    }
}

/// Unbounded push channel feeding the host's event emitter.
///
/// A single consumer is expected; the channel keeps its own receiver alive
/// so emitting never fails while the bridge exists.
#[derive(Clone)]
pub(crate) struct EventChannel {
    sender: async_channel::Sender<TransactionEvent>,
    receiver: async_channel::Receiver<TransactionEvent>,
}

impl EventChannel {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self { sender, receiver }
    }

    pub(crate) fn subscribe(&self) -> async_channel::Receiver<TransactionEvent> {
        self.receiver.clone()
    }

    pub(crate) fn emit(&self, event: TransactionEvent) {
        if self.sender.try_send(event).is_err() {
            log::debug!("dropping transaction event: push channel is closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::deadline_exceeded;

    #[tokio::test]
    async fn events_reach_subscribers_in_order() {
        let channel = EventChannel::new();
        let receiver = channel.subscribe();

        channel.emit(TransactionEvent {
            event_type: TransactionEventType::Ready,
            transaction_id: "tx-1".into(),
            app_name: "app".into(),
            database_id: "(default)".into(),
            error: None,
        });
        channel.emit(TransactionEvent {
            event_type: TransactionEventType::Complete,
            transaction_id: "tx-1".into(),
            app_name: "app".into(),
            database_id: "(default)".into(),
            error: None,
        });

        assert_eq!(
            receiver.recv().await.unwrap().event_type,
            TransactionEventType::Ready
        );
        assert_eq!(
            receiver.recv().await.unwrap().event_type,
            TransactionEventType::Complete
        );
    }

    #[test]
    fn error_events_serialize_code_and_message() {
        let event = TransactionEvent {
            event_type: TransactionEventType::Error,
            transaction_id: "tx-9".into(),
            app_name: "app".into(),
            database_id: "(default)".into(),
            error: Some(deadline_exceeded("no buffer arrived")),
        };
        let wire = event.to_wire();
        assert_eq!(wire["type"], "error");
        assert_eq!(wire["error"]["code"], "deadline-exceeded");
        assert_eq!(event.name(), TRANSACTION_EVENT_NAME);
    }
}
