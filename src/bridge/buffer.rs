use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{aborted, failed_precondition, BridgeResult};
use crate::wire::WriteCommand;

/// Per-transaction rendezvous between the remote caller's command buffer and
/// the in-flight transaction attempt.
///
/// The attempt parks on [`CommandBufferChannel::await_buffer`] without
/// polling; attaching a buffer wakes it. Each slot holds at most one
/// undelivered buffer, and delivery consumes it, so a retried attempt parks
/// again until the caller resubmits for the new attempt.
pub(crate) struct CommandBufferChannel {
    slots: Mutex<HashMap<String, BufferSlot>>,
}

struct BufferSlot {
    sender: async_channel::Sender<Vec<WriteCommand>>,
    receiver: async_channel::Receiver<Vec<WriteCommand>>,
}

impl BufferSlot {
    fn new() -> Self {
        let (sender, receiver) = async_channel::bounded(1);
        Self { sender, receiver }
    }
}

impl CommandBufferChannel {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots_guard(&self) -> MutexGuard<'_, HashMap<String, BufferSlot>> {
        self.slots.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn sender_for(&self, transaction_id: &str) -> async_channel::Sender<Vec<WriteCommand>> {
        let mut slots = self.slots_guard();
        slots
            .entry(transaction_id.to_string())
            .or_insert_with(BufferSlot::new)
            .sender
            .clone()
    }

    fn receiver_for(&self, transaction_id: &str) -> async_channel::Receiver<Vec<WriteCommand>> {
        let mut slots = self.slots_guard();
        slots
            .entry(transaction_id.to_string())
            .or_insert_with(BufferSlot::new)
            .receiver
            .clone()
    }

    /// Stores a command buffer for the id, waking a parked attempt.
    pub(crate) fn attach(
        &self,
        transaction_id: &str,
        commands: Vec<WriteCommand>,
    ) -> BridgeResult<()> {
        let sender = self.sender_for(transaction_id);
        match sender.try_send(commands) {
            Ok(()) => Ok(()),
            Err(async_channel::TrySendError::Full(_)) => Err(failed_precondition(format!(
                "A command buffer is already pending for transaction '{transaction_id}'"
            ))),
            Err(async_channel::TrySendError::Closed(_)) => Err(aborted(format!(
                "Transaction '{transaction_id}' was disposed before the buffer arrived"
            ))),
        }
    }

    /// Suspends until a buffer is attached for the id, then consumes it.
    pub(crate) async fn await_buffer(
        &self,
        transaction_id: &str,
    ) -> BridgeResult<Vec<WriteCommand>> {
        let receiver = self.receiver_for(transaction_id);
        receiver.recv().await.map_err(|_| {
            aborted(format!(
                "Transaction '{transaction_id}' was disposed while awaiting its command buffer"
            ))
        })
    }

    /// Drops the slot for the id, waking any parked waiter with an error.
    /// Safe to call when nothing was ever attached.
    pub(crate) fn release(&self, transaction_id: &str) {
        if let Some(slot) = self.slots_guard().remove(transaction_id) {
            slot.sender.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn sample_commands() -> Vec<WriteCommand> {
        crate::wire::write::decode_commands(&json!([
            { "type": "DELETE", "path": "users/ada" }
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn attach_then_await_delivers_once() {
        let channel = CommandBufferChannel::new();
        channel.attach("tx-1", sample_commands()).unwrap();
        let commands = channel.await_buffer("tx-1").await.unwrap();
        assert_eq!(commands.len(), 1);
    }

    #[tokio::test]
    async fn await_parks_until_attach() {
        let channel = Arc::new(CommandBufferChannel::new());
        let waiter = Arc::clone(&channel);
        let handle =
            tokio::spawn(async move { waiter.await_buffer("tx-2").await.map(|c| c.len()) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.attach("tx-2", sample_commands()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn second_attach_before_consumption_fails() {
        let channel = CommandBufferChannel::new();
        channel.attach("tx-3", sample_commands()).unwrap();
        let err = channel.attach("tx-3", sample_commands()).unwrap_err();
        assert_eq!(err.code_str(), "failed-precondition");

        // The original buffer is still deliverable.
        assert!(channel.await_buffer("tx-3").await.is_ok());
    }

    #[tokio::test]
    async fn release_wakes_parked_waiter_with_aborted() {
        let channel = Arc::new(CommandBufferChannel::new());
        let waiter = Arc::clone(&channel);
        let handle = tokio::spawn(async move { waiter.await_buffer("tx-4").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.release("tx-4");
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code_str(), "aborted");
    }

    #[tokio::test]
    async fn release_without_attach_is_safe() {
        let channel = CommandBufferChannel::new();
        channel.release("tx-5");
        // A new rendezvous can be set up for the same id afterwards.
        channel.attach("tx-5", sample_commands()).unwrap();
        assert!(channel.await_buffer("tx-5").await.is_ok());
    }

    #[tokio::test]
    async fn consumption_rearms_the_slot() {
        let channel = CommandBufferChannel::new();
        channel.attach("tx-6", sample_commands()).unwrap();
        channel.await_buffer("tx-6").await.unwrap();

        // A fresh attach for the same id is accepted after delivery.
        channel.attach("tx-6", sample_commands()).unwrap();
        assert!(channel.await_buffer("tx-6").await.is_ok());
    }
}
