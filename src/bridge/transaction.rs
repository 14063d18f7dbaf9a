use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{self, Either, FutureExt};

use crate::bridge::buffer::CommandBufferChannel;
use crate::bridge::events::{EventChannel, TransactionEvent, TransactionEventType};
use crate::error::{deadline_exceeded, failed_precondition, internal_error, BridgeResult};
use crate::model::DocumentKey;
use crate::runtime;
use crate::store::client::{run_transaction, StoreClient};
use crate::store::datastore::TransactionAttempt;
use crate::store::snapshot::DocumentSnapshot;
use crate::wire::write::command_to_write;
use crate::wire::WriteCommand;

/// Drives remote-controlled transactions.
///
/// One engine attempt proceeds as: register the live handle for the
/// transaction id, announce `ready`, park on the command-buffer rendezvous,
/// then replay the delivered commands into the attempt and let the engine
/// commit. If the engine retries a contended attempt the whole sequence runs
/// again, which is why the rendezvous is re-armed per attempt and the remote
/// caller must tolerate repeated `ready` events.
pub(crate) struct TransactionCoordinator {
    live: Mutex<HashMap<String, Arc<dyn TransactionAttempt>>>,
    active: Mutex<HashSet<String>>,
    buffers: CommandBufferChannel,
    events: EventChannel,
    command_deadline: Option<Duration>,
}

impl TransactionCoordinator {
    pub(crate) fn new(events: EventChannel, command_deadline: Option<Duration>) -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
            buffers: CommandBufferChannel::new(),
            events,
            command_deadline,
        }
    }

    fn live_guard(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn TransactionAttempt>>> {
        self.live.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn active_guard(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Starts the attempt loop for `transaction_id`, detached.
    ///
    /// Resolves as soon as the loop is running: the caller drives the
    /// transaction through the command stream, and the outcome, including
    /// failure, is reported only on the push channel.
    pub(crate) fn begin(
        self: &Arc<Self>,
        client: StoreClient,
        transaction_id: String,
    ) -> BridgeResult<()> {
        if !self.active_guard().insert(transaction_id.clone()) {
            return Err(failed_precondition(format!(
                "Transaction '{transaction_id}' is already running"
            )));
        }

        let coordinator = Arc::clone(self);
        runtime::spawn_detached(async move {
            coordinator.run(client, transaction_id).await;
        });
        Ok(())
    }

    async fn run(self: Arc<Self>, client: StoreClient, transaction_id: String) {
        let app_name = client.app_name().to_string();
        let database_id = client.database_id().to_string();

        let coordinator = Arc::clone(&self);
        let body_id = transaction_id.clone();
        let body_app = app_name.clone();
        let body_db = database_id.clone();
        let result = run_transaction(&client, move |attempt| {
            let coordinator = Arc::clone(&coordinator);
            let transaction_id = body_id.clone();
            let app_name = body_app.clone();
            let database_id = body_db.clone();
            async move {
                coordinator
                    .drive_attempt(attempt, &transaction_id, &app_name, &database_id)
                    .await
            }
            .boxed()
        })
        .await;

        self.live_guard().remove(&transaction_id);
        self.buffers.release(&transaction_id);
        self.active_guard().remove(&transaction_id);

        let event = match result {
            Ok(()) => TransactionEvent {
                event_type: TransactionEventType::Complete,
                transaction_id,
                app_name,
                database_id,
                error: None,
            },
            Err(error) => {
                log::debug!("transaction '{transaction_id}' failed: {error}");
                TransactionEvent {
                    event_type: TransactionEventType::Error,
                    transaction_id,
                    app_name,
                    database_id,
                    error: Some(error),
                }
            }
        };
        self.events.emit(event);
    }

    /// One pass of the engine callback: register, announce, rendezvous,
    /// apply.
    async fn drive_attempt(
        &self,
        attempt: Arc<dyn TransactionAttempt>,
        transaction_id: &str,
        app_name: &str,
        database_id: &str,
    ) -> BridgeResult<()> {
        self.live_guard()
            .insert(transaction_id.to_string(), Arc::clone(&attempt));
        self.events.emit(TransactionEvent {
            event_type: TransactionEventType::Ready,
            transaction_id: transaction_id.to_string(),
            app_name: app_name.to_string(),
            database_id: database_id.to_string(),
            error: None,
        });

        let commands = self.wait_for_commands(transaction_id).await?;
        for command in &commands {
            attempt.stage(command_to_write(command)?)?;
        }
        Ok(())
    }

    async fn wait_for_commands(&self, transaction_id: &str) -> BridgeResult<Vec<WriteCommand>> {
        let wait = self.buffers.await_buffer(transaction_id);
        let Some(deadline) = self.command_deadline else {
            return wait.await;
        };

        match future::select(Box::pin(wait), Box::pin(runtime::sleep(deadline))).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => {
                self.dispose(transaction_id);
                Err(deadline_exceeded(format!(
                    "No command buffer arrived for transaction '{transaction_id}' within {}ms",
                    deadline.as_millis()
                )))
            }
        }
    }

    /// Reads through the live handle for the id.
    ///
    /// Fails before any engine access when no handle is registered: the
    /// transaction was never begun, already finished, or was disposed.
    pub(crate) async fn get_document(
        &self,
        transaction_id: &str,
        path: &str,
    ) -> BridgeResult<DocumentSnapshot> {
        let attempt = self.live_guard().get(transaction_id).cloned().ok_or_else(|| {
            internal_error(format!(
                "No transaction handle registered for id '{transaction_id}'"
            ))
        })?;
        let key = DocumentKey::from_string(path)?;
        attempt.get_document(&key).await
    }

    /// Forwards a command buffer iff a live handle is registered; a buffer
    /// arriving after disposal or completion is dropped silently.
    pub(crate) fn apply_buffer(
        &self,
        transaction_id: &str,
        commands: Vec<WriteCommand>,
    ) -> BridgeResult<()> {
        if !self.live_guard().contains_key(transaction_id) {
            log::debug!(
                "ignoring command buffer for unknown transaction '{transaction_id}'"
            );
            return Ok(());
        }
        self.buffers.attach(transaction_id, commands)
    }

    /// Stops tracking the id. An attempt already past the rendezvous cannot
    /// be recalled and may still commit; a parked attempt is woken with an
    /// aborted error.
    pub(crate) fn dispose(&self, transaction_id: &str) {
        self.live_guard().remove(transaction_id);
        self.buffers.release(transaction_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::ClientSettings;
    use crate::store::memory::MemoryDatastore;
    use serde_json::json;

    fn coordinator() -> Arc<TransactionCoordinator> {
        Arc::new(TransactionCoordinator::new(EventChannel::new(), None))
    }

    fn memory_client() -> StoreClient {
        StoreClient::new(
            "app",
            "(default)",
            ClientSettings::default(),
            Arc::new(MemoryDatastore::new()),
        )
    }

    fn sample_commands() -> Vec<WriteCommand> {
        crate::wire::write::decode_commands(&json!([
            { "type": "SET", "path": "c/1", "data": { "x": { "integerValue": "1" } } }
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn get_document_without_live_handle_fails_internal() {
        let coordinator = coordinator();
        let err = coordinator.get_document("missing", "c/1").await.unwrap_err();
        assert_eq!(err.code_str(), "internal-error");
    }

    #[tokio::test]
    async fn apply_buffer_without_live_handle_is_a_silent_no_op() {
        let coordinator = coordinator();
        coordinator.apply_buffer("missing", sample_commands()).unwrap();
        // Nothing was stored: a later attach for the id must not see a
        // pending buffer.
        coordinator.buffers.attach("missing", sample_commands()).unwrap();
    }

    #[tokio::test]
    async fn begin_rejects_duplicate_transaction_ids() {
        let coordinator = coordinator();
        let client = memory_client();
        coordinator.begin(client.clone(), "tx-1".to_string()).unwrap();
        let err = coordinator.begin(client, "tx-1".to_string()).unwrap_err();
        assert_eq!(err.code_str(), "failed-precondition");
    }
}
