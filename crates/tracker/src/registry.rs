//! Owner of every tracked operation.
//!
//! [`OperationRegistry`] enforces single flight per natural key, creates
//! each operation in `pending`, spawns its poller task and hands back an
//! [`OperationHandle`]. Entries stay in the registry after they terminate
//! until [`prune`](OperationRegistry::prune) or
//! [`dispose`](OperationRegistry::dispose) removes them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use brousla_core::operation::{Operation, OperationId};
use brousla_core::policy::PolicyTable;
use brousla_events::{EventBus, OperationEvent, Subscription, SubscriptionId};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::adapter::{Launcher, OperationAdapter, TrackRequest};
use crate::cell::{CancelOrigin, OperationCell};
use crate::error::TrackerError;
use crate::handle::OperationHandle;
use crate::poller::Poller;

/// How long [`OperationRegistry::shutdown`] waits for the pollers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Internal bookkeeping for one operation.
struct Entry {
    cell: Arc<OperationCell>,
    task_handle: tokio::task::JoinHandle<()>,
}

/// Registry of tracked operations.
///
/// Shared as `Arc<OperationRegistry>`.
pub struct OperationRegistry {
    policies: PolicyTable,
    bus: Arc<EventBus>,
    entries: RwLock<HashMap<OperationId, Entry>>,
    /// Natural keys whose launch call is still in flight.
    launching: Mutex<HashSet<String>>,
    /// Master cancellation token; each operation gets a child.
    cancel: CancellationToken,
}

impl OperationRegistry {
    pub fn new(policies: PolicyTable, bus: Arc<EventBus>) -> Self {
        Self {
            policies,
            bus,
            entries: RwLock::new(HashMap::new()),
            launching: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Launch a new remote operation and start polling it.
    ///
    /// Fails with [`TrackerError::DuplicateOperation`] while another
    /// operation with the same natural key is launching or in flight, and
    /// with [`TrackerError::Launch`] when the adapter's launch call fails.
    pub async fn start<L: Launcher>(
        &self,
        adapter: Arc<L>,
        params: L::Params,
    ) -> Result<OperationHandle, TrackerError> {
        let key = adapter.natural_key(&params);
        let _guard = {
            let entries = self.entries.read().await;
            let mut launching = self.launching.lock();
            if launching.contains(&key) || key_in_flight(&entries, &key) {
                tracing::info!(key = %key, "Rejected duplicate operation");
                return Err(TrackerError::DuplicateOperation { key });
            }
            launching.insert(key.clone());
            LaunchGuard {
                launching: &self.launching,
                key: key.clone(),
            }
        };

        let launched = match adapter.launch(&params).await {
            Ok(launched) => launched,
            Err(e) => {
                let info = adapter.classify_failure(&e);
                tracing::warn!(
                    domain = %adapter.domain(),
                    key = %key,
                    error = %e,
                    "Operation launch failed",
                );
                return Err(TrackerError::Launch(info));
            }
        };

        let request = TrackRequest {
            id: launched.id,
            policy: launched.policy,
            natural_key: Some(key),
        };
        let mut entries = self.entries.write().await;
        if entries.get(&request.id).is_some_and(|e| !e.cell.is_terminal()) {
            return Err(TrackerError::DuplicateOperation {
                key: request.id.to_string(),
            });
        }
        Ok(self.insert(&mut entries, adapter, request, launched.detail))
    }

    /// Start tracking an operation whose id was obtained elsewhere.
    pub async fn track(
        &self,
        adapter: Arc<dyn OperationAdapter>,
        request: TrackRequest,
    ) -> Result<OperationHandle, TrackerError> {
        let mut entries = self.entries.write().await;
        let id_in_flight = entries
            .get(&request.id)
            .is_some_and(|e| !e.cell.is_terminal());
        let key_taken = request.natural_key.as_deref().is_some_and(|key| {
            key_in_flight(&entries, key) || self.launching.lock().contains(key)
        });
        if id_in_flight || key_taken {
            let key = request
                .natural_key
                .clone()
                .unwrap_or_else(|| request.id.to_string());
            tracing::info!(operation_id = %request.id, key = %key, "Rejected duplicate operation");
            return Err(TrackerError::DuplicateOperation { key });
        }
        Ok(self.insert(&mut entries, adapter, request, None))
    }

    /// Request cancellation, locally and on the backend. A no-op for
    /// terminal or unknown operations.
    pub async fn cancel(&self, id: &OperationId) -> bool {
        let entries = self.entries.read().await;
        match entries.get(id) {
            Some(entry) => {
                let raised = entry.cell.request_cancel(CancelOrigin::User);
                if raised {
                    tracing::info!(operation_id = %id, "Cancellation requested");
                }
                raised
            }
            None => false,
        }
    }

    /// Snapshot of one operation.
    pub async fn get(&self, id: &OperationId) -> Option<Operation> {
        self.entries.read().await.get(id).map(|e| e.cell.snapshot())
    }

    /// Snapshots of every tracked operation.
    pub async fn list(&self) -> Vec<Operation> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.cell.snapshot())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Subscribe to one operation's events. `None` for unknown ids.
    pub async fn subscribe(&self, id: &OperationId) -> Option<Subscription<OperationEvent>> {
        self.entries
            .read()
            .await
            .get(id)
            .map(|e| e.cell.listeners.subscribe())
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub async fn unsubscribe(&self, id: &OperationId, subscription: SubscriptionId) -> bool {
        self.entries
            .read()
            .await
            .get(id)
            .is_some_and(|e| e.cell.listeners.unsubscribe(subscription))
    }

    /// Stop tracking the operation and forget it. The poller finishes the
    /// local cancellation in the background; the backend is not told.
    pub async fn dispose(&self, id: &OperationId) -> Option<Operation> {
        let entry = self.entries.write().await.remove(id)?;
        entry.cell.request_cancel(CancelOrigin::Teardown);
        tracing::debug!(operation_id = %id, "Operation disposed");
        Some(entry.cell.snapshot())
    }

    /// Remove every terminal operation, returning their final snapshots.
    pub async fn prune(&self) -> Vec<Operation> {
        let mut entries = self.entries.write().await;
        let terminal: Vec<OperationId> = entries
            .iter()
            .filter(|(_, e)| e.cell.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        terminal
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .map(|e| e.cell.snapshot())
            .collect()
    }

    /// Stop tracking every operation and wait for the pollers to exit.
    ///
    /// Remote operations keep running; only local tracking ends. Pollers
    /// still busy after 5 seconds in total are aborted.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down operation registry");
        let drained: Vec<(OperationId, Entry)> = self.entries.write().await.drain().collect();
        for (_, entry) in &drained {
            entry.cell.request_cancel(CancelOrigin::Teardown);
        }
        self.cancel.cancel();

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        for (id, mut entry) in drained {
            if tokio::time::timeout_at(deadline, &mut entry.task_handle).await.is_err() {
                tracing::warn!(operation_id = %id, "Poller did not exit in time, aborting");
                entry.task_handle.abort();
            }
        }
        tracing::info!("Operation registry shut down complete");
    }

    // ---- private helpers ----

    fn insert(
        &self,
        entries: &mut HashMap<OperationId, Entry>,
        adapter: Arc<dyn OperationAdapter>,
        request: TrackRequest,
        detail: Option<serde_json::Value>,
    ) -> OperationHandle {
        let policy = self.policies.get(request.policy);
        let operation = Operation::new(
            request.id.clone(),
            adapter.domain(),
            policy,
            request.natural_key,
            Utc::now(),
        );
        let cell = Arc::new(OperationCell::new(operation, self.cancel.child_token()));
        let subscription = cell.listeners.subscribe();

        tracing::info!(
            operation_id = %request.id,
            domain = %adapter.domain(),
            policy = ?request.policy,
            "Tracking operation",
        );
        let poller = Poller::new(adapter, Arc::clone(&cell), Arc::clone(&self.bus));
        let task_handle = tokio::spawn(poller.run());

        entries.insert(
            request.id,
            Entry {
                cell: Arc::clone(&cell),
                task_handle,
            },
        );
        OperationHandle::new(cell, detail, subscription)
    }
}

fn key_in_flight(entries: &HashMap<OperationId, Entry>, key: &str) -> bool {
    entries
        .values()
        .any(|e| !e.cell.is_terminal() && e.cell.natural_key().as_deref() == Some(key))
}

/// Releases a natural key from the launching set, including when the
/// `start` future is dropped mid-launch.
struct LaunchGuard<'a> {
    launching: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for LaunchGuard<'_> {
    fn drop(&mut self) {
        self.launching.lock().remove(&self.key);
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}
