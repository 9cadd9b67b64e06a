//! Mirror of collection-style backend state.
//!
//! Scheduled workflows are not polled one by one; instead the
//! [`Reconciler`] periodically fetches the whole [`WorkflowSnapshot`] and
//! replaces its local copy (last writer wins). A failed fetch keeps the
//! previous snapshot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brousla_core::policy::DEFAULT_WORKFLOW_INTERVAL;
use brousla_core::workflow::{WorkflowRunState, WorkflowSnapshot};
use brousla_events::{EventBus, ListenerSet, SnapshotEvent, Subscription, TrackerEvent};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterError;

/// Supplies complete backend snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn fetch_snapshot(&self) -> Result<WorkflowSnapshot, AdapterError>;
}

/// What one reconciliation cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The fetched snapshot equals the current one.
    Unchanged,
    /// The snapshot was replaced; these workflow ids changed.
    Changed(Vec<String>),
    /// The fetch failed and the previous snapshot was kept.
    Failed,
}

/// Periodic whole-snapshot reconciliation.
pub struct Reconciler {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    snapshot: RwLock<Arc<WorkflowSnapshot>>,
    listeners: ListenerSet<SnapshotEvent>,
    bus: Arc<EventBus>,
}

impl Reconciler {
    /// Create a reconciler with the default 5-second interval.
    pub fn new(source: Arc<dyn SnapshotSource>, bus: Arc<EventBus>) -> Self {
        Self {
            source,
            interval: DEFAULT_WORKFLOW_INTERVAL,
            snapshot: RwLock::new(Arc::new(WorkflowSnapshot::default())),
            listeners: ListenerSet::new(),
            bus,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run reconciliation cycles until the cancellation token is triggered.
    /// The first cycle runs immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Workflow reconciler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Workflow reconciler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.reconcile_once().await;
                }
            }
        }
    }

    /// Fetch one snapshot and apply it.
    pub async fn reconcile_once(&self) -> ReconcileOutcome {
        match self.source.fetch_snapshot().await {
            Ok(snapshot) => self.apply_snapshot(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Workflow snapshot fetch failed, keeping previous state");
                ReconcileOutcome::Failed
            }
        }
    }

    /// Replace the local snapshot with `snapshot`. Emits exactly one
    /// notification if anything changed and none otherwise.
    pub fn apply_snapshot(&self, snapshot: WorkflowSnapshot) -> ReconcileOutcome {
        let (changed, count) = {
            let mut current = self.snapshot.write();
            let changed = current.changed_ids(&snapshot);
            if changed.is_empty() {
                return ReconcileOutcome::Unchanged;
            }
            let count = snapshot.len();
            *current = Arc::new(snapshot);
            (changed, count)
        };

        let event = SnapshotEvent::new(changed.clone(), count);
        tracing::debug!(changed = ?changed, "Workflow snapshot replaced");
        self.listeners.notify(&event);
        self.bus.publish(TrackerEvent::Workflows(event));
        ReconcileOutcome::Changed(changed)
    }

    /// The current snapshot.
    pub fn states(&self) -> Arc<WorkflowSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn get(&self, workflow_id: &str) -> Option<WorkflowRunState> {
        self.snapshot.read().get(workflow_id).cloned()
    }

    pub fn is_running(&self, workflow_id: &str) -> bool {
        self.snapshot
            .read()
            .get(workflow_id)
            .is_some_and(|s| s.is_running)
    }

    /// One event per applied change.
    pub fn subscribe(&self) -> Subscription<SnapshotEvent> {
        self.listeners.subscribe()
    }
}
