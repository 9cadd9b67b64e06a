//! Drives one operation from `pending` to a terminal status.
//!
//! Each loop iteration checks for cancellation, then the poll budget, then
//! records a poll and asks the adapter for the operation's status. Between
//! checks the poller sleeps for the policy interval; a cancellation wakes it
//! immediately. Adapter calls already in flight are never aborted: their
//! responses are discarded when the operation was cancelled meanwhile.

use std::sync::Arc;
use std::time::Duration;

use brousla_core::operation::{ErrorInfo, OperationStatus};
use brousla_core::policy::{PollPolicy, RunningWhen};
use brousla_core::state_machine::{self, TransitionEvent};
use brousla_events::{EventBus, OperationEvent, OperationEventKind, TrackerEvent};
use chrono::Utc;

use crate::adapter::{AdapterError, OperationAdapter, RemoteStatus, StatusReport};
use crate::cell::OperationCell;

/// Whether the poll loop keeps going after handling a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
}

/// The single task responsible for one operation.
pub(crate) struct Poller {
    adapter: Arc<dyn OperationAdapter>,
    cell: Arc<OperationCell>,
    bus: Arc<EventBus>,
}

impl Poller {
    pub(crate) fn new(
        adapter: Arc<dyn OperationAdapter>,
        cell: Arc<OperationCell>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { adapter, cell, bus }
    }

    /// Run until the operation is terminal, then let the adapter release
    /// its per-operation state.
    pub(crate) async fn run(self) {
        self.drive().await;
        self.adapter.release(&self.cell.id);
        tracing::debug!(operation_id = %self.cell.id, "Poller exited");
    }

    async fn drive(&self) {
        let policy = self.cell.state.borrow().policy.clone();
        tracing::debug!(
            operation_id = %self.cell.id,
            domain = %self.adapter.domain(),
            interval_ms = policy.interval.as_millis() as u64,
            "Poller started",
        );

        if !policy.start_delay.is_zero() && !self.sleep(policy.start_delay).await {
            self.finish_cancelled().await;
            return;
        }

        loop {
            if self.cell.cancel_requested() {
                self.finish_cancelled().await;
                return;
            }

            let attempts = self.cell.state.borrow().attempts();
            if policy.is_exhausted(attempts) {
                self.on_budget_exhausted(&policy).await;
                return;
            }

            self.record_poll();
            let response = self.adapter.check(&self.cell.id).await;
            if self.cell.cancel_requested() {
                tracing::debug!(operation_id = %self.cell.id, "Discarding response after cancellation");
                continue;
            }

            if self.handle_check(response, &policy).await == Flow::Done {
                return;
            }

            if !self.sleep(policy.interval).await {
                self.finish_cancelled().await;
                return;
            }
        }
    }

    // ---- response handling ----

    async fn handle_check(
        &self,
        response: Result<StatusReport, AdapterError>,
        policy: &PollPolicy,
    ) -> Flow {
        let report = match response {
            Ok(report) => report,
            Err(e) => {
                let info = self.adapter.classify_failure(&e);
                if info.kind.is_retryable() {
                    tracing::warn!(
                        operation_id = %self.cell.id,
                        attempt = self.cell.state.borrow().attempts(),
                        error = %e,
                        "Status check failed, retrying",
                    );
                    return Flow::Continue;
                }
                self.transition(TransitionEvent::Fail(info));
                return self.settled();
            }
        };

        match report.status {
            RemoteStatus::Completed => {
                self.update_progress(report.progress, report.message);
                self.complete().await
            }
            RemoteStatus::Error => {
                let message = report
                    .message
                    .unwrap_or_else(|| format!("{} operation failed", self.adapter.domain()));
                self.transition(TransitionEvent::Fail(ErrorInfo::domain(message)));
                self.settled()
            }
            RemoteStatus::Running | RemoteStatus::Pending => {
                let promote = report.status == RemoteStatus::Running
                    || policy.running_when == RunningWhen::FirstResponse;
                if promote && self.status() == OperationStatus::Pending {
                    self.transition(TransitionEvent::Start);
                }
                self.update_progress(report.progress, report.message);
                Flow::Continue
            }
        }
    }

    /// Fetch the result exactly once and complete, or fail without retry.
    async fn complete(&self) -> Flow {
        let fetched = self.adapter.fetch_result(&self.cell.id).await;
        if self.cell.cancel_requested() {
            tracing::debug!(operation_id = %self.cell.id, "Discarding result after cancellation");
            return Flow::Continue;
        }
        match fetched {
            Ok(result) => {
                self.transition(TransitionEvent::Complete { result });
            }
            Err(e) => {
                tracing::warn!(operation_id = %self.cell.id, error = %e, "Result fetch failed");
                self.transition(TransitionEvent::Fail(self.adapter.classify_failure(&e)));
            }
        }
        self.settled()
    }

    async fn on_budget_exhausted(&self, policy: &PollPolicy) {
        let attempts = self.cell.state.borrow().attempts();
        tracing::info!(
            operation_id = %self.cell.id,
            attempts,
            final_check = policy.final_check,
            "Poll budget exhausted",
        );

        if policy.final_check {
            self.record_poll();
            let response = self.adapter.check(&self.cell.id).await;
            if !self.cell.cancel_requested() {
                match response {
                    Ok(report) if report.status == RemoteStatus::Completed => {
                        self.complete().await;
                    }
                    Ok(report) if report.status == RemoteStatus::Error => {
                        let message = report
                            .message
                            .unwrap_or_else(|| format!("{} operation failed", self.adapter.domain()));
                        self.transition(TransitionEvent::Fail(ErrorInfo::domain(message)));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(operation_id = %self.cell.id, error = %e, "Final check failed");
                    }
                }
            }
        }

        if self.cell.is_terminal() {
            return;
        }
        if self.cell.cancel_requested() {
            self.finish_cancelled().await;
            return;
        }

        let attempts = self.cell.state.borrow().attempts();
        self.transition(TransitionEvent::TimeOut(ErrorInfo::timeout(format!(
            "Timed out waiting for {} operation after {attempts} checks",
            self.adapter.domain()
        ))));
    }

    async fn finish_cancelled(&self) {
        if !self.transition(TransitionEvent::Cancel) {
            return;
        }
        if !self.cell.cancels_remotely() {
            tracing::debug!(operation_id = %self.cell.id, "Tracking stopped, remote operation left alone");
            return;
        }
        if let Err(e) = self.adapter.cancel_remote(&self.cell.id).await {
            tracing::warn!(operation_id = %self.cell.id, error = %e, "Remote cancellation failed");
        }
    }

    // ---- state helpers ----

    fn status(&self) -> OperationStatus {
        self.cell.state.borrow().status()
    }

    fn settled(&self) -> Flow {
        if self.cell.is_terminal() {
            Flow::Done
        } else {
            Flow::Continue
        }
    }

    fn record_poll(&self) {
        self.cell.state.send_modify(|op| op.record_poll(Utc::now()));
    }

    /// Apply `event` through the state machine and notify on success.
    ///
    /// Once cancellation was requested only [`TransitionEvent::Cancel`] is
    /// accepted, so a late response can never win over a cancel.
    fn transition(&self, event: TransitionEvent) -> bool {
        let cancelling = self.cell.cancel.is_cancelled();
        let mut emitted = None;
        self.cell.state.send_if_modified(|op| {
            let is_cancel = matches!(event, TransitionEvent::Cancel);
            if !is_cancel && (cancelling || op.cancel_requested()) {
                return false;
            }
            let from = op.status();
            match state_machine::apply(op, event) {
                Ok(next) => {
                    *op = next;
                    emitted = Some(OperationEvent::transition(from, op));
                    true
                }
                Err(e) => {
                    tracing::error!(operation_id = %op.id, error = %e, "Rejected transition");
                    false
                }
            }
        });

        match emitted {
            Some(event) => {
                self.log_transition(&event);
                self.notify(event);
                true
            }
            None => false,
        }
    }

    fn update_progress(&self, progress: Option<u8>, message: Option<String>) {
        let mut emitted = None;
        self.cell.state.send_if_modified(|op| {
            if op.update_progress(progress, message) {
                emitted = Some(OperationEvent::progress(op));
                true
            } else {
                false
            }
        });
        if let Some(event) = emitted {
            self.notify(event);
        }
    }

    fn notify(&self, event: OperationEvent) {
        let terminal = event.is_terminal();
        self.cell.listeners.notify(&event);
        self.bus.publish(TrackerEvent::Operation(event));
        if terminal {
            self.cell.listeners.close();
        }
    }

    fn log_transition(&self, event: &OperationEvent) {
        if let OperationEventKind::Transition { from, to, error } = &event.kind {
            tracing::info!(
                operation_id = %event.operation_id,
                domain = %event.domain,
                attempts = event.attempts,
                %from,
                %to,
                error = ?error,
                "Operation transition",
            );
        }
    }

    /// Sleep for `duration`. Returns `false` if cancelled first.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cell.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("operation_id", &self.cell.id)
            .field("domain", &self.adapter.domain())
            .finish()
    }
}
