//! Scheduled workflow activation.
//!
//! An activation is tracked from `POST /workflows/{id}/activate` until the
//! workflow is deactivated again. While active the workflow alternates
//! between idle (`pending`) and executing (`running`); once the backend
//! reports it inactive the activation session has ended.

use std::collections::HashMap;

use async_trait::async_trait;
use brousla_client::messages::WorkflowActionResponse;
use brousla_client::WorkflowServerApi;
use brousla_core::operation::{Domain, OperationId};
use brousla_core::policy::PolicyKind;
use brousla_core::workflow::{ExecutionPhase, WorkflowRunState, WorkflowSnapshot};
use brousla_tracker::{
    AdapterError, Launched, Launcher, OperationAdapter, SnapshotSource, StatusReport,
};
use parking_lot::Mutex;

use crate::convert::client_error;

/// Adapter for `/workflows/*`.
pub struct WorkflowActivationAdapter {
    api: WorkflowServerApi,
    /// Last state seen per workflow, returned as the run summary.
    last_seen: Mutex<HashMap<OperationId, WorkflowRunState>>,
}

impl WorkflowActivationAdapter {
    pub fn new(api: WorkflowServerApi) -> Self {
        Self {
            api,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a run state is still cached for `workflow_id`.
    pub fn has_cached_state(&self, workflow_id: &str) -> bool {
        self.last_seen.lock().contains_key(&OperationId::new(workflow_id))
    }

    /// Interpret one workflow state.
    pub fn report_for(state: &WorkflowRunState) -> StatusReport {
        if state.is_running {
            let report = StatusReport::running().with_progress(state.execution_progress);
            return match state.execution_phase {
                Some(ExecutionPhase::GeneratingPrompts) => report.with_message("Generating prompts"),
                Some(ExecutionPhase::ExecutingComfyui) => report.with_message("Executing in ComfyUI"),
                None => report,
            };
        }
        if state.is_active {
            return StatusReport::pending();
        }
        if state.cancelled {
            return StatusReport::error("Workflow execution was cancelled");
        }
        StatusReport::completed()
    }

    fn action_result(response: WorkflowActionResponse, action: &str) -> Result<(), AdapterError> {
        if response.success {
            return Ok(());
        }
        let message = response
            .error
            .or(response.message)
            .unwrap_or_else(|| format!("Failed to {action} workflow"));
        if response.subscription_error {
            Err(AdapterError::Rejected(format!("{message} (subscription limit)")))
        } else {
            Err(AdapterError::Rejected(message))
        }
    }
}

#[async_trait]
impl OperationAdapter for WorkflowActivationAdapter {
    fn domain(&self) -> Domain {
        Domain::Workflow
    }

    async fn check(&self, id: &OperationId) -> Result<StatusReport, AdapterError> {
        let response = self
            .api
            .workflow_status(id.as_str())
            .await
            .map_err(client_error)?;
        if !response.success {
            return Err(AdapterError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "Failed to get workflow status".to_string()),
            ));
        }
        let mut state = response
            .state
            .ok_or_else(|| AdapterError::NotFound(format!("Workflow {id} has no state")))?;
        state.workflow_id = id.to_string();

        let report = Self::report_for(&state);
        self.last_seen.lock().insert(id.clone(), state);
        Ok(report)
    }

    async fn fetch_result(&self, id: &OperationId) -> Result<serde_json::Value, AdapterError> {
        let state = self.last_seen.lock().remove(id);
        let state = match state {
            Some(state) => state,
            None => {
                let response = self
                    .api
                    .workflow_status(id.as_str())
                    .await
                    .map_err(client_error)?;
                response
                    .state
                    .ok_or_else(|| AdapterError::NotFound(format!("Workflow {id} has no state")))?
            }
        };
        serde_json::to_value(&state).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }

    /// Stop a running execution, then deactivate.
    async fn cancel_remote(&self, id: &OperationId) -> Result<(), AdapterError> {
        let running = self
            .last_seen
            .lock()
            .get(id)
            .is_some_and(|state| state.is_running);
        if running {
            let response = self
                .api
                .cancel_workflow(id.as_str())
                .await
                .map_err(client_error)?;
            Self::action_result(response, "cancel")?;
        }
        let response = self
            .api
            .deactivate_workflow(id.as_str())
            .await
            .map_err(client_error)?;
        Self::action_result(response, "deactivate")
    }

    fn release(&self, id: &OperationId) {
        self.last_seen.lock().remove(id);
    }
}

#[async_trait]
impl Launcher for WorkflowActivationAdapter {
    /// Workflow id.
    type Params = String;

    fn natural_key(&self, workflow_id: &String) -> String {
        format!("workflow:{workflow_id}")
    }

    async fn launch(&self, workflow_id: &String) -> Result<Launched, AdapterError> {
        let response = self
            .api
            .activate_workflow(workflow_id)
            .await
            .map_err(client_error)?;
        Self::action_result(response, "activate")?;
        tracing::info!(workflow_id = %workflow_id, "Workflow activated");
        Ok(Launched::new(workflow_id.as_str(), PolicyKind::WorkflowActivation))
    }
}

#[async_trait]
impl SnapshotSource for WorkflowActivationAdapter {
    async fn fetch_snapshot(&self) -> Result<WorkflowSnapshot, AdapterError> {
        let response = self.api.workflow_states().await.map_err(client_error)?;
        if !response.success {
            return Err(AdapterError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "Failed to get workflow states".to_string()),
            ));
        }
        Ok(WorkflowSnapshot::from_states(response.states))
    }
}
