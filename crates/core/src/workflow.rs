//! Workflow run state as reported by the workflow server.
//!
//! The backend owns these states; the client only ever replaces its whole
//! [`WorkflowSnapshot`] with a newer one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Current phase of a running scheduled workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    GeneratingPrompts,
    ExecutingComfyui,
}

/// Activation / execution state of one scheduled workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowRunState {
    /// Filled in from the snapshot key; the backend does not repeat it.
    pub workflow_id: String,
    pub is_active: bool,
    pub is_running: bool,
    pub execution_phase: Option<ExecutionPhase>,
    pub execution_progress: Option<u8>,
    pub execution_count: u32,
    pub last_execution_time: Option<String>,
    pub next_execution_time: Option<String>,
    pub last_prompt_id: Option<String>,
    /// Set by the backend when the last run was cancelled.
    pub cancelled: bool,
}

/// Every workflow's state at one point in time, keyed by workflow id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowSnapshot {
    states: BTreeMap<String, WorkflowRunState>,
}

impl WorkflowSnapshot {
    /// Build a snapshot from the backend's `states` map, stamping each entry
    /// with its key.
    pub fn from_states(states: BTreeMap<String, WorkflowRunState>) -> Self {
        let states = states
            .into_iter()
            .map(|(id, mut state)| {
                state.workflow_id = id.clone();
                (id, state)
            })
            .collect();
        Self { states }
    }

    pub fn get(&self, workflow_id: &str) -> Option<&WorkflowRunState> {
        self.states.get(workflow_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowRunState> {
        self.states.values()
    }

    /// Workflows currently executing.
    pub fn running(&self) -> impl Iterator<Item = &WorkflowRunState> {
        self.states.values().filter(|s| s.is_running)
    }

    /// Ids whose state differs between `self` and `newer` (added, removed or
    /// changed), in id order.
    pub fn changed_ids(&self, newer: &WorkflowSnapshot) -> Vec<String> {
        let mut changed: Vec<String> = newer
            .states
            .iter()
            .filter(|(id, state)| self.states.get(*id) != Some(*state))
            .map(|(id, _)| id.clone())
            .collect();
        changed.extend(
            self.states
                .keys()
                .filter(|id| !newer.states.contains_key(*id))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(json: serde_json::Value) -> WorkflowSnapshot {
        let states: BTreeMap<String, WorkflowRunState> = serde_json::from_value(json).unwrap();
        WorkflowSnapshot::from_states(states)
    }

    #[test]
    fn parses_backend_state_with_missing_fields() {
        let snap = snapshot(serde_json::json!({
            "wf-1": {"isActive": true, "isRunning": true, "executionPhase": "executing_comfyui",
                     "executionProgress": 40, "executionCount": 3, "extra": "ignored"},
            "wf-2": {"isActive": false}
        }));
        let wf1 = snap.get("wf-1").unwrap();
        assert_eq!(wf1.workflow_id, "wf-1");
        assert!(wf1.is_active && wf1.is_running);
        assert_eq!(wf1.execution_phase, Some(ExecutionPhase::ExecutingComfyui));
        assert_eq!(wf1.execution_count, 3);

        let wf2 = snap.get("wf-2").unwrap();
        assert!(!wf2.is_running);
        assert_eq!(wf2.execution_count, 0);
        assert_eq!(snap.running().count(), 1);
    }

    #[test]
    fn changed_ids_covers_added_removed_and_modified() {
        let old = snapshot(serde_json::json!({
            "a": {"isActive": true},
            "b": {"isActive": true},
            "c": {"isActive": false}
        }));
        let new = snapshot(serde_json::json!({
            "a": {"isActive": true},
            "b": {"isActive": true, "isRunning": true},
            "d": {"isActive": true}
        }));
        assert_eq!(old.changed_ids(&new), vec!["b", "c", "d"]);
        assert!(new.changed_ids(&new.clone()).is_empty());
    }
}
