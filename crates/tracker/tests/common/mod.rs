//! Scripted adapters shared by the tracker integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brousla_core::operation::{Domain, OperationId};
use brousla_core::policy::{Budget, PolicyKind, PolicyTable, PollPolicy};
use brousla_events::{EventBus, OperationEvent, Subscription};
use brousla_core::operation::OperationStatus;
use brousla_tracker::{
    AdapterError, Launched, Launcher, OperationAdapter, OperationRegistry, StatusReport,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// One scripted `check` response.
#[derive(Debug, Clone)]
pub enum Step {
    Pending,
    Running(Option<u8>),
    Completed,
    Failed(&'static str),
    Network,
    Offline,
}

impl Step {
    fn into_response(self) -> Result<StatusReport, AdapterError> {
        match self {
            Step::Pending => Ok(StatusReport::pending()),
            Step::Running(progress) => Ok(StatusReport::running().with_progress(progress)),
            Step::Completed => Ok(StatusReport::completed()),
            Step::Failed(message) => Ok(StatusReport::error(message)),
            Step::Network => Err(AdapterError::Network("connection reset".into())),
            Step::Offline => Err(AdapterError::Offline("ComfyUI is not running".into())),
        }
    }
}

pub struct ScriptedAdapter {
    domain: Domain,
    policy: PolicyKind,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    fetch_fails: bool,
    launch_fails: bool,
    gate_next_check: AtomicBool,
    gate_launch: AtomicBool,
    stall_checks: AtomicBool,
    /// Notified when a gated call starts.
    pub entered: Notify,
    /// Releases a gated call.
    pub release: Notify,
    checks: AtomicU32,
    fetches: AtomicU32,
    cancels: AtomicU32,
    launches: AtomicU32,
    releases: AtomicU32,
}

impl ScriptedAdapter {
    pub fn new(policy: PolicyKind, script: Vec<Step>, fallback: Step) -> Self {
        Self {
            domain: policy.domain(),
            policy,
            script: Mutex::new(script.into()),
            fallback,
            fetch_fails: false,
            launch_fails: false,
            gate_next_check: AtomicBool::new(false),
            gate_launch: AtomicBool::new(false),
            stall_checks: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
            checks: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
            cancels: AtomicU32::new(0),
            launches: AtomicU32::new(0),
            releases: AtomicU32::new(0),
        }
    }

    pub fn always(policy: PolicyKind, step: Step) -> Self {
        Self::new(policy, Vec::new(), step)
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.launch_fails = true;
        self
    }

    pub fn gate_next_check(&self) {
        self.gate_next_check.store(true, Ordering::SeqCst);
    }

    pub fn gate_launch(&self) {
        self.gate_launch.store(true, Ordering::SeqCst);
    }

    /// Make every later `check` hang forever.
    pub fn stall_checks(&self) {
        self.stall_checks.store(true, Ordering::SeqCst);
    }

    /// Replace whatever the script would answer next.
    pub fn push_front(&self, step: Step) {
        self.script.lock().push_front(step);
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationAdapter for ScriptedAdapter {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn check(&self, _id: &OperationId) -> Result<StatusReport, AdapterError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.stall_checks.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.gate_next_check.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        step.into_response()
    }

    async fn fetch_result(&self, id: &OperationId) -> Result<serde_json::Value, AdapterError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fetch_fails {
            return Err(AdapterError::Network("result endpoint unreachable".into()));
        }
        Ok(serde_json::json!({ "id": id.as_str(), "url": "http://127.0.0.1:8000/comfyui-file?filename=out.png" }))
    }

    async fn cancel_remote(&self, _id: &OperationId) -> Result<(), AdapterError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, _id: &OperationId) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Launcher for ScriptedAdapter {
    type Params = String;

    fn natural_key(&self, params: &String) -> String {
        params.clone()
    }

    async fn launch(&self, params: &String) -> Result<Launched, AdapterError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.gate_launch.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.launch_fails {
            return Err(AdapterError::Offline("ComfyUI is not running".into()));
        }
        Ok(Launched::new(format!("{params}-{n}"), self.policy)
            .with_detail(serde_json::json!({ "launch": n })))
    }
}

pub fn registry(table: PolicyTable) -> Arc<OperationRegistry> {
    Arc::new(OperationRegistry::new(table, Arc::new(EventBus::default())))
}

/// Policy table whose `kind` polls every `interval_ms` with `budget`.
pub fn table_with(kind: PolicyKind, interval_ms: u64, budget: Budget, final_check: bool) -> PolicyTable {
    let policy = PollPolicy::new(Duration::from_millis(interval_ms), budget)
        .with_running_when(kind.default_policy().running_when)
        .with_final_check(final_check);
    PolicyTable::default()
        .with(kind, policy)
        .expect("valid test policy")
}

/// Every status transition a subscription has received, in order.
pub async fn transitions(
    sub: &mut Subscription<OperationEvent>,
) -> Vec<(OperationStatus, OperationStatus)> {
    let mut out = Vec::new();
    while let Some(event) = sub.recv().await {
        if let Some(pair) = event.as_transition() {
            out.push(pair);
        }
    }
    out
}

pub fn id(s: &str) -> OperationId {
    OperationId::new(s)
}
