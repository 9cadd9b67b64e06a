#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use brousla_core::policy::{Budget, PolicyKind, PolicyTable, PollPolicy};
use brousla_events::EventBus;
use brousla_tracker::OperationRegistry;

/// Default policies with a 10 ms interval so real-time tests stay fast.
pub fn fast_policies() -> PolicyTable {
    let mut table = PolicyTable::default();
    for kind in PolicyKind::ALL {
        let default = kind.default_policy();
        let budget = match default.budget {
            Budget::Timeout(_) => Budget::Timeout(Duration::from_secs(5)),
            other => other,
        };
        let policy = PollPolicy::new(Duration::from_millis(10), budget)
            .with_final_check(default.final_check)
            .with_running_when(default.running_when);
        table.set(kind, policy).expect("valid policy");
    }
    table
}

pub fn registry() -> Arc<OperationRegistry> {
    Arc::new(OperationRegistry::new(
        fast_policies(),
        Arc::new(EventBus::default()),
    ))
}

pub fn json_body(value: serde_json::Value) -> String {
    value.to_string()
}
