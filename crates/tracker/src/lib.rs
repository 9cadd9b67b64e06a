//! Client-side tracking of long-running remote operations.
//!
//! The [`OperationRegistry`] starts or adopts remote operations through a
//! domain [`OperationAdapter`], drives each one with a dedicated poller task
//! and reports every status change to per-operation subscribers and the
//! application-wide [`EventBus`](brousla_events::EventBus). Collection-style
//! state (scheduled workflows) is mirrored by the [`Reconciler`] instead.
//!
//! Nothing in this crate speaks HTTP; adapters live in `brousla-adapters`.

pub mod adapter;
mod cell;
pub mod error;
pub mod handle;
mod poller;
pub mod reconciler;
pub mod registry;

pub use adapter::{
    AdapterError, Launched, Launcher, OperationAdapter, RemoteStatus, StatusReport, TrackRequest,
};
pub use error::TrackerError;
pub use handle::OperationHandle;
pub use reconciler::{ReconcileOutcome, Reconciler, SnapshotSource};
pub use registry::OperationRegistry;
