//! Brousla event delivery.
//!
//! - [`OperationEvent`] / [`SnapshotEvent`]: what subscribers are told.
//! - [`ListenerSet`] / [`Subscription`]: ordered, lossless per-operation
//!   delivery over unbounded channels. Dropping a [`Subscription`] is always
//!   safe; the sender side prunes it on the next notification.
//! - [`EventBus`]: application-wide fan-out of every [`TrackerEvent`],
//!   backed by `tokio::sync::broadcast`.

pub mod bus;
pub mod event;
pub mod listeners;

pub use bus::{EventBus, TrackerEvent};
pub use event::{OperationEvent, OperationEventKind, SnapshotEvent};
pub use listeners::{ListenerSet, Subscription, SubscriptionId};
