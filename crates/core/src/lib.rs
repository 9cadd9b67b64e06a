//! Core data model for the Brousla operation tracker.
//!
//! Pure types and functions only: the [`operation::Operation`] entity, the
//! [`state_machine`] that validates its transitions, per-domain
//! [`policy`] defaults, and the [`workflow`] run-state view maintained by
//! the reconciler. Nothing in this crate performs I/O.

pub mod error;
pub mod operation;
pub mod policy;
pub mod state_machine;
pub mod types;
pub mod workflow;
