//! Backend adapters for the operation tracker.
//!
//! Each adapter translates one backend's HTTP responses into
//! [`StatusReport`](brousla_tracker::StatusReport)s and classifies its
//! failures:
//!
//! - [`GenerationAdapter`]: image/video jobs on the workflow server.
//! - [`WorkflowActivationAdapter`]: scheduled workflow activation; also the
//!   reconciler's snapshot source.
//! - [`OAuthAdapter`]: Google sign-in completion.
//! - [`CheckoutAdapter`]: Stripe subscription checkout completion.

pub mod checkout;
mod convert;
pub mod generation;
pub mod oauth;
pub mod offline;
pub mod workflow;

pub use checkout::{await_checkout, CheckoutAdapter, CheckoutEvent};
pub use generation::GenerationAdapter;
pub use oauth::OAuthAdapter;
pub use workflow::WorkflowActivationAdapter;
