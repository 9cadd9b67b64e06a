//! REST clients for the services the desktop app delegates to.
//!
//! - [`WorkflowServerApi`]: the local workflow server that fronts ComfyUI
//!   (generation submission, status, results, scheduled workflow state).
//! - [`AccountApi`]: the account service (Google sign-in, subscription
//!   status, Stripe checkout sessions).
//!
//! Both wrap a shared [`reqwest::Client`] and return typed [`messages`].

pub mod account;
pub mod error;
mod http;
pub mod messages;
pub mod workflow_server;

pub use account::AccountApi;
pub use error::ClientError;
pub use workflow_server::WorkflowServerApi;
