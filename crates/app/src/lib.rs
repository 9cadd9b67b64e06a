//! Application wiring for the Brousla desktop client.
//!
//! [`AppContext`] is the explicit store shared by every view: configuration,
//! persisted [`Settings`], the operation registry, the workflow reconciler,
//! the event bus and typed [`NavigationEvent`]s.

pub mod config;
pub mod context;
pub mod navigation;
pub mod settings;

pub use config::{AppConfig, ConfigError};
pub use context::{AppContext, ContextError};
pub use navigation::NavigationEvent;
pub use settings::{
    JsonFileSettingsStore, MemorySettingsStore, Settings, SettingsError, SettingsStore,
};
