//! The application-wide store.
//!
//! One [`AppContext`] is created at startup and shared as
//! `Arc<AppContext>`. It owns the long-lived pieces (registry, reconciler,
//! event bus) and builds the per-backend adapters from the effective
//! configuration: persisted [`Settings`] first, then [`AppConfig`].

use std::sync::Arc;

use brousla_adapters::{CheckoutAdapter, GenerationAdapter, OAuthAdapter, WorkflowActivationAdapter};
use brousla_client::messages::{GenerationKind, GenerationRequest};
use brousla_client::{AccountApi, WorkflowServerApi};
use brousla_core::operation::{Operation, OperationId, OperationStatus};
use brousla_events::EventBus;
use brousla_tracker::{OperationHandle, OperationRegistry, Reconciler, TrackerError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::navigation::NavigationEvent;
use crate::settings::{Settings, SettingsError, SettingsStore};

const NAVIGATION_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct AppContext {
    config: AppConfig,
    store: Arc<dyn SettingsStore>,
    settings: RwLock<Settings>,
    http: reqwest::Client,
    bus: Arc<EventBus>,
    registry: Arc<OperationRegistry>,
    workflows: Arc<WorkflowActivationAdapter>,
    reconciler: Arc<Reconciler>,
    oauth: Arc<OAuthAdapter>,
    navigation: broadcast::Sender<NavigationEvent>,
    editing_workflow: Mutex<Option<String>>,
    cancel: CancellationToken,
}

impl AppContext {
    /// Load settings from `store` and wire every component.
    pub async fn new(config: AppConfig, store: Arc<dyn SettingsStore>) -> Result<Self, ContextError> {
        let settings = store.load().await?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let bus = Arc::new(EventBus::default());
        let registry = Arc::new(OperationRegistry::new(config.policies.clone(), bus.clone()));

        let workflows = Arc::new(WorkflowActivationAdapter::new(workflow_api(
            &http, &config, &settings,
        )));
        let reconciler = Arc::new(
            Reconciler::new(workflows.clone(), bus.clone()).with_interval(config.reconcile_interval),
        );
        let oauth = Arc::new(OAuthAdapter::new(account_api(&http, &config, &settings)));
        let (navigation, _) = broadcast::channel(NAVIGATION_CAPACITY);

        tracing::info!(
            workflow_server = %settings.workflow_server_url.as_deref().unwrap_or(&config.workflow_server_url),
            signed_in = settings.is_signed_in(),
            "Application context ready"
        );

        Ok(Self {
            config,
            store,
            settings: RwLock::new(settings),
            http,
            bus,
            registry,
            workflows,
            reconciler,
            oauth,
            navigation,
            editing_workflow: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn comfyui_url(&self) -> String {
        self.settings
            .read()
            .comfyui_url
            .clone()
            .unwrap_or_else(|| self.config.comfyui_url.clone())
    }

    pub fn comfyui_path(&self) -> Option<String> {
        self.settings
            .read()
            .comfyui_path
            .clone()
            .or_else(|| self.config.comfyui_path.clone())
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Apply `edit` to the settings and persist the result.
    pub async fn update_settings<F>(&self, edit: F) -> Result<Settings, SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut next = self.settings();
        edit(&mut next);
        self.store.save(&next).await?;
        *self.settings.write() = next.clone();
        Ok(next)
    }

    pub async fn sign_out(&self) -> Result<(), SettingsError> {
        self.update_settings(|s| s.auth_token = None).await?;
        tracing::info!("Signed out");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    pub fn generation_adapter(&self) -> Arc<GenerationAdapter> {
        let adapter = GenerationAdapter::new(self.workflow_api(), self.comfyui_url());
        Arc::new(match self.comfyui_path() {
            Some(path) => adapter.with_comfyui_path(path),
            None => adapter,
        })
    }

    pub async fn start_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<OperationHandle, TrackerError> {
        self.registry.start(self.generation_adapter(), request).await
    }

    /// Resume tracking a job submitted in an earlier session.
    pub async fn resume_generation(
        &self,
        prompt_id: impl Into<OperationId>,
        kind: GenerationKind,
    ) -> Result<OperationHandle, TrackerError> {
        let request = GenerationAdapter::resume_request(prompt_id, kind);
        self.registry.track(self.generation_adapter(), request).await
    }

    pub async fn activate_workflow(
        &self,
        workflow_id: impl Into<String>,
    ) -> Result<OperationHandle, TrackerError> {
        self.registry
            .start(self.workflows.clone(), workflow_id.into())
            .await
    }

    /// Start Google sign-in. The handle's detail carries the `auth_url` to
    /// open in the browser.
    pub async fn start_sign_in(&self) -> Result<OperationHandle, TrackerError> {
        self.registry.start(self.oauth.clone(), ()).await
    }

    /// Store the token of a completed sign-in. Returns `false` when the
    /// operation did not complete with a token.
    pub async fn complete_sign_in(&self, operation: &Operation) -> Result<bool, SettingsError> {
        if operation.status() != OperationStatus::Completed {
            return Ok(false);
        }
        let Some(token) = operation
            .result()
            .and_then(|r| r.get("token"))
            .and_then(|t| t.as_str())
        else {
            return Ok(false);
        };
        self.update_settings(|s| s.auth_token = Some(token.to_string()))
            .await?;
        tracing::info!(operation_id = %operation.id, "Signed in");
        self.navigate(NavigationEvent::SignedIn);
        Ok(true)
    }

    /// Checkout adapter for the signed-in user, `None` when signed out.
    pub fn checkout_adapter(&self) -> Option<Arc<CheckoutAdapter>> {
        let token = self.settings.read().auth_token.clone()?;
        Some(Arc::new(CheckoutAdapter::new(self.account_api(), token)))
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Remember which workflow is being edited and ask the editor to open it.
    pub fn edit_workflow(&self, workflow_id: impl Into<String>) {
        let workflow_id = workflow_id.into();
        *self.editing_workflow.lock() = Some(workflow_id.clone());
        self.navigate(NavigationEvent::EditWorkflow { workflow_id });
    }

    pub fn editing_workflow(&self) -> Option<String> {
        self.editing_workflow.lock().clone()
    }

    pub fn navigate(&self, event: NavigationEvent) {
        tracing::debug!(event = ?event, "Navigation");
        // No receivers is fine; nobody is showing a view yet.
        let _ = self.navigation.send(event);
    }

    pub fn subscribe_navigation(&self) -> broadcast::Receiver<NavigationEvent> {
        self.navigation.subscribe()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run the workflow reconciler until [`shutdown`](Self::shutdown).
    pub fn spawn_reconciler(&self) -> tokio::task::JoinHandle<()> {
        let reconciler = self.reconciler.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move { reconciler.run(cancel).await })
    }

    /// Stop the reconciler and every poller.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.registry.shutdown().await;
    }

    // ---- private helpers ----

    fn workflow_api(&self) -> WorkflowServerApi {
        workflow_api(&self.http, &self.config, &self.settings.read())
    }

    fn account_api(&self) -> AccountApi {
        account_api(&self.http, &self.config, &self.settings.read())
    }
}

fn workflow_api(http: &reqwest::Client, config: &AppConfig, settings: &Settings) -> WorkflowServerApi {
    let base = settings
        .workflow_server_url
        .as_deref()
        .unwrap_or(&config.workflow_server_url);
    let api = WorkflowServerApi::with_client(http.clone(), base);
    match &settings.user_id {
        Some(user_id) => api.with_user_id(user_id.as_str()),
        None => api,
    }
}

fn account_api(http: &reqwest::Client, config: &AppConfig, settings: &Settings) -> AccountApi {
    let base = settings
        .api_server_url
        .as_deref()
        .unwrap_or(&config.api_server_url);
    AccountApi::with_client(http.clone(), base)
}
