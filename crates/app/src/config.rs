use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use brousla_core::error::CoreError;
use brousla_core::policy::{Budget, PolicyKind, PolicyTable, PollPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error(transparent)]
    Policy(#[from] CoreError),
}

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local install where the
/// workflow server, account API and ComfyUI run on the same machine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub workflow_server_url: String,
    pub api_server_url: String,
    pub comfyui_url: String,
    /// ComfyUI install folder, used to resolve output files.
    pub comfyui_path: Option<String>,
    pub settings_path: PathBuf,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub reconcile_interval: Duration,
    /// Poll policy per situation, with env overrides applied.
    pub policies: PolicyTable,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default                 |
    /// |------------------------------------|-------------------------|
    /// | `WORKFLOW_SERVER_URL`              | `http://127.0.0.1:8000` |
    /// | `API_SERVER_URL`                   | `http://127.0.0.1:8001` |
    /// | `COMFYUI_URL`                      | `http://127.0.0.1:8188` |
    /// | `COMFYUI_PATH`                     | unset                   |
    /// | `SETTINGS_PATH`                    | `brousla-settings.json` |
    /// | `REQUEST_TIMEOUT_SECS`             | `30`                    |
    /// | `GENERATION_POLL_INTERVAL_MS`      | `2000`                  |
    /// | `GENERATION_IMAGE_TIMEOUT_SECS`    | `300`                   |
    /// | `GENERATION_VIDEO_TIMEOUT_SECS`    | `600`                   |
    /// | `OAUTH_TIMEOUT_SECS`               | `300`                   |
    /// | `OAUTH_FINAL_CHECK`                | `false`                 |
    /// | `WORKFLOW_RECONCILE_INTERVAL_SECS` | `5`                     |
    /// | `CHECKOUT_SUCCESS_ATTEMPTS`        | `15`                    |
    /// | `CHECKOUT_CLOSED_ATTEMPTS`         | `5`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let poll_interval = Duration::from_millis(vars.parse("GENERATION_POLL_INTERVAL_MS", 2000)?);
        let image_timeout = Duration::from_secs(vars.parse("GENERATION_IMAGE_TIMEOUT_SECS", 300)?);
        let video_timeout = Duration::from_secs(vars.parse("GENERATION_VIDEO_TIMEOUT_SECS", 600)?);
        let oauth_timeout = Duration::from_secs(vars.parse("OAUTH_TIMEOUT_SECS", 300)?);
        let oauth_final_check: bool = vars.parse("OAUTH_FINAL_CHECK", false)?;
        let reconcile_interval =
            Duration::from_secs(vars.parse("WORKFLOW_RECONCILE_INTERVAL_SECS", 5)?);
        let success_attempts: u32 = vars.parse("CHECKOUT_SUCCESS_ATTEMPTS", 15)?;
        let closed_attempts: u32 = vars.parse("CHECKOUT_CLOSED_ATTEMPTS", 5)?;

        let mut policies = PolicyTable::default();
        let image = PolicyKind::GenerationImage.default_policy();
        policies.set(
            PolicyKind::GenerationImage,
            PollPolicy {
                interval: poll_interval,
                budget: Budget::Timeout(image_timeout),
                ..image
            },
        )?;
        let video = PolicyKind::GenerationVideo.default_policy();
        policies.set(
            PolicyKind::GenerationVideo,
            PollPolicy {
                interval: poll_interval,
                budget: Budget::Timeout(video_timeout),
                ..video
            },
        )?;
        let oauth = PolicyKind::OAuthSignIn.default_policy();
        policies.set(
            PolicyKind::OAuthSignIn,
            PollPolicy {
                budget: Budget::Timeout(oauth_timeout),
                final_check: oauth_final_check,
                ..oauth
            },
        )?;
        let workflow = PolicyKind::WorkflowActivation.default_policy();
        policies.set(
            PolicyKind::WorkflowActivation,
            PollPolicy {
                interval: reconcile_interval,
                ..workflow
            },
        )?;
        let success = PolicyKind::CheckoutSuccess.default_policy();
        policies.set(
            PolicyKind::CheckoutSuccess,
            PollPolicy {
                budget: Budget::MaxAttempts(success_attempts),
                ..success
            },
        )?;
        let closed = PolicyKind::CheckoutClosed.default_policy();
        policies.set(
            PolicyKind::CheckoutClosed,
            PollPolicy {
                budget: Budget::MaxAttempts(closed_attempts),
                ..closed
            },
        )?;

        Ok(Self {
            workflow_server_url: vars.string("WORKFLOW_SERVER_URL", "http://127.0.0.1:8000"),
            api_server_url: vars.string("API_SERVER_URL", "http://127.0.0.1:8001"),
            comfyui_url: vars.string("COMFYUI_URL", "http://127.0.0.1:8188"),
            comfyui_path: vars.get("COMFYUI_PATH"),
            settings_path: PathBuf::from(vars.string("SETTINGS_PATH", "brousla-settings.json")),
            request_timeout: Duration::from_secs(vars.parse("REQUEST_TIMEOUT_SECS", 30)?),
            reconcile_interval,
            policies,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workflow_server_url: "http://127.0.0.1:8000".into(),
            api_server_url: "http://127.0.0.1:8001".into(),
            comfyui_url: "http://127.0.0.1:8188".into(),
            comfyui_path: None,
            settings_path: PathBuf::from("brousla-settings.json"),
            request_timeout: Duration::from_secs(30),
            reconcile_interval: brousla_core::policy::DEFAULT_WORKFLOW_INTERVAL,
            policies: PolicyTable::default(),
        }
    }
}

// ---- private helpers ----

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Non-empty value of `var`, trimmed.
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, var: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(var) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
