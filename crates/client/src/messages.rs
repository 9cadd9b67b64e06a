//! Request and response types for the workflow server and account API.
//!
//! Every response type tolerates missing optional fields; both services
//! omit keys rather than sending `null` in several code paths.

use std::collections::BTreeMap;

use brousla_core::workflow::WorkflowRunState;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Which generation endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    TextToImage,
    TextToVideo,
    ImageToVideo,
}

impl GenerationKind {
    /// Path of the submission endpoint on the workflow server.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::TextToImage => "/generate_image",
            Self::TextToVideo => "/generate_video",
            Self::ImageToVideo => "/generate_image_to_video",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::TextToVideo | Self::ImageToVideo)
    }
}

/// An uploaded file: original name plus raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Form fields for one generation submission.
///
/// Fields that do not apply to `kind` are ignored when the multipart form
/// is built (e.g. `cfg_scale` for video, `width` for image-to-video).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub workflow: UploadFile,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub cfg_scale: Option<f32>,
    pub seed: Option<i64>,
    pub fps: Option<u32>,
    pub length: Option<u32>,
    /// Source image, required for [`GenerationKind::ImageToVideo`].
    pub image: Option<UploadFile>,
    pub comfyui_url: String,
    pub comfyui_path: Option<String>,
}

impl GenerationRequest {
    pub fn new(
        kind: GenerationKind,
        workflow: UploadFile,
        prompt: impl Into<String>,
        comfyui_url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            workflow,
            prompt: prompt.into(),
            negative_prompt: None,
            width: None,
            height: None,
            steps: None,
            cfg_scale: None,
            seed: None,
            fps: None,
            length: None,
            image: None,
            comfyui_url: comfyui_url.into(),
            comfyui_path: None,
        }
    }

    /// Text fields sent with the form, in a stable order. The prompt is
    /// sent as `positive_prompt` for image-to-video.
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        let prompt_field = match self.kind {
            GenerationKind::ImageToVideo => "positive_prompt",
            GenerationKind::TextToImage | GenerationKind::TextToVideo => "prompt",
        };
        fields.push((prompt_field, self.prompt.clone()));
        if let Some(negative) = &self.negative_prompt {
            fields.push(("negative_prompt", negative.clone()));
        }

        let mut push = |name: &'static str, value: Option<String>| {
            if let Some(value) = value {
                fields.push((name, value));
            }
        };
        match self.kind {
            GenerationKind::TextToImage => {
                push("width", self.width.map(|v| v.to_string()));
                push("height", self.height.map(|v| v.to_string()));
                push("steps", self.steps.map(|v| v.to_string()));
                push("cfg_scale", self.cfg_scale.map(|v| v.to_string()));
            }
            GenerationKind::TextToVideo => {
                push("width", self.width.map(|v| v.to_string()));
                push("height", self.height.map(|v| v.to_string()));
                push("fps", self.fps.map(|v| v.to_string()));
                push("steps", self.steps.map(|v| v.to_string()));
                push("length", self.length.map(|v| v.to_string()));
            }
            GenerationKind::ImageToVideo => {
                push("fps", self.fps.map(|v| v.to_string()));
                push("steps", self.steps.map(|v| v.to_string()));
                push("length", self.length.map(|v| v.to_string()));
                push("comfyui_path", self.comfyui_path.clone());
            }
        }
        push("seed", self.seed.map(|v| v.to_string()));
        fields.push(("comfyui_url", self.comfyui_url.clone()));
        fields
    }
}

/// Response of the three `/generate_*` endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubmitResponse {
    pub success: bool,
    pub prompt_id: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "isComfyUIOffline")]
    pub is_comfyui_offline: bool,
}

/// Job status as reported by `GET /status/{prompt_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    pub success: bool,
    pub prompt_id: Option<String>,
    pub status: JobStatus,
    /// Percentage; the server sends integers or floats.
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl StatusResponse {
    /// Progress as a whole percentage in `0..=100`.
    pub fn percent(&self) -> Option<u8> {
        self.progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0).round() as u8)
    }
}

/// Output location returned by `GET /result/{prompt_id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResultResponse {
    pub success: bool,
    pub prompt_id: Option<String>,
    pub filename: Option<String>,
    pub subfolder: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Response of `GET /comfyui/test-connection`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub message: Option<String>,
    pub comfyui_url: Option<String>,
    pub queue_info: Option<serde_json::Value>,
    #[serde(rename = "isComfyUIOffline")]
    pub is_comfyui_offline: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// Response of `GET /workflows/status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowStatesResponse {
    pub success: bool,
    pub states: BTreeMap<String, WorkflowRunState>,
    pub error: Option<String>,
}

/// Response of `GET /workflows/{id}/status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowStatusResponse {
    pub success: bool,
    pub workflow_id: Option<String>,
    pub state: Option<WorkflowRunState>,
    pub error: Option<String>,
}

/// Response of `POST /workflows/{id}/activate|deactivate|cancel`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowActionResponse {
    pub success: bool,
    pub workflow_id: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    /// The activation was refused because the subscription cannot execute.
    pub subscription_error: bool,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Response of `GET /auth/google/login`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleLoginResponse {
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthStatus {
    Pending,
    Success,
    Error,
}

/// Response of `GET /auth/google/status/{state}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleStatusResponse {
    pub status: OAuthStatus,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Paid subscription plans accepted by the checkout endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Basic,
    Plus,
    Pro,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Plus => "plus",
            Self::Pro => "pro",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "plus" => Ok(Self::Plus),
            "pro" => Ok(Self::Pro),
            other => Err(format!("Invalid plan '{other}'. Must be basic, plus or pro")),
        }
    }
}

/// Response of `GET /api/subscription/status`.
///
/// Fields not modelled here (usage, dates, limits) are kept in `extra` so the
/// whole document can be handed to the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    #[serde(default)]
    pub subscription_plan: Option<String>,
    #[serde(default)]
    pub subscription_status: Option<String>,
    #[serde(default)]
    pub can_execute: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        self.subscription_status.as_deref() == Some("active")
    }

    /// Whether the account is on a paid plan, optionally a specific one.
    pub fn has_plan(&self, plan: Option<Plan>) -> bool {
        let current = self.subscription_plan.as_deref();
        match plan {
            Some(plan) => current == Some(plan.as_str()),
            None => current
                .and_then(|p| p.parse::<Plan>().ok())
                .is_some(),
        }
    }
}

/// Response of `POST /api/subscription/create-checkout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_to_image_fields() {
        let mut req = GenerationRequest::new(
            GenerationKind::TextToImage,
            UploadFile::new("flux.json", b"{}".to_vec()),
            "a cat",
            "http://127.0.0.1:8188",
        );
        req.width = Some(1024);
        req.cfg_scale = Some(3.5);
        req.fps = Some(24);
        let names: Vec<_> = req.text_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["prompt", "width", "cfg_scale", "comfyui_url"]);
    }

    #[test]
    fn image_to_video_uses_positive_prompt() {
        let mut req = GenerationRequest::new(
            GenerationKind::ImageToVideo,
            UploadFile::new("wan.json", b"{}".to_vec()),
            "waves",
            "http://127.0.0.1:8188",
        );
        req.width = Some(512);
        req.length = Some(81);
        req.comfyui_path = Some("/opt/ComfyUI".into());
        let fields = req.text_fields();
        assert_eq!(fields[0], ("positive_prompt", "waves".to_string()));
        assert!(fields.iter().all(|(k, _)| *k != "width"));
        assert!(fields.contains(&("comfyui_path", "/opt/ComfyUI".to_string())));
    }

    #[test]
    fn status_response_tolerates_unknown_status() {
        let resp: StatusResponse = serde_json::from_value(serde_json::json!({
            "success": true, "status": "queued_somewhere", "progress": 42.6
        }))
        .unwrap();
        assert_eq!(resp.status, JobStatus::Unknown);
        assert_eq!(resp.percent(), Some(43));
    }

    #[test]
    fn submit_response_reads_offline_flag() {
        let resp: SubmitResponse = serde_json::from_value(serde_json::json!({
            "success": false, "error": "Connection refused", "isComfyUIOffline": true
        }))
        .unwrap();
        assert!(!resp.success);
        assert!(resp.is_comfyui_offline);
        assert!(resp.prompt_id.is_none());
    }

    #[test]
    fn subscription_status_keeps_extra_fields() {
        let status: SubscriptionStatus = serde_json::from_value(serde_json::json!({
            "subscription_plan": "plus",
            "subscription_status": "active",
            "can_execute": true,
            "usage": {"type": "monthly", "used": 3, "limit": 2000}
        }))
        .unwrap();
        assert!(status.is_active());
        assert!(status.has_plan(Some(Plan::Plus)));
        assert!(!status.has_plan(Some(Plan::Pro)));
        assert!(status.has_plan(None));
        assert_eq!(status.extra["usage"]["limit"], 2000);
    }

    #[test]
    fn trial_is_not_a_paid_plan() {
        let status = SubscriptionStatus {
            subscription_plan: Some("trial".into()),
            ..Default::default()
        };
        assert!(!status.has_plan(None));
    }
}
