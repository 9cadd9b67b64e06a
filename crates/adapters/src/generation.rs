//! Image and video generation jobs on the workflow server.
//!
//! Launch submits the multipart form; the returned ComfyUI `prompt_id` is
//! the operation id. Completed jobs resolve to the output file's location
//! plus a display URL served by the workflow server.

use async_trait::async_trait;
use brousla_client::messages::{GenerationKind, GenerationRequest, JobStatus, SubmitResponse};
use brousla_client::WorkflowServerApi;
use brousla_core::operation::{Domain, ErrorInfo, OperationId};
use brousla_core::policy::PolicyKind;
use brousla_tracker::{
    AdapterError, Launched, Launcher, OperationAdapter, StatusReport, TrackRequest,
};
use sha2::{Digest, Sha256};

use crate::convert::client_error;
use crate::offline::{is_connection_failure, OFFLINE_MESSAGE};

/// Adapter for `/generate_*`, `/status/{id}` and `/result/{id}`.
#[derive(Clone)]
pub struct GenerationAdapter {
    api: WorkflowServerApi,
    comfyui_url: String,
    comfyui_path: Option<String>,
}

impl GenerationAdapter {
    pub fn new(api: WorkflowServerApi, comfyui_url: impl Into<String>) -> Self {
        Self {
            api,
            comfyui_url: comfyui_url.into(),
            comfyui_path: None,
        }
    }

    /// ComfyUI install folder, needed to resolve output files.
    pub fn with_comfyui_path(mut self, path: impl Into<String>) -> Self {
        self.comfyui_path = Some(path.into());
        self
    }

    pub fn policy_for(kind: GenerationKind) -> PolicyKind {
        if kind.is_video() {
            PolicyKind::GenerationVideo
        } else {
            PolicyKind::GenerationImage
        }
    }

    /// Resume tracking a job submitted earlier (e.g. before a restart).
    pub fn resume_request(prompt_id: impl Into<OperationId>, kind: GenerationKind) -> TrackRequest {
        TrackRequest::new(prompt_id, Self::policy_for(kind))
    }

    /// Probe whether the workflow server can reach ComfyUI.
    pub async fn test_connection(&self) -> Result<(), AdapterError> {
        let response = self
            .api
            .test_connection(&self.comfyui_url)
            .await
            .map_err(client_error)?;
        if response.success {
            return Ok(());
        }
        let message = response
            .message
            .or(response.error)
            .unwrap_or_else(|| "ComfyUI connection test failed".to_string());
        if response.is_comfyui_offline || is_connection_failure(&message) {
            Err(AdapterError::Offline(message))
        } else {
            Err(AdapterError::Rejected(message))
        }
    }

    fn submit_failure(response: SubmitResponse) -> AdapterError {
        let message = response
            .error
            .or(response.message)
            .unwrap_or_else(|| "Generation request failed".to_string());
        if response.is_comfyui_offline || is_connection_failure(&message) {
            AdapterError::Offline(message)
        } else {
            AdapterError::Rejected(message)
        }
    }
}

/// Fingerprint of everything that distinguishes one generation request.
pub fn request_fingerprint(request: &GenerationRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}", request.kind).as_bytes());
    hasher.update([0u8]);
    hasher.update(request.workflow.filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(&request.workflow.bytes);
    hasher.update([0u8]);
    for (name, value) in request.text_fields() {
        hasher.update(name.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    if let Some(image) = &request.image {
        hasher.update(image.filename.as_bytes());
        hasher.update([0u8]);
        hasher.update(&image.bytes);
    }
    format!("generation:{:x}", hasher.finalize())
}

#[async_trait]
impl OperationAdapter for GenerationAdapter {
    fn domain(&self) -> Domain {
        Domain::Generation
    }

    async fn check(&self, id: &OperationId) -> Result<StatusReport, AdapterError> {
        let response = self
            .api
            .status(id.as_str(), &self.comfyui_url)
            .await
            .map_err(client_error)?;

        let progress = response.percent();
        let message = response.message.clone().or(response.error.clone());
        if !response.success {
            let message = message.unwrap_or_else(|| "Failed to get generation status".to_string());
            if is_connection_failure(&message) {
                return Err(AdapterError::Offline(message));
            }
            return Ok(StatusReport::error(message));
        }

        let report = match response.status {
            JobStatus::Completed => StatusReport::completed(),
            JobStatus::Running => StatusReport::running(),
            JobStatus::Error => {
                return Ok(StatusReport::error(
                    message.unwrap_or_else(|| "Generation failed".to_string()),
                ))
            }
            // Unknown ids are reported while ComfyUI is still queueing.
            JobStatus::Pending | JobStatus::Unknown => StatusReport::pending(),
        };
        let report = report.with_progress(progress);
        Ok(match message {
            Some(message) => report.with_message(message),
            None => report,
        })
    }

    async fn fetch_result(&self, id: &OperationId) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .api
            .result(id.as_str(), &self.comfyui_url, self.comfyui_path.as_deref())
            .await
            .map_err(client_error)?;

        let filename = match (response.success, response.filename) {
            (true, Some(filename)) => filename,
            _ => {
                return Err(AdapterError::Rejected(
                    response
                        .error
                        .or(response.message)
                        .unwrap_or_else(|| "Failed to get generation result".to_string()),
                ))
            }
        };
        let subfolder = response.subfolder.unwrap_or_default();
        let url = self
            .api
            .file_url(&filename, &subfolder, self.comfyui_path.as_deref())
            .map_err(client_error)?;

        Ok(serde_json::json!({
            "prompt_id": id.as_str(),
            "filename": filename,
            "subfolder": subfolder,
            "url": url,
        }))
    }

    fn classify_failure(&self, error: &AdapterError) -> ErrorInfo {
        match error {
            AdapterError::Offline(detail) => {
                tracing::debug!(detail = %detail, "ComfyUI unreachable");
                ErrorInfo::offline(OFFLINE_MESSAGE)
            }
            AdapterError::Rejected(msg) | AdapterError::Http { body: msg, .. }
                if is_connection_failure(msg) =>
            {
                ErrorInfo::offline(OFFLINE_MESSAGE)
            }
            other => other.classify(),
        }
    }
}

#[async_trait]
impl Launcher for GenerationAdapter {
    type Params = GenerationRequest;

    fn natural_key(&self, params: &GenerationRequest) -> String {
        request_fingerprint(params)
    }

    async fn launch(&self, params: &GenerationRequest) -> Result<Launched, AdapterError> {
        let response = self.api.generate(params).await.map_err(client_error)?;
        if !response.success {
            return Err(Self::submit_failure(response));
        }
        let prompt_id = response
            .prompt_id
            .ok_or_else(|| AdapterError::InvalidResponse("Missing prompt_id".to_string()))?;

        tracing::info!(prompt_id = %prompt_id, kind = ?params.kind, "Generation submitted");
        Ok(Launched::new(prompt_id, Self::policy_for(params.kind)))
    }
}
