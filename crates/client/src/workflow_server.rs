//! REST client for the local workflow server.
//!
//! Wraps generation submission, job status/result lookup, scheduled
//! workflow state and the ComfyUI connectivity probe using [`reqwest`].
//! The server reports most failures as `200 {"success": false, ...}`;
//! those bodies are returned as-is for the caller to interpret.

use reqwest::multipart::{Form, Part};
use reqwest::Url;

use crate::error::ClientError;
use crate::http::parse_response;
use crate::messages::{
    ConnectionTestResponse, GenerationRequest, ResultResponse, StatusResponse, SubmitResponse,
    UploadFile, WorkflowActionResponse, WorkflowStatesResponse, WorkflowStatusResponse,
};

/// Header carrying the signed-in user's id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// HTTP client for one workflow server.
#[derive(Clone)]
pub struct WorkflowServerApi {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
}

impl WorkflowServerApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: None,
        }
    }

    /// Send `X-User-Id` with every request.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a generation job.
    ///
    /// Sends a multipart `POST` to the endpoint matching `request.kind`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<SubmitResponse, ClientError> {
        let mut form = Form::new().part("workflow_file", file_part(&request.workflow, "application/json")?);
        if let Some(image) = &request.image {
            form = form.part("image_file", file_part(image, "application/octet-stream")?);
        }
        for (name, value) in request.text_fields() {
            form = form.text(name, value);
        }

        tracing::debug!(
            kind = ?request.kind,
            workflow = %request.workflow.filename,
            "Submitting generation request"
        );
        let response = self
            .request(reqwest::Method::POST, request.kind.endpoint())
            .multipart(form)
            .send()
            .await?;

        parse_response(response).await
    }

    /// Current status of a generation job.
    ///
    /// Sends `GET /status/{prompt_id}?comfyui_url=...`.
    pub async fn status(&self, prompt_id: &str, comfyui_url: &str) -> Result<StatusResponse, ClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/status/{prompt_id}"))
            .query(&[("comfyui_url", comfyui_url)])
            .send()
            .await?;

        parse_response(response).await
    }

    /// Output location of a finished generation job.
    ///
    /// Sends `GET /result/{prompt_id}?comfyui_url=...&comfyui_path=...`.
    pub async fn result(
        &self,
        prompt_id: &str,
        comfyui_url: &str,
        comfyui_path: Option<&str>,
    ) -> Result<ResultResponse, ClientError> {
        let mut query = vec![("comfyui_url", comfyui_url)];
        if let Some(path) = comfyui_path {
            query.push(("comfyui_path", path));
        }
        let response = self
            .request(reqwest::Method::GET, &format!("/result/{prompt_id}"))
            .query(&query)
            .send()
            .await?;

        parse_response(response).await
    }

    /// URL at which the server serves a ComfyUI output file.
    pub fn file_url(
        &self,
        filename: &str,
        subfolder: &str,
        comfyui_path: Option<&str>,
    ) -> Result<String, ClientError> {
        let mut params = vec![("filename", filename), ("subfolder", subfolder)];
        if let Some(path) = comfyui_path {
            params.push(("comfyui_path", path));
        }
        let url = Url::parse_with_params(&format!("{}/comfyui-file", self.base_url), &params)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(url.to_string())
    }

    /// State of every scheduled workflow.
    pub async fn workflow_states(&self) -> Result<WorkflowStatesResponse, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/workflows/status")
            .send()
            .await?;

        parse_response(response).await
    }

    /// State of a single scheduled workflow.
    pub async fn workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatusResponse, ClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/workflows/{workflow_id}/status"))
            .send()
            .await?;

        parse_response(response).await
    }

    pub async fn activate_workflow(&self, workflow_id: &str) -> Result<WorkflowActionResponse, ClientError> {
        self.workflow_action(workflow_id, "activate").await
    }

    pub async fn deactivate_workflow(&self, workflow_id: &str) -> Result<WorkflowActionResponse, ClientError> {
        self.workflow_action(workflow_id, "deactivate").await
    }

    /// Cancel the workflow's in-progress execution.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<WorkflowActionResponse, ClientError> {
        self.workflow_action(workflow_id, "cancel").await
    }

    /// Ask the server whether it can reach ComfyUI at `comfyui_url`.
    pub async fn test_connection(&self, comfyui_url: &str) -> Result<ConnectionTestResponse, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/comfyui/test-connection")
            .query(&[("comfyui_url", comfyui_url)])
            .send()
            .await?;

        parse_response(response).await
    }

    // ---- private helpers ----

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.user_id {
            Some(user_id) => builder.header(USER_ID_HEADER, user_id),
            None => builder,
        }
    }

    async fn workflow_action(
        &self,
        workflow_id: &str,
        action: &str,
    ) -> Result<WorkflowActionResponse, ClientError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/workflows/{workflow_id}/{action}"))
            .send()
            .await?;

        parse_response(response).await
    }
}

fn file_part(file: &UploadFile, mime: &str) -> Result<Part, ClientError> {
    Ok(Part::bytes(file.bytes.clone())
        .file_name(file.filename.clone())
        .mime_str(mime)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = WorkflowServerApi::new("http://127.0.0.1:8000/");
        assert_eq!(api.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn file_url_encodes_query() {
        let api = WorkflowServerApi::new("http://127.0.0.1:8000");
        let url = api
            .file_url("out 1.png", "video", Some("/opt/Comfy UI"))
            .unwrap();
        assert_eq!(
            url,
            "http://127.0.0.1:8000/comfyui-file?filename=out+1.png&subfolder=video&comfyui_path=%2Fopt%2FComfy+UI"
        );
    }

    #[test]
    fn file_url_rejects_bad_base() {
        let api = WorkflowServerApi::new("not a url");
        assert!(matches!(
            api.file_url("a.png", "", None),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
