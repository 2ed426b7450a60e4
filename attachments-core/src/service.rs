//! HTTP client for the remote processing service.
//!
//! - `POST {base}/process`: multipart `file` plus string form fields.
//! - `POST {base}/unpack`: JSON `{url, ...options}`, answers `{files: [{filename, data_b64}]}`.
//! - `GET {base}/health`: status and feature map.
//!
//! Requests carry `Authorization: Bearer <api key>`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::config::Config;
use crate::contract::{RemoteService, UnpackedEntry};
use crate::error::ServiceError;
use crate::options::ProcessOptions;
use crate::sanitize::sanitize_member_name;

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// [`RemoteService`] over `reqwest`.
#[derive(Clone)]
pub struct HttpService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct UnpackResponse {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    filename: String,
    data_b64: String,
}

impl HttpService {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.service_url.clone(),
            config.api_key.clone(),
            config.service_timeout(),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorised(&self, request: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        let key = self.api_key.as_deref().ok_or(ServiceError::MissingApiKey)?;
        Ok(request.bearer_auth(key).timeout(self.timeout))
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(self.timeout.as_secs())
        } else {
            ServiceError::Request(e.to_string())
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        if status < 400 {
            return Ok(response);
        }
        let message = match status {
            401 => "Invalid API key".to_string(),
            402 => "API quota exceeded".to_string(),
            413 => "File too large for service".to_string(),
            _ => {
                let body = response.text().await.unwrap_or_default();
                let detail = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| v.get("error").map(|e| match e {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }))
                    .unwrap_or(body);
                format!("Service error: {detail}")
            }
        };
        warn!(status, message = %message, "Service returned error status");
        Err(ServiceError::Status { status, message })
    }
}

#[async_trait]
impl RemoteService for HttpService {
    async fn process(
        &self,
        data: Bytes,
        filename: &str,
        options: &ProcessOptions,
    ) -> Result<Artifact, ServiceError> {
        let mut form = Form::new().part(
            "file",
            Part::bytes(data.to_vec()).file_name(filename.to_string()),
        );
        for (key, value) in options.to_form_fields() {
            form = form.text(key, value);
        }

        info!(filename = filename, url = %self.endpoint("process"), "Processing via service");
        let request = self.authorised(self.client.post(self.endpoint("process")))?;
        let response = self.send(request.multipart(form)).await?;
        let artifact: Artifact = response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        debug!(filename = filename, chars = artifact.text.len(), "Service processed file");
        Ok(artifact)
    }

    async fn unpack(
        &self,
        input: &str,
        options: &ProcessOptions,
    ) -> Result<Vec<UnpackedEntry>, ServiceError> {
        let mut body = serde_json::Map::new();
        for (key, value) in options.iter() {
            body.insert(key.to_string(), value.clone());
        }
        body.insert("url".to_string(), Value::String(input.to_string()));

        info!(input = input, "Unpacking via service");
        let request = self.authorised(self.client.post(self.endpoint("unpack")))?;
        let response = self.send(request.json(&body)).await?;
        let payload: UnpackResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;

        payload
            .files
            .into_iter()
            .map(|file| {
                let data = STANDARD
                    .decode(file.data_b64.as_bytes())
                    .map_err(|e| ServiceError::Decode(format!("{}: {e}", file.filename)))?;
                let name = sanitize_member_name(&file.filename);
                let name = if name.is_empty() { "blob".to_string() } else { name };
                Ok(UnpackedEntry::new(name, data))
            })
            .collect()
    }

    async fn health(&self) -> Value {
        let mut request = self.client.get(self.endpoint("health")).timeout(HEALTH_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let result: Result<Value, String> = async {
            let response = request
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("HTTP {}", status.as_u16()));
            }
            response.json::<Value>().await.map_err(|e| e.to_string())
        }
        .await;

        result.unwrap_or_else(|error| {
            warn!(error = %error, "Service health check failed");
            json!({"status": "error", "error": error})
        })
    }
}
