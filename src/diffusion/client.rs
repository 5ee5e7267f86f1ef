use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::diffusion::request::GenerationRequest;
use crate::error::{StyleError, StyleResult};
use crate::utils::timing::log_generation_timing;

pub const IMG2IMG_PATH: &str = "sdapi/v1/img2img";
const DATA_URI_PREFIX: &str = "data:image/png;base64,";
const ERROR_BODY_LOG_LIMIT: usize = 500;

/// Image ready for a display surface: `data:image/png;base64,...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri(String);

impl DataUri {
    pub fn from_base64(payload: &str) -> Self {
        DataUri(format!("{DATA_URI_PREFIX}{payload}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base64 text exactly as the service returned it.
    pub fn payload(&self) -> &str {
        self.as_str()
            .strip_prefix(DATA_URI_PREFIX)
            .unwrap_or(self.as_str())
    }

    pub fn decode_bytes(&self) -> StyleResult<Vec<u8>> {
        general_purpose::STANDARD
            .decode(self.payload())
            .map_err(|err| StyleError::Decode(format!("image payload is not base64: {err}")))
    }
}

#[derive(Debug, Deserialize)]
struct Img2ImgResponse {
    images: Option<Vec<String>>,
    #[serde(default)]
    parameters: Option<Value>,
}

/// Parses a service response body into data URIs, leaving the image text untouched.
pub fn decode_response(body: &str) -> StyleResult<Vec<DataUri>> {
    let parsed: Img2ImgResponse = serde_json::from_str(body)?;
    if let Some(parameters) = parsed.parameters.as_ref() {
        debug!("img2img response parameters: {}", parameters);
    }
    let images = parsed
        .images
        .ok_or_else(|| StyleError::Decode("response has no 'images' field".to_string()))?;
    Ok(images
        .iter()
        .map(|image| DataUri::from_base64(image))
        .collect())
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// One-shot client for the img2img endpoint. Holds no per-call state, so a
/// single instance may serve concurrent submissions.
#[derive(Debug, Clone)]
pub struct DiffusionClient {
    http: Client,
    endpoint: Url,
}

impl DiffusionClient {
    /// `timeout` of `None` lets a generation run as long as the service needs.
    pub fn new(base_url: &Url, timeout: Option<Duration>) -> StyleResult<Self> {
        let endpoint = base_url
            .join(IMG2IMG_PATH)
            .map_err(|err| StyleError::InvalidArgument(format!("bad service URL: {err}")))?;
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| StyleError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(DiffusionClient { http, endpoint })
    }

    pub fn from_config(config: &Config) -> StyleResult<Self> {
        Self::new(&config.sd_api_url, config.sd_timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Performs exactly one request/response exchange. Retrying is up to the caller.
    pub async fn submit(&self, request: &GenerationRequest) -> StyleResult<Vec<DataUri>> {
        let metadata = json!({
            "steps": request.steps,
            "resolution": request.resolution,
            "n_iter": request.n_iter,
            "batch_size": request.batch_size,
        });
        log_generation_timing(self.endpoint.as_str(), &request.model, Some(metadata), || {
            self.exchange(request)
        })
        .await
    }

    async fn exchange(&self, request: &GenerationRequest) -> StyleResult<Vec<DataUri>> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request.payload())
            .send()
            .await
            .map_err(|err| StyleError::Transport(format!("img2img request failed: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| StyleError::Transport(format!("failed to read img2img response: {err}")))?;

        if !status.is_success() {
            warn!(
                "img2img request failed with status {}: {}",
                status,
                truncate_for_log(&body, ERROR_BODY_LOG_LIMIT)
            );
            return Err(StyleError::Transport(format!(
                "img2img request failed with status {}: {}",
                status,
                truncate_for_log(&body, ERROR_BODY_LOG_LIMIT)
            )));
        }

        let images = decode_response(&body)?;
        debug!("img2img returned {} image(s)", images.len());
        Ok(images)
    }
}
