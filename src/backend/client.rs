use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{DownloadRequest, DownloadResponse, HealthStatus};
use crate::config::{BackendConfig, RequestConfig};
use crate::error::{BackendError, BackendResult};

/// Client for the analysis backend's HTTP endpoints
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    request_config: RequestConfig,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: &BackendConfig, request_config: RequestConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_config,
        })
    }

    /// Download the audio of a video and return the server-side file path
    pub async fn download_video(&self, video_url: &str) -> BackendResult<String> {
        let url = format!("{}/api/youtube/download", self.base_url);
        let request = DownloadRequest::new(video_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    video_url = %video_url,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying video download"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.post_download(&url, &request).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    let Some(path) = response.resolved_file_path() else {
                        return Err(BackendError::InvalidResponse {
                            message: "Download response carried no file path".to_string(),
                        });
                    };
                    info!(
                        video_url = %video_url,
                        file_path = %path,
                        latency_ms = latency.as_millis(),
                        "Video download succeeded"
                    );
                    return Ok(path.to_string());
                }
                // The server answered; repeating the same request will not help
                Err(e @ (BackendError::Api { .. } | BackendError::InvalidResponse { .. })) => {
                    error!(video_url = %video_url, error = %e, "Video download rejected");
                    return Err(e);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        video_url = %video_url,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Video download failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(BackendError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Probe the backend liveness endpoint
    pub async fn health(&self) -> BackendResult<HealthStatus> {
        let url = format!("{}/health", self.base_url);
        debug!(url = %url, "Checking backend health");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Self::parse_json(response).await
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_download(
        &self,
        url: &str,
        request: &DownloadRequest,
    ) -> BackendResult<DownloadResponse> {
        debug!(video_url = %request.url, "Requesting video download");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Self::parse_json(response).await
    }

    fn classify(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout {
                timeout_ms: self.request_config.timeout_ms,
            }
        } else {
            BackendError::Http(e)
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> BackendResult<T> {
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}
