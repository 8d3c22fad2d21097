use serde::{Deserialize, Serialize};

/// Body of `POST /api/youtube/download`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
}

/// Response of `POST /api/youtube/download`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub download_info: Option<DownloadInfo>,
}

/// Details of the downloaded audio file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadInfo {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u64>,
    /// Size in bytes
    #[serde(default)]
    pub filesize: Option<u64>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// First frame sent on the stage-tagged analysis channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub file_path: String,
    pub language: String,
}

impl DownloadRequest {
    /// Create a download request for a video URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl DownloadResponse {
    /// Path of the downloaded file.
    ///
    /// The top-level `file_path` wins; `download_info.file_path` is the
    /// fallback. Empty strings count as absent.
    pub fn resolved_file_path(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| {
                self.download_info
                    .as_ref()
                    .and_then(|info| info.file_path.as_deref())
                    .filter(|p| !p.is_empty())
            })
    }
}

impl HealthStatus {
    /// Whether the backend reports itself as live
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

impl AnalysisRequest {
    pub fn new(file_path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
        }
    }
}
