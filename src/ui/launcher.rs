use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};
use url::Url;

use super::controller::{HostPage, StatusController};
use crate::error::{AppResult, RelayError, ValidationError};
use crate::relay::{CompletionNotice, ExtensionBus, RelayMessage, RelayResponse};

/// Video id from a `/shorts/<id>` or `watch?v=<id>` URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    if let Some((_, rest)) = url.split_once("/shorts/") {
        let id = rest.split('?').next().unwrap_or_default();
        return (!id.is_empty()).then(|| id.to_string());
    }
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

/// Regular player URL for a shorts URL; other URLs come back unchanged.
pub fn watch_url(url: &str) -> String {
    url.replacen("shorts/", "watch?v=", 1)
}

/// Analysis page URL carrying the video as the `videoUrl` query parameter.
pub fn analysis_url(site_url: &str, video_url: &str) -> Result<String, ValidationError> {
    let mut url = Url::parse(site_url).map_err(|e| ValidationError::InvalidUrl {
        url: site_url.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut().append_pair("videoUrl", video_url);
    Ok(url.into())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub video_id: String,
    pub video_url: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result_url: Option<String>,
}

/// Starts analyses from the host page and keeps the history of finished ones.
pub struct AnalysisLauncher<B: ExtensionBus, H: HostPage> {
    bus: Arc<B>,
    controller: StatusController<H>,
    site_url: String,
    current: Mutex<Option<AnalysisRecord>>,
    history: Mutex<Vec<AnalysisRecord>>,
}

impl<B: ExtensionBus, H: HostPage + 'static> AnalysisLauncher<B, H> {
    pub fn new(bus: Arc<B>, controller: StatusController<H>, site_url: impl Into<String>) -> Self {
        Self {
            bus,
            controller,
            site_url: site_url.into(),
            current: Mutex::new(None),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn controller(&self) -> &StatusController<H> {
        &self.controller
    }

    /// Ask the relay to open an analysis tab for `video_url`.
    ///
    /// Refused while another analysis runs. A URL without a video id fails
    /// locally without touching the relay.
    pub async fn start_analysis(&self, video_url: &str) -> AppResult<RelayResponse> {
        if self.is_analyzing() {
            warn!(video_url = %video_url, "Analysis already in progress");
            return Err(ValidationError::AlreadyAnalyzing.into());
        }

        let Some(video_id) = extract_video_id(video_url) else {
            warn!(video_url = %video_url, "No video id in URL");
            return Err(ValidationError::VideoId {
                url: video_url.to_string(),
            }
            .into());
        };
        let analysis_url = analysis_url(&self.site_url, video_url)?;

        *self.lock_current() = Some(AnalysisRecord {
            video_id: video_id.clone(),
            video_url: video_url.to_string(),
            start_time: Utc::now(),
            end_time: None,
            result_url: None,
        });
        info!(video_id = %video_id, video_url = %video_url, "Starting analysis");

        let sent = self
            .bus
            .send(RelayMessage::StartAnalysis {
                video_id,
                video_url: video_url.to_string(),
                analysis_url,
            })
            .await;

        let failure = match sent {
            Ok(response) if response.success => {
                self.controller.set_analyzing();
                return Ok(response);
            }
            Ok(response) => RelayError::Rejected {
                message: response
                    .message
                    .unwrap_or_else(|| "no reason given".to_string()),
            },
            Err(e) => e,
        };

        error!(video_url = %video_url, error = %failure, "Analysis did not start");
        self.lock_current().take();
        self.controller.set_error();
        Err(failure.into())
    }

    /// Record a completion broadcast and reset the controls.
    pub fn on_analysis_complete(&self, notice: &CompletionNotice) {
        if let Some(mut record) = self.lock_current().take() {
            record.end_time = Some(Utc::now());
            record.result_url = Some(notice.result_url.clone());
            info!(video_url = %record.video_url, "Analysis finished");
            self.history
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(record);
        }
        self.controller.set_complete();
    }

    pub fn is_analyzing(&self) -> bool {
        self.lock_current().is_some()
    }

    pub fn history(&self) -> Vec<AnalysisRecord> {
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<AnalysisRecord>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/abc123?feature=share").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=xyz789&t=10").as_deref(),
            Some("xyz789")
        );
        assert_eq!(extract_video_id("https://www.youtube.com/shorts/"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/feed"), None);
        assert_eq!(extract_video_id("garbage"), None);
    }

    #[test]
    fn test_watch_url() {
        assert_eq!(
            watch_url("https://www.youtube.com/shorts/abc123"),
            "https://www.youtube.com/watch?v=abc123"
        );
        assert_eq!(
            watch_url("https://www.youtube.com/watch?v=1"),
            "https://www.youtube.com/watch?v=1"
        );
    }

    #[test]
    fn test_analysis_url_encodes_video_url() {
        let url = analysis_url(
            "http://localhost:5173",
            "https://www.youtube.com/shorts/abc123",
        )
        .unwrap();
        assert_eq!(
            url,
            "http://localhost:5173/?videoUrl=https%3A%2F%2Fwww.youtube.com%2Fshorts%2Fabc123"
        );
        assert_eq!(
            crate::detector::analysis_target(&url).as_deref(),
            Some("https://www.youtube.com/shorts/abc123")
        );
    }

    #[test]
    fn test_analysis_url_rejects_bad_site() {
        let err = analysis_url("not a url", "https://www.youtube.com/shorts/a").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl { .. }));
    }
}
