use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::browser::TabHost;
use super::message::{CompletionNotice, RelayMessage, RelayResponse, TabId};
use super::session::{AnalysisSession, RelayPhase, SessionTable};
use crate::config::RelayConfig;

/// Background-side coordinator for in-flight analyses.
///
/// Owns the URL-keyed session table. Every handler takes the table lock for
/// one complete update and never holds it across a browser call, so
/// concurrent messages for different URLs stay independent.
pub struct Relay<H: TabHost> {
    host: Arc<H>,
    sessions: Arc<Mutex<SessionTable>>,
    config: RelayConfig,
}

impl<H: TabHost> Clone for Relay<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            sessions: Arc::clone(&self.sessions),
            config: self.config.clone(),
        }
    }
}

impl<H: TabHost + 'static> Relay<H> {
    pub fn new(host: H, config: RelayConfig) -> Self {
        Self::with_host(Arc::new(host), config)
    }

    pub fn with_host(host: Arc<H>, config: RelayConfig) -> Self {
        Self {
            host,
            sessions: Arc::new(Mutex::new(SessionTable::new())),
            config,
        }
    }

    /// Handle one bus message. Always produces a response.
    pub async fn handle(&self, message: RelayMessage, sender_tab: Option<TabId>) -> RelayResponse {
        debug!(kind = message.kind(), sender_tab = ?sender_tab, "Relay message");
        match message {
            RelayMessage::StartAnalysis {
                video_id,
                video_url,
                analysis_url,
            } => {
                self.start_analysis(video_id, video_url, analysis_url, sender_tab)
                    .await
            }
            RelayMessage::AnalysisDone {
                video_url,
                result_url,
                timestamp,
            } => self.analysis_done(video_url, result_url, timestamp).await,
            RelayMessage::FocusAnalysisTab { tab_id } => self.focus_tab(tab_id).await,
            RelayMessage::GetAnalysisStatus { video_url } => {
                RelayResponse::ok().with_status(self.phase(&video_url).await)
            }
            other @ (RelayMessage::AnalysisComplete { .. }
            | RelayMessage::DownloadReady { .. }
            | RelayMessage::DownloadError { .. }) => {
                warn!(kind = other.kind(), "Relay does not accept this message");
                RelayResponse::failure(format!("Unsupported message: {}", other.kind()))
            }
        }
    }

    async fn start_analysis(
        &self,
        video_id: String,
        video_url: String,
        analysis_url: String,
        origin_tab_id: Option<TabId>,
    ) -> RelayResponse {
        let session = AnalysisSession::new(video_id, video_url.clone(), origin_tab_id, Utc::now());
        let generation = self.sessions.lock().await.insert(session);
        info!(video_url = %video_url, origin_tab_id = ?origin_tab_id, "Analysis requested");

        self.sessions
            .lock()
            .await
            .set_phase(&video_url, generation, RelayPhase::TabOpening);
        match self.host.create_tab(&analysis_url, false).await {
            Ok(tab) => {
                let recorded = self
                    .sessions
                    .lock()
                    .await
                    .record_tab(&video_url, generation, tab.id);
                info!(
                    video_url = %video_url,
                    tab_id = tab.id,
                    recorded,
                    "Analysis tab opened"
                );
                RelayResponse::ok()
                    .with_tab(tab.id)
                    .with_message("Analysis started")
            }
            Err(e) => {
                error!(video_url = %video_url, error = %e, "Could not open analysis tab");
                self.sessions
                    .lock()
                    .await
                    .remove_generation(&video_url, generation);
                RelayResponse::failure(e.to_string())
            }
        }
    }

    async fn analysis_done(
        &self,
        video_url: String,
        result_url: String,
        timestamp: i64,
    ) -> RelayResponse {
        let Some(session) = self.sessions.lock().await.remove(&video_url) else {
            info!(video_url = %video_url, "Completion for unknown analysis");
            return RelayResponse::failure("Analysis not found");
        };

        let notice = RelayMessage::AnalysisComplete {
            data: CompletionNotice {
                video_url: video_url.clone(),
                result_url,
                timestamp,
                analysis_tab_id: session.analysis_tab_id,
            },
        };
        let delivered = self.broadcast(&notice).await;
        info!(video_url = %video_url, delivered, "Analysis completion relayed");

        RelayResponse::ok().with_message("Notification sent")
    }

    /// Send to every host tab; one failed tab does not stop the others.
    async fn broadcast(&self, message: &RelayMessage) -> usize {
        let tabs = match self.host.query_tabs(&self.config.host_url_pattern).await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!(pattern = %self.config.host_url_pattern, error = %e, "Tab query failed");
                return 0;
            }
        };

        let results = join_all(tabs.iter().map(|tab| self.host.send_to_tab(tab.id, message))).await;

        let mut delivered = 0;
        for (tab, result) in tabs.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(tab_id = tab.id, error = %e, "Delivery to tab failed"),
            }
        }
        delivered
    }

    async fn focus_tab(&self, tab_id: TabId) -> RelayResponse {
        match self.host.activate_tab(tab_id).await {
            Ok(Some(tab)) => {
                if let Err(e) = self.host.focus_window(tab.window_id).await {
                    warn!(tab_id, window_id = tab.window_id, error = %e, "Window focus failed");
                }
                debug!(tab_id, "Analysis tab focused");
                RelayResponse::ok()
            }
            Ok(None) => {
                info!(tab_id, "Tab to focus not found");
                RelayResponse::failure("Tab not found")
            }
            Err(e) => {
                warn!(tab_id, error = %e, "Tab activation failed");
                RelayResponse::failure(e.to_string())
            }
        }
    }

    pub async fn phase(&self, video_url: &str) -> RelayPhase {
        self.sessions.lock().await.phase(video_url)
    }

    pub async fn session(&self, video_url: &str) -> Option<AnalysisSession> {
        self.sessions.lock().await.get(video_url).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Expire sessions as of `now`, returning how many were removed
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = ChronoDuration::milliseconds(self.config.session_ttl_ms as i64);
        let expired = self.sessions.lock().await.sweep(now, ttl);
        for url in &expired {
            info!(video_url = %url, "Expired stale analysis");
        }
        expired.len()
    }

    /// Run the expiry sweep on the configured interval until aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let relay = self.clone();
        let period = Duration::from_millis(self.config.sweep_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                relay.sweep_at(Utc::now()).await;
            }
        })
    }
}
