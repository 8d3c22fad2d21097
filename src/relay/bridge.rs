use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::browser::TabHost;
use super::message::{RelayMessage, RelayResponse, TabId};
use super::service::Relay;
use crate::error::RelayResult;

/// Page asks the extension for the relay phase of a video
pub const REQUEST_ANALYSIS_STATUS: &str = "REQUEST_ANALYSIS_STATUS";
/// Bridge answer to [`REQUEST_ANALYSIS_STATUS`]
pub const ANALYSIS_STATUS_RESPONSE: &str = "ANALYSIS_STATUS_RESPONSE";

/// Extension-side message bus as seen from a content script.
#[async_trait]
pub trait ExtensionBus: Send + Sync {
    async fn send(&self, message: RelayMessage) -> RelayResult<RelayResponse>;
}

/// Window messaging of the page the content script runs in.
pub trait PagePort: Send + Sync {
    fn post(&self, message: Value);
}

/// Origin of a window message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// Posted by the page's own window
    SameWindow,
    /// Frames, other windows, extensions
    Foreign,
}

/// Relay in the same process, addressed as a bus by one sender tab.
pub struct LocalBus<H: TabHost> {
    relay: Relay<H>,
    sender_tab: Option<TabId>,
}

impl<H: TabHost + 'static> LocalBus<H> {
    pub fn new(relay: Relay<H>, sender_tab: Option<TabId>) -> Self {
        Self { relay, sender_tab }
    }
}

#[async_trait]
impl<H: TabHost + 'static> ExtensionBus for LocalBus<H> {
    async fn send(&self, message: RelayMessage) -> RelayResult<RelayResponse> {
        Ok(self.relay.handle(message, self.sender_tab).await)
    }
}

/// Content-script bridge between the analysis page and the extension bus.
pub struct PageBridge<B: ExtensionBus, P: PagePort> {
    bus: Arc<B>,
    page: P,
}

impl<B: ExtensionBus, P: PagePort> PageBridge<B, P> {
    pub fn new(bus: Arc<B>, page: P) -> Self {
        Self { bus, page }
    }

    /// Handle a window message. Returns true if it was acted on.
    ///
    /// Only messages the page posted to itself are considered.
    pub async fn on_page_message(&self, source: MessageSource, message: &Value) -> bool {
        if source != MessageSource::SameWindow {
            debug!("Ignoring message from a foreign window");
            return false;
        }

        match message.get("type").and_then(Value::as_str) {
            Some(REQUEST_ANALYSIS_STATUS) => {
                let response = match requested_video_url(message) {
                    Some(video_url) => self.query_status(video_url).await,
                    None => RelayResponse::failure("Missing videoUrl"),
                };
                self.page.post(json!({
                    "type": ANALYSIS_STATUS_RESPONSE,
                    "data": response,
                }));
                true
            }
            _ => false,
        }
    }

    /// Handle a message pushed by the extension. Download notices go to the page.
    pub fn on_extension_message(&self, message: &RelayMessage) -> bool {
        match message {
            RelayMessage::DownloadReady { .. } | RelayMessage::DownloadError { .. } => {
                match serde_json::to_value(message) {
                    Ok(value) => {
                        debug!(kind = message.kind(), "Forwarding to page");
                        self.page.post(value);
                        true
                    }
                    Err(e) => {
                        warn!(kind = message.kind(), error = %e, "Could not encode message");
                        false
                    }
                }
            }
            _ => false,
        }
    }

    async fn query_status(&self, video_url: String) -> RelayResponse {
        match self
            .bus
            .send(RelayMessage::GetAnalysisStatus { video_url })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Status query failed");
                RelayResponse::failure(e.to_string())
            }
        }
    }
}

fn requested_video_url(message: &Value) -> Option<String> {
    message
        .get("videoUrl")
        .or_else(|| message.get("data").and_then(|d| d.get("videoUrl")))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}
