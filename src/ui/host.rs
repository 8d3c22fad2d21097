use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::controller::{HostPage, InitOutcome, StatusController};
use super::launcher::AnalysisLauncher;
use super::notification::{NotificationCenter, NotificationSurface};
use crate::config::{RelayConfig, UiConfig};
use crate::error::AppResult;
use crate::relay::{ExtensionBus, RelayMessage, RelayResponse};

/// Everything the content script runs on one host tab, wired explicitly.
pub struct HostTab<B, H, S>
where
    B: ExtensionBus,
    H: HostPage,
    S: NotificationSurface,
{
    launcher: AnalysisLauncher<B, H>,
    notifications: NotificationCenter<S, B>,
}

impl<B, H, S> HostTab<B, H, S>
where
    B: ExtensionBus + 'static,
    H: HostPage + 'static,
    S: NotificationSurface + 'static,
{
    pub fn new(
        bus: Arc<B>,
        page: Arc<H>,
        surface: Arc<S>,
        ui: &UiConfig,
        relay: &RelayConfig,
    ) -> Self {
        let controller = StatusController::new(page, Duration::from_millis(ui.error_reset_ms));
        let notifications = NotificationCenter::new(
            surface,
            Arc::clone(&bus),
            Duration::from_millis(ui.notification_dismiss_ms),
        );
        Self {
            launcher: AnalysisLauncher::new(bus, controller, relay.analysis_site_url.clone()),
            notifications,
        }
    }

    pub fn initialize(&self) -> InitOutcome {
        self.launcher.controller().initialize()
    }

    /// The page navigated to another video
    pub fn on_navigation(&self) {
        self.launcher.controller().refresh_links();
    }

    /// Trigger control clicked
    pub async fn on_trigger(&self, video_url: &str) -> AppResult<RelayResponse> {
        self.launcher.start_analysis(video_url).await
    }

    /// Message pushed to this tab by the relay
    pub fn on_message(&self, message: RelayMessage) -> RelayResponse {
        match message {
            RelayMessage::AnalysisComplete { data } => {
                self.launcher.on_analysis_complete(&data);
                self.notifications.show(data);
                RelayResponse::ok()
            }
            other => {
                debug!(kind = other.kind(), "Message not handled on host tab");
                RelayResponse::ok()
            }
        }
    }

    pub fn launcher(&self) -> &AnalysisLauncher<B, H> {
        &self.launcher
    }

    pub fn notifications(&self) -> &NotificationCenter<S, B> {
        &self.notifications
    }
}
