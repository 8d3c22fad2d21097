use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::launcher::watch_url;

/// Marker element whose presence means the controls already exist
pub const REDIRECT_BUTTON_ID: &str = "redirect-btn";

pub const IDLE_LABEL: &str = "Analyze";
pub const ANALYZING_LABEL: &str = "Analyzing...";
pub const FAILED_LABEL: &str = "Analysis failed";

/// Trigger control state on the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Idle,
    Analyzing,
    Complete,
    Error,
}

/// Result of [`StatusController::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The page has no place for controls yet; retry later
    NoContainer,
    Created,
    /// Controls existed; only link targets were updated
    Refreshed,
}

/// DOM operations the controller performs on the host page.
pub trait HostPage: Send + Sync {
    fn current_url(&self) -> String;
    fn container_present(&self) -> bool;
    fn has_element(&self, id: &str) -> bool;
    /// Create the redirect link, the trigger button and the status line
    fn create_controls(&self, watch_url: &str);
    fn set_redirect_href(&self, href: &str);
    fn set_trigger(&self, label: &str, enabled: bool);
    fn show_status(&self, message: &str);
    fn hide_status(&self);
}

/// Drives the host page controls through `idle -> analyzing -> complete | error`.
pub struct StatusController<H: HostPage> {
    page: Arc<H>,
    status: Arc<Mutex<AnalysisStatus>>,
    // Bumped on every transition so a stale error reset does nothing
    epoch: Arc<AtomicU64>,
    error_reset: Duration,
}

impl<H: HostPage> Clone for StatusController<H> {
    fn clone(&self) -> Self {
        Self {
            page: Arc::clone(&self.page),
            status: Arc::clone(&self.status),
            epoch: Arc::clone(&self.epoch),
            error_reset: self.error_reset,
        }
    }
}

impl<H: HostPage + 'static> StatusController<H> {
    pub fn new(page: Arc<H>, error_reset: Duration) -> Self {
        Self {
            page,
            status: Arc::new(Mutex::new(AnalysisStatus::Idle)),
            epoch: Arc::new(AtomicU64::new(0)),
            error_reset,
        }
    }

    /// Create the controls once; later calls only refresh link targets.
    pub fn initialize(&self) -> InitOutcome {
        if !self.page.container_present() {
            debug!("Control container not found");
            return InitOutcome::NoContainer;
        }
        if self.page.has_element(REDIRECT_BUTTON_ID) {
            self.refresh_links();
            return InitOutcome::Refreshed;
        }
        self.page.create_controls(&watch_url(&self.page.current_url()));
        info!("Host page controls created");
        InitOutcome::Created
    }

    /// Point the redirect link at the current video
    pub fn refresh_links(&self) {
        let href = watch_url(&self.page.current_url());
        debug!(href = %href, "Updating redirect link");
        self.page.set_redirect_href(&href);
    }

    pub fn status(&self) -> AnalysisStatus {
        *self.lock_status()
    }

    pub fn set_analyzing(&self) {
        self.transition(AnalysisStatus::Analyzing);
        self.page.set_trigger(ANALYZING_LABEL, false);
        self.page.show_status("Analyzing in the background...");
    }

    /// Show the failure, then return to idle after the reset delay.
    pub fn set_error(&self) {
        let epoch = self.transition(AnalysisStatus::Error);
        self.page.set_trigger(FAILED_LABEL, false);
        self.page.show_status("An error occurred during analysis.");

        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(controller.error_reset).await;
            if controller.epoch.load(Ordering::SeqCst) == epoch {
                controller.reset();
            }
        });
    }

    /// Completion arrived through the relay broadcast
    pub fn set_complete(&self) {
        self.transition(AnalysisStatus::Complete);
        self.reset_controls();
    }

    /// Back to idle with the trigger enabled
    pub fn reset(&self) {
        self.transition(AnalysisStatus::Idle);
        self.reset_controls();
    }

    fn reset_controls(&self) {
        self.page.set_trigger(IDLE_LABEL, true);
        self.page.hide_status();
    }

    fn transition(&self, next: AnalysisStatus) -> u64 {
        let mut status = self.lock_status();
        debug!(from = ?*status, to = ?next, "Control status");
        *status = next;
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock_status(&self) -> MutexGuard<'_, AnalysisStatus> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakePage {
        url: String,
        container: bool,
        log: Mutex<Vec<String>>,
    }

    impl FakePage {
        fn on(url: &str) -> Arc<Self> {
            Arc::new(Self {
                url: url.to_string(),
                container: true,
                log: Mutex::new(Vec::new()),
            })
        }

        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn record(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    impl HostPage for FakePage {
        fn current_url(&self) -> String {
            self.url.clone()
        }

        fn container_present(&self) -> bool {
            self.container
        }

        fn has_element(&self, id: &str) -> bool {
            id == REDIRECT_BUTTON_ID && self.entries().iter().any(|e| e.starts_with("create"))
        }

        fn create_controls(&self, watch_url: &str) {
            self.record(format!("create {}", watch_url));
        }

        fn set_redirect_href(&self, href: &str) {
            self.record(format!("href {}", href));
        }

        fn set_trigger(&self, label: &str, enabled: bool) {
            self.record(format!("trigger {} {}", label, enabled));
        }

        fn show_status(&self, message: &str) {
            self.record(format!("status {}", message));
        }

        fn hide_status(&self) {
            self.record("status hidden".to_string());
        }
    }

    const SHORTS: &str = "https://www.youtube.com/shorts/abc123";

    #[test]
    fn test_double_initialization_only_refreshes() {
        let page = FakePage::on(SHORTS);
        let controller = StatusController::new(Arc::clone(&page), Duration::from_secs(2));

        assert_eq!(controller.initialize(), InitOutcome::Created);
        assert_eq!(controller.initialize(), InitOutcome::Refreshed);

        let entries = page.entries();
        assert_eq!(
            entries.iter().filter(|e| e.starts_with("create")).count(),
            1
        );
        assert_eq!(
            entries.last().map(String::as_str),
            Some("href https://www.youtube.com/watch?v=abc123")
        );
    }

    #[test]
    fn test_missing_container() {
        let page = Arc::new(FakePage::default());
        let controller = StatusController::new(page, Duration::from_secs(2));
        assert_eq!(controller.initialize(), InitOutcome::NoContainer);
    }

    #[tokio::test]
    async fn test_analyzing_disables_trigger() {
        let page = FakePage::on(SHORTS);
        let controller = StatusController::new(Arc::clone(&page), Duration::from_secs(2));
        controller.set_analyzing();
        assert_eq!(controller.status(), AnalysisStatus::Analyzing);
        assert!(page.entries().contains(&"trigger Analyzing... false".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_resets_to_idle_after_delay() {
        let page = FakePage::on(SHORTS);
        let controller = StatusController::new(Arc::clone(&page), Duration::from_secs(2));
        controller.set_error();
        assert_eq!(controller.status(), AnalysisStatus::Error);

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(controller.status(), AnalysisStatus::Error);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(controller.status(), AnalysisStatus::Idle);
        assert_eq!(page.entries().last().map(String::as_str), Some("status hidden"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_error_reset_is_ignored() {
        let page = FakePage::on(SHORTS);
        let controller = StatusController::new(page, Duration::from_secs(2));
        controller.set_error();
        controller.set_analyzing();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(controller.status(), AnalysisStatus::Analyzing);
    }

    #[tokio::test]
    async fn test_complete_resets_controls() {
        let page = FakePage::on(SHORTS);
        let controller = StatusController::new(Arc::clone(&page), Duration::from_secs(2));
        controller.set_analyzing();
        controller.set_complete();
        assert_eq!(controller.status(), AnalysisStatus::Complete);
        assert!(page.entries().contains(&"trigger Analyze true".to_string()));
    }
}
