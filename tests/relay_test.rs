//! Integration tests for the background relay
//!
//! Drives the relay through its message handler against an in-memory browser.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use factray_relay::config::RelayConfig;
use factray_relay::error::{RelayError, RelayResult};
use factray_relay::relay::{
    matches_pattern, LocalBus, MessageSource, PageBridge, PagePort, Relay, RelayMessage,
    RelayPhase, Tab, TabHost, TabId, WindowId, ANALYSIS_STATUS_RESPONSE,
    REQUEST_ANALYSIS_STATUS,
};

const URL: &str = "https://www.youtube.com/shorts/abc123";
const RESULT_URL: &str = "http://localhost:5173/?videoUrl=abc123";

/// In-memory browser: a tab list, a delivery log and injectable failures.
#[derive(Default)]
struct FakeBrowser {
    tabs: Mutex<Vec<Tab>>,
    next_id: AtomicI64,
    create_delay: Option<Duration>,
    fail_create: bool,
    unreachable: Mutex<HashSet<TabId>>,
    delivered: Mutex<Vec<(TabId, RelayMessage)>>,
    focused_windows: Mutex<Vec<WindowId>>,
    // Relay whose phase for `URL` is recorded each time a tab is created
    observer: OnceLock<Relay<FakeBrowser>>,
    phases_at_create: Mutex<Vec<RelayPhase>>,
}

impl FakeBrowser {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    fn with_tab(self, id: TabId, window_id: WindowId, url: &str) -> Self {
        self.tabs.lock().unwrap().push(Tab::new(id, window_id).with_url(url));
        self
    }

    fn delivered_to(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self
            .delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl TabHost for FakeBrowser {
    async fn create_tab(&self, url: &str, _active: bool) -> RelayResult<Tab> {
        if let Some(relay) = self.observer.get() {
            let phase = relay.phase(URL).await;
            self.phases_at_create.lock().unwrap().push(phase);
        }
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create {
            return Err(RelayError::TabCreation {
                message: "tabs permission missing".to_string(),
            });
        }
        let tab = Tab::new(self.next_id.fetch_add(1, Ordering::SeqCst), 1).with_url(url);
        self.tabs.lock().unwrap().push(tab.clone());
        Ok(tab)
    }

    async fn query_tabs(&self, url_pattern: &str) -> RelayResult<Vec<Tab>> {
        Ok(self
            .tabs
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.url.as_deref().is_some_and(|u| matches_pattern(url_pattern, u)))
            .cloned()
            .collect())
    }

    async fn send_to_tab(&self, tab_id: TabId, message: &RelayMessage) -> RelayResult<()> {
        if self.unreachable.lock().unwrap().contains(&tab_id) {
            return Err(RelayError::Delivery {
                tab_id,
                message: "Receiving end does not exist".to_string(),
            });
        }
        self.delivered.lock().unwrap().push((tab_id, message.clone()));
        Ok(())
    }

    async fn activate_tab(&self, tab_id: TabId) -> RelayResult<Option<Tab>> {
        Ok(self.tabs.lock().unwrap().iter().find(|t| t.id == tab_id).cloned())
    }

    async fn focus_window(&self, window_id: WindowId) -> RelayResult<()> {
        self.focused_windows.lock().unwrap().push(window_id);
        Ok(())
    }
}

fn start(url: &str) -> RelayMessage {
    RelayMessage::StartAnalysis {
        video_id: "abc123".to_string(),
        video_url: url.to_string(),
        analysis_url: RESULT_URL.to_string(),
    }
}

fn done(url: &str) -> RelayMessage {
    RelayMessage::AnalysisDone {
        video_url: url.to_string(),
        result_url: RESULT_URL.to_string(),
        timestamp: 1_700_000_000_000,
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_start_then_status() {
        let relay = Relay::new(FakeBrowser::new(), RelayConfig::default());

        let response = relay.handle(start(URL), Some(7)).await;
        assert!(response.success);
        assert_eq!(response.tab_id, Some(100));
        assert_eq!(response.message.as_deref(), Some("Analysis started"));

        let status = relay
            .handle(
                RelayMessage::GetAnalysisStatus {
                    video_url: URL.to_string(),
                },
                None,
            )
            .await;
        assert_eq!(status.status, Some(RelayPhase::TabOpen));

        let unknown = relay
            .handle(
                RelayMessage::GetAnalysisStatus {
                    video_url: "https://www.youtube.com/shorts/other".to_string(),
                },
                None,
            )
            .await;
        assert!(unknown.success);
        assert_eq!(unknown.status, Some(RelayPhase::None));
    }

    #[tokio::test]
    async fn test_tab_opening_while_tab_is_created() {
        let browser = Arc::new(FakeBrowser::new());
        let relay = Relay::with_host(Arc::clone(&browser), RelayConfig::default());
        assert!(browser.observer.set(relay.clone()).is_ok());

        assert_eq!(relay.phase(URL).await, RelayPhase::None);
        assert!(relay.handle(start(URL), Some(7)).await.success);

        assert_eq!(*browser.phases_at_create.lock().unwrap(), vec![RelayPhase::TabOpening]);
        assert_eq!(relay.phase(URL).await, RelayPhase::TabOpen);
    }

    #[tokio::test]
    async fn test_tab_creation_failure_leaves_no_session() {
        let browser = FakeBrowser {
            fail_create: true,
            ..FakeBrowser::new()
        };
        let relay = Relay::new(browser, RelayConfig::default());

        let response = relay.handle(start(URL), Some(7)).await;
        assert!(!response.success);
        assert!(response.message.unwrap().contains("tabs permission missing"));
        assert_eq!(relay.session_count().await, 0);
        assert_eq!(relay.phase(URL).await, RelayPhase::None);
    }

    #[tokio::test]
    async fn test_one_session_per_url() {
        let browser = FakeBrowser {
            create_delay: Some(Duration::from_millis(20)),
            ..FakeBrowser::new()
        };
        let relay = Relay::new(browser, RelayConfig::default());

        let (first, second) = tokio::join!(
            relay.handle(start(URL), Some(1)),
            relay.handle(start(URL), Some(2))
        );
        assert!(first.success && second.success);
        assert_eq!(relay.session_count().await, 1);

        let session = relay.session(URL).await.unwrap();
        assert_eq!(session.phase, RelayPhase::TabOpen);
        // The surviving entry belongs to the later request
        assert_eq!(session.origin_tab_id, Some(2));
        assert_eq!(session.analysis_tab_id, second.tab_id);
    }

    #[tokio::test]
    async fn test_sweep_honours_ttl() {
        let relay = Relay::new(FakeBrowser::new(), RelayConfig::default());
        relay.handle(start(URL), None).await;
        let started = relay.session(URL).await.unwrap().start_time;

        assert_eq!(relay.sweep_at(started + ChronoDuration::milliseconds(100_000)).await, 0);
        assert_eq!(relay.phase(URL).await, RelayPhase::TabOpen);

        assert_eq!(relay.sweep_at(started + ChronoDuration::milliseconds(700_000)).await, 1);
        assert_eq!(relay.phase(URL).await, RelayPhase::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_runs_on_interval() {
        let config = RelayConfig {
            session_ttl_ms: 0,
            sweep_interval_ms: 1_000,
            ..RelayConfig::default()
        };
        let relay = Relay::new(FakeBrowser::new(), config);
        relay.handle(start(URL), None).await;

        let sweeper = relay.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(relay.session_count().await, 1);

        // Any real time elapsed since start exceeds a zero TTL
        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert_eq!(relay.session_count().await, 0);
        sweeper.abort();
    }
}

#[cfg(test)]
mod completion_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_completion_fans_out_to_host_tabs() {
        let browser = FakeBrowser::new()
            .with_tab(1, 1, "https://www.youtube.com/shorts/abc123")
            .with_tab(2, 1, "https://www.youtube.com/watch?v=zzz")
            .with_tab(3, 2, "https://www.youtube.com/feed/subscriptions")
            .with_tab(4, 2, "https://example.com/");
        browser.unreachable.lock().unwrap().insert(2);
        let browser = Arc::new(browser);
        let relay = Relay::with_host(Arc::clone(&browser), RelayConfig::default());

        let started = relay.handle(start(URL), Some(1)).await;
        let response = relay.handle(done(URL), started.tab_id).await;

        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("Notification sent"));
        assert_eq!(browser.delivered_to(), vec![1, 3]);
        assert_eq!(relay.phase(URL).await, RelayPhase::None);

        let (_, message) = browser.delivered.lock().unwrap()[0].clone();
        match message {
            RelayMessage::AnalysisComplete { data } => {
                assert_eq!(data.video_url, URL);
                assert_eq!(data.result_url, RESULT_URL);
                assert_eq!(data.timestamp, 1_700_000_000_000);
                assert_eq!(data.analysis_tab_id, started.tab_id);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completion_for_unknown_video() {
        let browser = Arc::new(FakeBrowser::new().with_tab(1, 1, URL));
        let relay = Relay::with_host(Arc::clone(&browser), RelayConfig::default());

        let response = relay.handle(done(URL), None).await;
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Analysis not found"));
        assert!(browser.delivered_to().is_empty());
    }

    #[tokio::test]
    async fn test_second_completion_is_not_found() {
        let relay = Relay::new(FakeBrowser::new(), RelayConfig::default());
        relay.handle(start(URL), None).await;

        assert!(relay.handle(done(URL), None).await.success);
        assert!(!relay.handle(done(URL), None).await.success);
    }

    #[tokio::test]
    async fn test_focus_analysis_tab() {
        let browser = Arc::new(FakeBrowser::new().with_tab(9, 4, RESULT_URL));
        let relay = Relay::with_host(Arc::clone(&browser), RelayConfig::default());

        let response = relay
            .handle(RelayMessage::FocusAnalysisTab { tab_id: 9 }, None)
            .await;
        assert!(response.success);
        assert_eq!(*browser.focused_windows.lock().unwrap(), vec![4]);

        let missing = relay
            .handle(RelayMessage::FocusAnalysisTab { tab_id: 10 }, None)
            .await;
        assert!(!missing.success);
        assert_eq!(missing.message.as_deref(), Some("Tab not found"));
    }

    #[tokio::test]
    async fn test_outbound_only_messages_are_refused() {
        let relay = Relay::new(FakeBrowser::new(), RelayConfig::default());
        let response = relay
            .handle(RelayMessage::DownloadReady { data: json!({}) }, None)
            .await;
        assert!(!response.success);
    }
}

#[cfg(test)]
mod bridge_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default, Clone)]
    struct RecordingPage {
        posted: Arc<Mutex<Vec<Value>>>,
    }

    impl PagePort for RecordingPage {
        fn post(&self, message: Value) {
            self.posted.lock().unwrap().push(message);
        }
    }

    #[tokio::test]
    async fn test_page_status_query_through_relay() {
        let relay = Relay::new(FakeBrowser::new(), RelayConfig::default());
        relay.handle(start(URL), Some(1)).await;

        let page = RecordingPage::default();
        let bridge = PageBridge::new(Arc::new(LocalBus::new(relay, Some(100))), page.clone());

        let handled = bridge
            .on_page_message(
                MessageSource::SameWindow,
                &json!({"type": REQUEST_ANALYSIS_STATUS, "videoUrl": URL}),
            )
            .await;
        assert!(handled);

        let ignored = bridge
            .on_page_message(
                MessageSource::Foreign,
                &json!({"type": REQUEST_ANALYSIS_STATUS, "videoUrl": URL}),
            )
            .await;
        assert!(!ignored);

        let posted = page.posted.lock().unwrap().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["type"], ANALYSIS_STATUS_RESPONSE);
        assert_eq!(posted[0]["data"]["success"], true);
        assert_eq!(posted[0]["data"]["status"], "tab_open");
    }
}
