use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::relay::{CompletionNotice, ExtensionBus, RelayMessage, TabId};

/// Where the notification box is drawn.
pub trait NotificationSurface: Send + Sync {
    fn show(&self, id: u64, notice: &CompletionNotice);
    fn remove(&self, id: u64);
    /// Open a URL in a new tab
    fn open_url(&self, url: &str);
}

/// What "view result" did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    FocusedTab(TabId),
    OpenedUrl(String),
    /// No notification on screen
    Nothing,
}

#[derive(Debug, Clone)]
struct Shown {
    id: u64,
    notice: CompletionNotice,
}

/// At most one completion box on screen, replaced by newer completions and
/// removed after a fixed delay unless dismissed first.
pub struct NotificationCenter<S: NotificationSurface, B: ExtensionBus> {
    surface: Arc<S>,
    bus: Arc<B>,
    dismiss_after: Duration,
    current: Arc<Mutex<Option<Shown>>>,
    next_id: Arc<AtomicU64>,
}

impl<S: NotificationSurface, B: ExtensionBus> Clone for NotificationCenter<S, B> {
    fn clone(&self) -> Self {
        Self {
            surface: Arc::clone(&self.surface),
            bus: Arc::clone(&self.bus),
            dismiss_after: self.dismiss_after,
            current: Arc::clone(&self.current),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<S: NotificationSurface + 'static, B: ExtensionBus + 'static> NotificationCenter<S, B> {
    pub fn new(surface: Arc<S>, bus: Arc<B>, dismiss_after: Duration) -> Self {
        Self {
            surface,
            bus,
            dismiss_after,
            current: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Show a box for `notice`, replacing any visible one. Returns its id.
    pub fn show(&self, notice: CompletionNotice) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let previous = self.lock_current().replace(Shown {
            id,
            notice: notice.clone(),
        });
        if let Some(previous) = previous {
            self.surface.remove(previous.id);
        }
        self.surface.show(id, &notice);
        debug!(id, video_url = %notice.video_url, "Completion notification shown");

        let center = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(center.dismiss_after).await;
            center.dismiss(id);
        });
        id
    }

    /// Remove box `id` if it is still the visible one
    pub fn dismiss(&self, id: u64) -> bool {
        let mut current = self.lock_current();
        if current.as_ref().map(|s| s.id) != Some(id) {
            return false;
        }
        *current = None;
        drop(current);
        self.surface.remove(id);
        true
    }

    /// User closed the visible box
    pub fn close(&self) -> bool {
        let id = self.lock_current().as_ref().map(|s| s.id);
        id.map(|id| self.dismiss(id)).unwrap_or(false)
    }

    /// Focus the analysis tab if known, otherwise open the result page.
    pub async fn view_result(&self) -> ViewAction {
        let Some(shown) = self.lock_current().clone() else {
            return ViewAction::Nothing;
        };

        match shown.notice.analysis_tab_id {
            Some(tab_id) => {
                match self
                    .bus
                    .send(RelayMessage::FocusAnalysisTab { tab_id })
                    .await
                {
                    Ok(response) if !response.success => {
                        warn!(tab_id, "Analysis tab could not be focused")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(tab_id, error = %e, "Focus request failed"),
                }
                self.dismiss(shown.id);
                ViewAction::FocusedTab(tab_id)
            }
            None => {
                self.surface.open_url(&shown.notice.result_url);
                ViewAction::OpenedUrl(shown.notice.result_url)
            }
        }
    }

    pub fn visible(&self) -> Option<CompletionNotice> {
        self.lock_current().as_ref().map(|s| s.notice.clone())
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Shown>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}
