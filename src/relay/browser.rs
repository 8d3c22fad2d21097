use async_trait::async_trait;

use super::message::{RelayMessage, TabId, WindowId};
use crate::error::RelayResult;

/// A browser tab as the relay sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    pub url: Option<String>,
}

impl Tab {
    pub fn new(id: TabId, window_id: WindowId) -> Self {
        Self {
            id,
            window_id,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Tab and window operations the relay needs from the browser.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Open a tab at `url`, in the background unless `active`
    async fn create_tab(&self, url: &str, active: bool) -> RelayResult<Tab>;

    /// Tabs whose URL matches a match pattern such as `*://www.youtube.com/*`
    async fn query_tabs(&self, url_pattern: &str) -> RelayResult<Vec<Tab>>;

    async fn send_to_tab(&self, tab_id: TabId, message: &RelayMessage) -> RelayResult<()>;

    /// Make a tab active. `None` when no such tab exists.
    async fn activate_tab(&self, tab_id: TabId) -> RelayResult<Option<Tab>>;

    async fn focus_window(&self, window_id: WindowId) -> RelayResult<()>;
}

/// Match a URL against a browser match pattern where `*` spans any run of
/// characters (`*://www.youtube.com/*`).
pub fn matches_pattern(pattern: &str, url: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return url.is_empty(),
    };
    let Some(mut remaining) = url.strip_prefix(first) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}
