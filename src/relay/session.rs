use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::message::TabId;

/// Where a video's analysis stands on the relay side.
///
/// Completion and expiry delete the session, so both read back as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayPhase {
    None,
    Requested,
    TabOpening,
    TabOpen,
}

impl RelayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayPhase::None => "none",
            RelayPhase::Requested => "requested",
            RelayPhase::TabOpening => "tab_opening",
            RelayPhase::TabOpen => "tab_open",
        }
    }
}

impl std::fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bookkeeping for one in-flight analysis, keyed by video URL.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSession {
    /// Changes on every restart of the same URL
    pub generation: Uuid,
    pub video_id: String,
    pub video_url: String,
    pub start_time: DateTime<Utc>,
    pub origin_tab_id: Option<TabId>,
    pub analysis_tab_id: Option<TabId>,
    pub phase: RelayPhase,
}

impl AnalysisSession {
    pub fn new(
        video_id: impl Into<String>,
        video_url: impl Into<String>,
        origin_tab_id: Option<TabId>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            generation: Uuid::new_v4(),
            video_id: video_id.into(),
            video_url: video_url.into(),
            start_time,
            origin_tab_id,
            analysis_tab_id: None,
            phase: RelayPhase::Requested,
        }
    }

    /// Whether the session has outlived `ttl` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.start_time > ttl
    }
}

/// At most one session per video URL. Every method is a complete update.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, AnalysisSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any session for the same URL. Returns the generation.
    pub fn insert(&mut self, session: AnalysisSession) -> Uuid {
        let generation = session.generation;
        if let Some(previous) = self.sessions.insert(session.video_url.clone(), session) {
            info!(
                video_url = %previous.video_url,
                previous_phase = %previous.phase,
                "Replaced in-flight analysis"
            );
        }
        generation
    }

    /// Move a session to `phase` if it is still the given generation
    pub fn set_phase(&mut self, video_url: &str, generation: Uuid, phase: RelayPhase) -> bool {
        match self.current(video_url, generation) {
            Some(session) => {
                session.phase = phase;
                true
            }
            None => false,
        }
    }

    /// Record the analysis tab unless the session was replaced or removed meanwhile.
    pub fn record_tab(&mut self, video_url: &str, generation: Uuid, tab_id: TabId) -> bool {
        match self.current(video_url, generation) {
            Some(session) => {
                session.analysis_tab_id = Some(tab_id);
                session.phase = RelayPhase::TabOpen;
                true
            }
            None => {
                debug!(video_url = %video_url, tab_id, "Tab opened for a superseded session");
                false
            }
        }
    }

    /// Remove the session only if it is still the given generation
    pub fn remove_generation(&mut self, video_url: &str, generation: Uuid) -> bool {
        if self.current(video_url, generation).is_some() {
            self.sessions.remove(video_url);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, video_url: &str) -> Option<AnalysisSession> {
        self.sessions.remove(video_url)
    }

    pub fn get(&self, video_url: &str) -> Option<&AnalysisSession> {
        self.sessions.get(video_url)
    }

    pub fn phase(&self, video_url: &str) -> RelayPhase {
        self.sessions
            .get(video_url)
            .map(|s| s.phase)
            .unwrap_or(RelayPhase::None)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session older than `ttl`, whatever its phase.
    pub fn sweep(&mut self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.is_expired(now, ttl))
            .map(|s| s.video_url.clone())
            .collect();
        for url in &expired {
            self.sessions.remove(url);
        }
        expired
    }

    fn current(&mut self, video_url: &str, generation: Uuid) -> Option<&mut AnalysisSession> {
        self.sessions
            .get_mut(video_url)
            .filter(|s| s.generation == generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.youtube.com/shorts/abc123";

    fn ttl() -> Duration {
        Duration::milliseconds(600_000)
    }

    #[test]
    fn test_sweep_uses_strict_ttl() {
        let now = Utc::now();
        let mut table = SessionTable::new();
        table.insert(AnalysisSession::new(
            "old",
            "https://www.youtube.com/shorts/old",
            Some(1),
            now - Duration::milliseconds(700_000),
        ));
        table.insert(AnalysisSession::new(
            "new",
            "https://www.youtube.com/shorts/new",
            Some(1),
            now - Duration::milliseconds(100_000),
        ));
        table.insert(AnalysisSession::new(
            "edge",
            "https://www.youtube.com/shorts/edge",
            Some(1),
            now - ttl(),
        ));

        let removed = table.sweep(now, ttl());
        assert_eq!(removed, vec!["https://www.youtube.com/shorts/old".to_string()]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_restart_replaces_and_stale_tab_is_ignored() {
        let now = Utc::now();
        let mut table = SessionTable::new();
        let first = table.insert(AnalysisSession::new("abc123", URL, Some(1), now));
        let second = table.insert(AnalysisSession::new("abc123", URL, Some(2), now));
        assert_eq!(table.len(), 1);

        assert!(table.record_tab(URL, second, 20));
        assert!(!table.record_tab(URL, first, 10));

        let session = table.get(URL).unwrap();
        assert_eq!(session.analysis_tab_id, Some(20));
        assert_eq!(session.origin_tab_id, Some(2));
        assert_eq!(session.phase, RelayPhase::TabOpen);
    }

    #[test]
    fn test_phase_of_missing_session_is_none() {
        let mut table = SessionTable::new();
        assert_eq!(table.phase(URL), RelayPhase::None);
        let generation = table.insert(AnalysisSession::new("abc123", URL, None, Utc::now()));
        assert_eq!(table.phase(URL), RelayPhase::Requested);
        assert!(table.set_phase(URL, generation, RelayPhase::TabOpening));
        assert_eq!(table.phase(URL), RelayPhase::TabOpening);
    }

    #[test]
    fn test_remove_generation_only_matches_current() {
        let mut table = SessionTable::new();
        let first = table.insert(AnalysisSession::new("abc123", URL, None, Utc::now()));
        let _second = table.insert(AnalysisSession::new("abc123", URL, None, Utc::now()));
        assert!(!table.remove_generation(URL, first));
        assert_eq!(table.len(), 1);
    }
}
