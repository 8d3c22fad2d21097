use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::page::{analysis_complete, completion_marker_present, MutationRecord, PageProbe};
use crate::config::DetectorConfig;
use crate::relay::{ExtensionBus, RelayMessage};

/// Which mechanism saw completion first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    Mutation,
    Poll,
    InitialCheck,
    Manual,
}

impl CompletionSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionSignal::Mutation => "mutation",
            CompletionSignal::Poll => "poll",
            CompletionSignal::InitialCheck => "initial_check",
            CompletionSignal::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorOutcome {
    Completed(CompletionSignal),
    /// Ceiling reached without completion
    TimedOut,
    /// Another detector for this page already reported
    AlreadyFired,
}

/// Fires a manual completion (the page's test button).
#[derive(Debug, Clone)]
pub struct ManualTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTrigger {
    /// Returns false once the detector has stopped
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Watches the analysis page and reports completion to the relay once.
///
/// Mutation batches, a fixed poll, a one-shot initial check and manual
/// triggers race inside one task. The first to see completion sends
/// `ANALYSIS_DONE` and stops the rest; the ceiling stops everything without
/// reporting.
pub struct CompletionDetector<P: PageProbe, B: ExtensionBus> {
    probe: Arc<P>,
    bus: Arc<B>,
    config: DetectorConfig,
    video_url: String,
    result_url: String,
    fired: Arc<AtomicBool>,
    manual_tx: mpsc::UnboundedSender<()>,
    manual_rx: mpsc::UnboundedReceiver<()>,
}

impl<P: PageProbe, B: ExtensionBus> CompletionDetector<P, B> {
    pub fn new(
        probe: Arc<P>,
        bus: Arc<B>,
        config: DetectorConfig,
        video_url: impl Into<String>,
        result_url: impl Into<String>,
    ) -> Self {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        Self {
            probe,
            bus,
            config,
            video_url: video_url.into(),
            result_url: result_url.into(),
            fired: Arc::new(AtomicBool::new(false)),
            manual_tx,
            manual_rx,
        }
    }

    /// Detector for a page URL carrying `?videoUrl=`; `None` without one.
    pub fn for_page(
        probe: Arc<P>,
        bus: Arc<B>,
        config: DetectorConfig,
        page_url: &str,
    ) -> Option<Self> {
        let video_url = analysis_target(page_url)?;
        Some(Self::new(probe, bus, config, video_url, page_url))
    }

    /// Share the single-fire flag with another detector on the same page
    pub fn with_fired_flag(mut self, fired: Arc<AtomicBool>) -> Self {
        self.fired = fired;
        self
    }

    pub fn manual_trigger(&self) -> ManualTrigger {
        ManualTrigger {
            tx: self.manual_tx.clone(),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Race the completion signals until one fires or the ceiling passes.
    ///
    /// Dropping `mutations`' sender only stops the observer branch.
    pub async fn run(
        mut self,
        mut mutations: mpsc::UnboundedReceiver<Vec<MutationRecord>>,
    ) -> DetectorOutcome {
        let poll_every = Duration::from_millis(self.config.poll_interval_ms);
        let mut poll = interval_at(Instant::now() + poll_every, poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ceiling = sleep(Duration::from_millis(self.config.ceiling_ms));
        tokio::pin!(ceiling);
        let initial = sleep(Duration::from_millis(self.config.initial_check_ms));
        tokio::pin!(initial);

        let mut observing = true;
        let mut initial_pending = true;

        info!(video_url = %self.video_url, "Watching for analysis completion");

        let signal = loop {
            tokio::select! {
                _ = &mut ceiling => {
                    info!(
                        video_url = %self.video_url,
                        ceiling_ms = self.config.ceiling_ms,
                        "Completion watch reached its ceiling"
                    );
                    return DetectorOutcome::TimedOut;
                }
                batch = mutations.recv(), if observing => match batch {
                    Some(records) => {
                        if records.iter().any(MutationRecord::is_observed)
                            && completion_marker_present(self.probe.as_ref())
                        {
                            break CompletionSignal::Mutation;
                        }
                    }
                    None => {
                        debug!("Mutation source closed");
                        observing = false;
                    }
                },
                _ = poll.tick() => {
                    if analysis_complete(self.probe.as_ref()) {
                        break CompletionSignal::Poll;
                    }
                }
                _ = &mut initial, if initial_pending => {
                    initial_pending = false;
                    if analysis_complete(self.probe.as_ref()) {
                        break CompletionSignal::InitialCheck;
                    }
                }
                Some(()) = self.manual_rx.recv() => break CompletionSignal::Manual,
            }
        };

        // Observer and poll end with this scope
        drop(mutations);
        self.fire(signal).await
    }

    async fn fire(&self, signal: CompletionSignal) -> DetectorOutcome {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!(signal = signal.as_str(), "Completion already reported");
            return DetectorOutcome::AlreadyFired;
        }

        info!(
            video_url = %self.video_url,
            signal = signal.as_str(),
            "Analysis completion detected"
        );

        let notice = RelayMessage::AnalysisDone {
            video_url: self.video_url.clone(),
            result_url: self.result_url.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };
        match self.bus.send(notice).await {
            Ok(response) if response.success => debug!("Relay acknowledged completion"),
            Ok(response) => warn!(message = ?response.message, "Relay rejected completion"),
            Err(e) => warn!(error = %e, "Completion notice not delivered"),
        }

        DetectorOutcome::Completed(signal)
    }
}

/// The `videoUrl` query parameter of an analysis page URL
pub fn analysis_target(page_url: &str) -> Option<String> {
    let url = url::Url::parse(page_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "videoUrl")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
