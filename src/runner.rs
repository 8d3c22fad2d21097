//! End-to-end analysis of one video, as the analysis page runs it.

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{AnalysisRequest, BackendClient, HealthStatus};
use crate::config::{Config, TransportVariant};
use crate::error::{AppError, AppResult, TransportError};
use crate::transport::{wire, Channel, ChannelState};
use crate::workflow::{
    lock_store, EventWiring, SharedStore, Stage, VideoDataPatch, WiringOutcome, WorkflowState,
    WorkflowStore,
};

/// Drives the backend and the workflow store for one analysis at a time.
pub struct AnalysisRunner {
    config: Config,
    backend: BackendClient,
}

impl AnalysisRunner {
    pub fn new(config: Config) -> AppResult<Self> {
        let backend = BackendClient::new(&config.backend, config.request.clone())?;
        Ok(Self { config, backend })
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub async fn health(&self) -> AppResult<HealthStatus> {
        Ok(self.backend.health().await?)
    }

    /// Analyze `video_url` and return the final workflow state.
    ///
    /// Stage-tagged: download the video, then stream the analysis of the
    /// downloaded file until `complete`, a failure, or the backend closing
    /// after a terminal stage. Event-tagged: request the analysis and stream
    /// until the conclusion arrives.
    pub async fn run(
        &self,
        video_url: &str,
        variant: TransportVariant,
    ) -> AppResult<WorkflowState> {
        let store = WorkflowStore::shared();
        lock_store(&store).update_video_data(VideoDataPatch {
            url: Some(video_url.to_string()),
            ..VideoDataPatch::default()
        });

        let (url, request) = match variant {
            TransportVariant::StageTagged => {
                let file_path = self.backend.download_video(video_url).await?;
                info!(video_url = %video_url, file_path = %file_path, "Video downloaded");
                let request = AnalysisRequest::new(file_path, self.config.backend.language.clone());
                (self.config.backend.analyze_ws_url(), json!(request))
            }
            TransportVariant::EventTagged => (
                self.config.backend.socket_url.clone(),
                wire::event_frame(wire::REQUEST_ANALYSIS, &json!({})),
            ),
        };
        let (channel, mut outcomes) = self.open(url, variant, &store);

        channel.open().await?;
        channel.request(&request);

        let result = drive(&channel, &mut outcomes, variant).await;
        channel.close();
        result?;

        let state = lock_store(&store).snapshot();
        info!(video_url = %video_url, stage = %state.stage, "Analysis finished");
        Ok(state)
    }

    fn open(
        &self,
        url: String,
        variant: TransportVariant,
        store: &SharedStore,
    ) -> (Channel, mpsc::UnboundedReceiver<WiringOutcome>) {
        let channel = Channel::new(url, variant, self.config.transport.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        EventWiring::register(&channel, SharedStore::clone(store), tx);
        channel.on(wire::CONNECT, |_| debug!("Analysis channel connected"));
        channel.on(wire::DISCONNECT, |event| {
            debug!(reason = %event.data, "Analysis channel disconnected")
        });
        (channel, rx)
    }
}

async fn drive(
    channel: &Channel,
    outcomes: &mut mpsc::UnboundedReceiver<WiringOutcome>,
    variant: TransportVariant,
) -> AppResult<()> {
    loop {
        tokio::select! {
            outcome = outcomes.recv() => match outcome {
                Some(outcome) => {
                    if let Some(done) = settle(outcome, variant) {
                        return done;
                    }
                }
                None => {
                    return Err(AppError::Internal {
                        message: "workflow outcome stream ended".to_string(),
                    })
                }
            },
            state = channel.closed() => {
                // Handlers ran before the state changed; collect what they sent
                while let Ok(outcome) = outcomes.try_recv() {
                    if let Some(done) = settle(outcome, variant) {
                        return done;
                    }
                }
                return match state {
                    ChannelState::Closed => Ok(()),
                    other => Err(TransportError::Dropped {
                        message: format!("channel ended in state {:?}", other),
                    }
                    .into()),
                };
            }
        }
    }
}

/// `Some` once an outcome ends the analysis.
fn settle(outcome: WiringOutcome, variant: TransportVariant) -> Option<AppResult<()>> {
    match outcome {
        WiringOutcome::Completed => Some(Ok(())),
        WiringOutcome::Failed(message) => Some(Err(TransportError::Remote { message }.into())),
        WiringOutcome::Applied {
            stage: Stage::Conclude,
        } if variant == TransportVariant::EventTagged => Some(Ok(())),
        WiringOutcome::Applied { stage } => {
            debug!(stage = %stage, "Workflow advanced");
            None
        }
        WiringOutcome::Malformed { event, message } => {
            warn!(event = %event, error = %message, "Skipped malformed event");
            None
        }
        WiringOutcome::Ignored => None,
    }
}
