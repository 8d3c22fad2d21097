use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::state::{
    ArgumentGraphPatch, Candidate, Conclusion, ExtractSummaryPatch, Stage, TranscriptPatch,
    Verification, VideoDataPatch,
};
use super::store::{lock_store, SharedStore, WorkflowStore};
use crate::error::{TransportError, TransportResult};
use crate::transport::{wire, Channel, InboundEvent};

/// Backend event decoded into the store operation it drives.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    VideoInfo(VideoDataPatch),
    Transcript(TranscriptPatch),
    Extract(ExtractPayload),
    Candidates(Vec<Candidate>),
    Verification {
        candidate_id: String,
        verification: Verification,
    },
    Conclusion(Conclusion),
    Complete,
    Error(String),
    /// Not part of the analysis workflow
    Other(String),
}

/// Body of an `extract` event. Each part is applied only when present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractPayload {
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub argument_graph: Option<ArgumentGraphPatch>,
    #[serde(default)]
    pub summary: Option<ExtractSummaryPatch>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CandidatesPayload {
    Bare(Vec<Candidate>),
    Wrapped {
        #[serde(default)]
        candidates: Option<Vec<Candidate>>,
    },
}

#[derive(Deserialize)]
struct VerificationPayload {
    #[serde(rename = "candidateId", alias = "candidate_id")]
    candidate_id: String,
    verification: Verification,
}

impl WorkflowEvent {
    /// Decode the payload of an inbound event by its name.
    ///
    /// A missing or null payload reads as an empty object.
    pub fn from_inbound(event: &InboundEvent) -> TransportResult<Self> {
        let decoded = match event.name.as_str() {
            wire::VIDEO_INFO | wire::INFO => WorkflowEvent::VideoInfo(payload(event)?),
            wire::TRANSCRIPT | wire::TRANSCRIPTION => WorkflowEvent::Transcript(payload(event)?),
            wire::EXTRACT => WorkflowEvent::Extract(payload(event)?),
            wire::CANDIDATES => {
                let candidates = match payload::<CandidatesPayload>(event)? {
                    CandidatesPayload::Bare(list) => list,
                    CandidatesPayload::Wrapped { candidates } => candidates.unwrap_or_default(),
                };
                WorkflowEvent::Candidates(candidates)
            }
            wire::VERIFICATION => {
                let body: VerificationPayload = payload(event)?;
                WorkflowEvent::Verification {
                    candidate_id: body.candidate_id,
                    verification: body.verification,
                }
            }
            wire::CONCLUSION => WorkflowEvent::Conclusion(payload(event)?),
            wire::COMPLETE => WorkflowEvent::Complete,
            wire::ERROR => WorkflowEvent::Error(
                event
                    .error_message()
                    .unwrap_or_else(|| "Unknown backend error".to_string()),
            ),
            other => WorkflowEvent::Other(other.to_string()),
        };
        Ok(decoded)
    }
}

fn payload<T: DeserializeOwned>(event: &InboundEvent) -> TransportResult<T> {
    let data = match &event.data {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(data).map_err(|e| TransportError::Protocol {
        message: format!("{} payload: {}", event.name, e),
    })
}

/// What applying one event did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum WiringOutcome {
    Applied { stage: Stage },
    /// `complete` received; nothing stored
    Completed,
    /// Backend or transport failure; nothing stored
    Failed(String),
    /// Payload could not be decoded; nothing stored
    Malformed { event: String, message: String },
    Ignored,
}

impl WiringOutcome {
    /// Whether the analysis has reached an end state
    pub fn is_final(&self) -> bool {
        matches!(self, WiringOutcome::Completed | WiringOutcome::Failed(_))
    }
}

/// Applies backend events to a [`WorkflowStore`].
///
/// The store accepts any transition. This layer only ever moves forward
/// through `LOADING -> INFO -> EXTRACT -> CLASSIFY -> CONCLUDE`; a late event
/// for an earlier stage still updates its data but leaves the stage alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventWiring;

/// Event names routed into the store by [`EventWiring::register`].
pub const WIRED_EVENTS: [&str; 10] = [
    wire::VIDEO_INFO,
    wire::INFO,
    wire::TRANSCRIPT,
    wire::TRANSCRIPTION,
    wire::EXTRACT,
    wire::CANDIDATES,
    wire::VERIFICATION,
    wire::CONCLUSION,
    wire::COMPLETE,
    wire::ERROR,
];

impl EventWiring {
    pub fn apply(store: &mut WorkflowStore, event: &InboundEvent) -> WiringOutcome {
        match WorkflowEvent::from_inbound(event) {
            Ok(decoded) => Self::apply_event(store, decoded),
            Err(e) => {
                warn!(event = %event.name, error = %e, "Dropping malformed event");
                WiringOutcome::Malformed {
                    event: event.name.clone(),
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn apply_event(store: &mut WorkflowStore, event: WorkflowEvent) -> WiringOutcome {
        match event {
            WorkflowEvent::VideoInfo(patch) => {
                store.update_video_data(patch);
                Self::advance(store, Stage::Info)
            }
            WorkflowEvent::Transcript(patch) => {
                store.update_transcript(patch);
                Self::advance(store, Stage::Extract)
            }
            WorkflowEvent::Extract(extract) => {
                if let Some(text) = extract.full_text {
                    store.update_transcript(TranscriptPatch {
                        text: Some(text),
                        timeline: None,
                    });
                }
                if let Some(graph) = extract.argument_graph {
                    store.update_argument_graph(graph);
                }
                if let Some(summary) = extract.summary {
                    store.update_extract_summary(summary);
                }
                Self::advance(store, Stage::Extract)
            }
            WorkflowEvent::Candidates(candidates) => {
                debug!(count = candidates.len(), "Candidates received");
                store.set_candidates(candidates);
                Self::advance(store, Stage::Classify)
            }
            WorkflowEvent::Verification {
                candidate_id,
                verification,
            } => {
                if store.state().candidate(&candidate_id).is_none() {
                    debug!(candidate_id = %candidate_id, "Verification for unknown candidate");
                }
                store.add_verification(candidate_id, verification);
                WiringOutcome::Applied {
                    stage: store.stage(),
                }
            }
            WorkflowEvent::Conclusion(conclusion) => {
                store.set_conclusion(conclusion);
                Self::advance(store, Stage::Conclude)
            }
            WorkflowEvent::Complete => {
                info!(stage = %store.stage(), "Analysis complete");
                WiringOutcome::Completed
            }
            WorkflowEvent::Error(message) => {
                error!(stage = %store.stage(), error = %message, "Analysis failed");
                WiringOutcome::Failed(message)
            }
            WorkflowEvent::Other(name) => {
                debug!(event = %name, "Event not wired to the store");
                WiringOutcome::Ignored
            }
        }
    }

    fn advance(store: &mut WorkflowStore, target: Stage) -> WiringOutcome {
        if target > store.stage() {
            debug!(from = %store.stage(), to = %target, "Advancing stage");
            store.move_to_step(target);
        }
        WiringOutcome::Applied {
            stage: store.stage(),
        }
    }

    /// Route the channel's workflow events into `store`.
    ///
    /// Each outcome is forwarded on `outcomes`; a closed receiver is ignored.
    pub fn register(
        channel: &Channel,
        store: SharedStore,
        outcomes: mpsc::UnboundedSender<WiringOutcome>,
    ) {
        for name in WIRED_EVENTS {
            let store = SharedStore::clone(&store);
            let outcomes = outcomes.clone();
            channel.on(name, move |event| {
                let outcome = Self::apply(&mut lock_store(&store), event);
                let _ = outcomes.send(outcome);
            });
        }
    }
}
