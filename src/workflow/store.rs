use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::state::{
    ArgumentGraphPatch, Candidate, Conclusion, ExtractSummaryPatch, Stage, TranscriptPatch,
    Verification, VideoDataPatch, WorkflowState,
};

/// Single source of truth for one analysis page.
///
/// State changes only through the named update operations. The store does
/// not police stage ordering: [`WorkflowStore::move_to_step`] accepts any
/// stage, and keeping transitions forward is the job of
/// [`crate::workflow::EventWiring`].
#[derive(Debug, Default)]
pub struct WorkflowStore {
    state: WorkflowState,
}

/// Store handle shared between channel handlers and the page.
pub type SharedStore = Arc<Mutex<WorkflowStore>>;

impl WorkflowStore {
    /// Create a store with empty defaults at [`Stage::Loading`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh store for sharing
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Current state (read-only)
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Owned copy of the current state
    pub fn snapshot(&self) -> WorkflowState {
        self.state.clone()
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn move_to_step(&mut self, stage: Stage) {
        if stage < self.state.stage {
            debug!(from = %self.state.stage, to = %stage, "Stage moved backwards");
        }
        self.state.stage = stage;
    }

    pub fn update_video_data(&mut self, patch: VideoDataPatch) {
        let video = &mut self.state.video_data;
        if let Some(title) = patch.title {
            video.title = title;
        }
        if let Some(thumbnail) = patch.thumbnail {
            video.thumbnail = thumbnail;
        }
        if let Some(url) = patch.url {
            video.url = url;
        }
    }

    pub fn update_transcript(&mut self, patch: TranscriptPatch) {
        let transcript = &mut self.state.transcript;
        if let Some(text) = patch.text {
            transcript.text = text;
        }
        if let Some(timeline) = patch.timeline {
            transcript.timeline = timeline;
        }
    }

    /// Replace the candidate list. Later duplicates of an id are dropped.
    pub fn set_candidates(&mut self, candidates: Vec<Candidate>) {
        let mut seen = std::collections::HashSet::new();
        let total = candidates.len();
        let unique: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .collect();
        if unique.len() != total {
            warn!(
                received = total,
                kept = unique.len(),
                "Dropped candidates with duplicate ids"
            );
        }
        self.state.candidates = unique;
    }

    /// Record a verification; re-adding an id replaces the earlier one.
    pub fn add_verification(
        &mut self,
        candidate_id: impl Into<String>,
        verification: Verification,
    ) {
        self.state
            .verifications
            .insert(candidate_id.into(), verification);
    }

    pub fn set_conclusion(&mut self, conclusion: Conclusion) {
        self.state.conclusion = conclusion;
    }

    /// Merge graph fields, then drop edges left pointing at unknown nodes.
    pub fn update_argument_graph(&mut self, patch: ArgumentGraphPatch) {
        let graph = &mut self.state.argument_graph;
        if let Some(nodes) = patch.nodes {
            graph.nodes = nodes;
        }
        if let Some(edges) = patch.edges {
            graph.edges = edges;
        }
        let pruned = graph.prune_dangling_edges();
        if pruned > 0 {
            warn!(pruned, "Dropped argument graph edges with unknown endpoints");
        }
    }

    pub fn update_extract_summary(&mut self, patch: ExtractSummaryPatch) {
        let summary = &mut self.state.extract_summary;
        if let Some(v) = patch.total_segments {
            summary.total_segments = v;
        }
        if let Some(v) = patch.claims {
            summary.claims = v;
        }
        if let Some(v) = patch.facts {
            summary.facts = v;
        }
        if let Some(v) = patch.relationships {
            summary.relationships = v;
        }
        if let Some(v) = patch.relationship_types {
            summary.relationship_types = v;
        }
        if let Some(v) = patch.avg_confidence {
            summary.avg_confidence = v;
        }
    }

    /// Back to the freshly constructed state (full page reload)
    pub fn reset(&mut self) {
        self.state = WorkflowState::default();
    }
}

/// Lock a shared store, recovering the data if a handler panicked mid-update.
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, WorkflowStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::{CandidateKind, GraphEdge, GraphNode, NodeType};
    use pretty_assertions::assert_eq;

    fn verification(score: f64) -> Verification {
        Verification {
            trust_score: score,
            reasoning: format!("score {}", score),
            references: vec!["IPCC Sixth Assessment Report".to_string()],
        }
    }

    fn candidate(id: &str, kind: CandidateKind) -> Candidate {
        Candidate {
            id: id.to_string(),
            kind,
            text: format!("text of {}", id),
            timestamp: None,
            segment_id: None,
        }
    }

    #[test]
    fn test_new_store_defaults() {
        let store = WorkflowStore::new();
        assert_eq!(store.stage(), Stage::Loading);
        assert_eq!(store.state(), &WorkflowState::default());
    }

    #[test]
    fn test_move_to_step_accepts_any_transition() {
        let mut store = WorkflowStore::new();
        store.move_to_step(Stage::Conclude);
        assert_eq!(store.stage(), Stage::Conclude);
        store.move_to_step(Stage::Info);
        assert_eq!(store.stage(), Stage::Info);
        store.move_to_step(Stage::Verify);
        assert_eq!(store.stage(), Stage::Verify);
    }

    #[test]
    fn test_video_data_shallow_merge() {
        let mut store = WorkflowStore::new();
        store.update_video_data(VideoDataPatch {
            title: Some("Climate".to_string()),
            thumbnail: Some("thumb.png".to_string()),
            url: None,
        });
        store.update_video_data(VideoDataPatch {
            title: Some("Climate 2024".to_string()),
            ..VideoDataPatch::default()
        });

        let video = &store.state().video_data;
        assert_eq!(video.title, "Climate 2024");
        assert_eq!(video.thumbnail, "thumb.png");
        assert_eq!(video.url, "");
    }

    #[test]
    fn test_transcript_partial_update_keeps_timeline() {
        let mut store = WorkflowStore::new();
        store.update_transcript(TranscriptPatch {
            text: Some("first".to_string()),
            timeline: Some(vec![crate::workflow::state::TimelineEntry {
                time: 0.0,
                duration: 10.0,
                text: None,
            }]),
        });
        store.update_transcript(TranscriptPatch {
            text: Some("second".to_string()),
            timeline: None,
        });
        assert_eq!(store.state().transcript.text, "second");
        assert_eq!(store.state().transcript.timeline.len(), 1);
    }

    #[test]
    fn test_add_verification_is_idempotent() {
        let mut once = WorkflowStore::new();
        once.add_verification("fact_1", verification(75.0));

        let mut twice = WorkflowStore::new();
        twice.add_verification("fact_1", verification(75.0));
        twice.add_verification("fact_1", verification(75.0));

        assert_eq!(once.state(), twice.state());
    }

    #[test]
    fn test_add_verification_last_write_wins() {
        let mut store = WorkflowStore::new();
        store.add_verification("fact_1", verification(10.0));
        store.add_verification("fact_1", verification(90.0));
        assert_eq!(store.state().verifications.len(), 1);
        assert_eq!(store.state().verification("fact_1").unwrap().trust_score, 90.0);
    }

    #[test]
    fn test_verification_for_unknown_candidate_is_stored() {
        let mut store = WorkflowStore::new();
        store.set_candidates(vec![candidate("fact_1", CandidateKind::Fact)]);
        store.add_verification("nobody", verification(50.0));
        assert!(store.state().verification("nobody").is_some());
        assert!(store.state().candidate("nobody").is_none());
    }

    #[test]
    fn test_set_candidates_drops_duplicate_ids() {
        let mut store = WorkflowStore::new();
        store.set_candidates(vec![
            candidate("a", CandidateKind::Fact),
            candidate("b", CandidateKind::Claim),
            candidate("a", CandidateKind::Opinion),
        ]);
        let ids: Vec<&str> = store.state().candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.state().candidate("a").unwrap().kind, CandidateKind::Fact);
    }

    #[test]
    fn test_argument_graph_merge_prunes_dangling_edges() {
        let mut store = WorkflowStore::new();
        store.update_argument_graph(ArgumentGraphPatch {
            nodes: Some(vec![GraphNode {
                id: "n1".to_string(),
                node_type: NodeType::Claim,
                text: "claim".to_string(),
                timestamp: None,
                confidence: 0.5,
            }]),
            edges: None,
        });
        store.update_argument_graph(ArgumentGraphPatch {
            nodes: None,
            edges: Some(vec![GraphEdge {
                source: "n1".to_string(),
                target: "n2".to_string(),
                relationship: "supports".to_string(),
                confidence: None,
            }]),
        });
        assert_eq!(store.state().argument_graph.nodes.len(), 1);
        assert!(store.state().argument_graph.edges.is_empty());
    }

    #[test]
    fn test_extract_summary_merge() {
        let mut store = WorkflowStore::new();
        store.update_extract_summary(ExtractSummaryPatch {
            total_segments: Some(6),
            avg_confidence: Some(0.82),
            ..ExtractSummaryPatch::default()
        });
        store.update_extract_summary(ExtractSummaryPatch {
            claims: Some(2),
            ..ExtractSummaryPatch::default()
        });
        let summary = &store.state().extract_summary;
        assert_eq!(summary.total_segments, 6);
        assert_eq!(summary.claims, 2);
        assert_eq!(summary.avg_confidence, 0.82);
    }

    #[test]
    fn test_reset() {
        let mut store = WorkflowStore::new();
        store.move_to_step(Stage::Classify);
        store.add_verification("x", verification(1.0));
        store.reset();
        assert_eq!(store.state(), &WorkflowState::default());
    }

    #[test]
    fn test_lock_store_shared() {
        let shared = WorkflowStore::shared();
        lock_store(&shared).move_to_step(Stage::Info);
        assert_eq!(lock_store(&shared).stage(), Stage::Info);
    }
}
