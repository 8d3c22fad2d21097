//! Analysis session data model.
//!
//! Every field of [`WorkflowState`] has a matching `*Patch` type (or a whole
//! replacement value) accepted by the store. Patches are shallow: a `Some`
//! field overwrites, a `None` field leaves the current value alone.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Step of the linear analysis workflow, in display order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Loading,
    Info,
    Extract,
    Classify,
    /// Kept for ordering only; see [`crate::workflow::is_verify_phase`].
    Verify,
    Conclude,
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Stage; 6] = [
        Stage::Loading,
        Stage::Info,
        Stage::Extract,
        Stage::Classify,
        Stage::Verify,
        Stage::Conclude,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Loading => "LOADING",
            Stage::Info => "INFO",
            Stage::Extract => "EXTRACT",
            Stage::Classify => "CLASSIFY",
            Stage::Verify => "VERIFY",
            Stage::Conclude => "CONCLUDE",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOADING" => Ok(Stage::Loading),
            "INFO" => Ok(Stage::Info),
            "EXTRACT" => Ok(Stage::Extract),
            "CLASSIFY" => Ok(Stage::Classify),
            "VERIFY" => Ok(Stage::Verify),
            "CONCLUDE" => Ok(Stage::Conclude),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Position inside the video, either in seconds or as a display label (`"0:45"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Seconds(f64),
    Label(String),
}

/// Video metadata shown on the info view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoData {
    pub title: String,
    pub thumbnail: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoDataPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One timed span of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub time: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub timeline: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPatch {
    #[serde(default, alias = "script", alias = "full_text")]
    pub text: Option<String>,
    #[serde(default)]
    pub timeline: Option<Vec<TimelineEntry>>,
}

/// Role of a node in the argument graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Claim,
    Fact,
    Evidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Classifier confidence (0.0-1.0)
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(alias = "source_id")]
    pub source: String,
    #[serde(alias = "target_id")]
    pub target: String,
    pub relationship: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Claims, facts and evidence with the relationships between them.
///
/// Every edge endpoint names an existing node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentGraphPatch {
    #[serde(default)]
    pub nodes: Option<Vec<GraphNode>>,
    #[serde(default)]
    pub edges: Option<Vec<GraphEdge>>,
}

impl ArgumentGraph {
    /// Edges whose source or target is not a node of this graph.
    pub fn dangling_edges(&self) -> Vec<&GraphEdge> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges
            .iter()
            .filter(|e| !ids.contains(e.source.as_str()) || !ids.contains(e.target.as_str()))
            .collect()
    }

    /// Drop edges that reference unknown nodes, returning how many were removed.
    pub fn prune_dangling_edges(&mut self) -> usize {
        let ids: HashSet<String> = self.nodes.iter().map(|n| n.id.clone()).collect();
        let before = self.edges.len();
        self.edges
            .retain(|e| ids.contains(&e.source) && ids.contains(&e.target));
        before - self.edges.len()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Aggregate numbers produced by the extract stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractSummary {
    pub total_segments: u32,
    pub claims: u32,
    pub facts: u32,
    pub relationships: u32,
    #[serde(default)]
    pub relationship_types: BTreeMap<String, u32>,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractSummaryPatch {
    #[serde(default)]
    pub total_segments: Option<u32>,
    #[serde(default)]
    pub claims: Option<u32>,
    #[serde(default)]
    pub facts: Option<u32>,
    #[serde(default)]
    pub relationships: Option<u32>,
    #[serde(default)]
    pub relationship_types: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Fact,
    Claim,
    Opinion,
    Evidence,
}

/// Extracted assertion awaiting (or holding) a verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

/// Backend trust assessment for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    /// 0-100
    pub trust_score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Verification {
    /// Score clamped into 0-100
    pub fn normalized_score(&self) -> f64 {
        clamp_score(self.trust_score)
    }
}

/// Final verdict over the whole video.
///
/// Canonical names are `claimCount`, `factCount` and `evidenceCount`; the
/// older `claims`, `opinionCount`, `facts` and `evidence` spellings are read
/// as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conclusion {
    #[serde(default, alias = "claims", alias = "opinionCount")]
    pub claim_count: u32,
    #[serde(default, alias = "facts")]
    pub fact_count: u32,
    #[serde(default, alias = "evidence")]
    pub evidence_count: u32,
    /// 0-100
    #[serde(default)]
    pub trust_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_findings: Option<Vec<String>>,
}

impl Conclusion {
    pub fn normalized_score(&self) -> f64 {
        clamp_score(self.trust_score)
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Everything the analysis page knows about the current session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub stage: Stage,
    pub video_data: VideoData,
    pub transcript: Transcript,
    pub argument_graph: ArgumentGraph,
    pub extract_summary: ExtractSummary,
    pub candidates: Vec<Candidate>,
    pub verifications: BTreeMap<String, Verification>,
    pub conclusion: Conclusion,
}

impl WorkflowState {
    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn verification(&self, candidate_id: &str) -> Option<&Verification> {
        self.verifications.get(candidate_id)
    }

    /// Candidates of one kind, in arrival order
    pub fn candidates_of(&self, kind: CandidateKind) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(move |c| c.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_ordering() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Stage::default(), Stage::Loading);
    }

    #[test]
    fn test_stage_round_trips_through_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("DONE".parse::<Stage>().is_err());
    }

    #[test]
    fn test_candidate_deserialization() {
        let c: Candidate = serde_json::from_value(json!({
            "id": "fact_1",
            "type": "fact",
            "text": "The Paris Climate Agreement has been signed by 195 countries",
            "timestamp": "0:45"
        }))
        .unwrap();
        assert_eq!(c.kind, CandidateKind::Fact);
        assert_eq!(c.timestamp, Some(Timestamp::Label("0:45".to_string())));
        assert!(c.segment_id.is_none());
    }

    #[test]
    fn test_graph_edge_accepts_backend_field_names() {
        let e: GraphEdge = serde_json::from_value(json!({
            "source_id": "seg_1",
            "target_id": "seg_2",
            "relationship": "supports",
            "confidence": 0.7
        }))
        .unwrap();
        assert_eq!(e.source, "seg_1");
        assert_eq!(e.target, "seg_2");
        assert_eq!(e.confidence, Some(0.7));
    }

    #[test]
    fn test_prune_dangling_edges() {
        let mut graph: ArgumentGraph = serde_json::from_value(json!({
            "nodes": [
                {"id": "a", "type": "claim", "text": "A", "confidence": 0.9},
                {"id": "b", "type": "fact", "text": "B", "confidence": 0.8}
            ],
            "edges": [
                {"source": "a", "target": "b", "relationship": "supports"},
                {"source": "a", "target": "ghost", "relationship": "contradicts"}
            ]
        }))
        .unwrap();

        assert_eq!(graph.dangling_edges().len(), 1);
        assert_eq!(graph.prune_dangling_edges(), 1);
        assert!(graph.dangling_edges().is_empty());
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_conclusion_aliases() {
        let c: Conclusion = serde_json::from_value(json!({
            "opinionCount": 2,
            "factCount": 3,
            "trustScore": 68
        }))
        .unwrap();
        assert_eq!(c.claim_count, 2);
        assert_eq!(c.fact_count, 3);
        assert_eq!(c.trust_score, 68.0);

        let c: Conclusion = serde_json::from_value(json!({
            "claims": 4,
            "facts": 1,
            "total_segments": 9
        }))
        .unwrap();
        assert_eq!(c.claim_count, 4);
        assert_eq!(c.fact_count, 1);
        assert_eq!(c.trust_score, 0.0);
    }

    #[test]
    fn test_conclusion_serializes_canonical_names() {
        let c = Conclusion {
            claim_count: 1,
            fact_count: 2,
            evidence_count: 3,
            trust_score: 50.0,
            summary: None,
            key_findings: None,
        };
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(
            value,
            json!({"claimCount": 1, "factCount": 2, "evidenceCount": 3, "trustScore": 50.0})
        );
    }

    #[test]
    fn test_scores_are_clamped() {
        let v = Verification {
            trust_score: 140.0,
            reasoning: String::new(),
            references: vec![],
        };
        assert_eq!(v.normalized_score(), 100.0);

        let c = Conclusion {
            trust_score: -5.0,
            ..Conclusion::default()
        };
        assert_eq!(c.normalized_score(), 0.0);
    }
}
