//! Stage to view selection.
//!
//! Pure functions over [`WorkflowState`]; nothing here mutates the store.

use serde::Serialize;

use super::state::{Conclusion, Stage, WorkflowState};

/// Renderable section of the analysis page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Loading,
    Info,
    Extract,
    Classify,
    Conclude,
}

/// Everything the page shows for one state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSelection {
    pub views: Vec<View>,
    /// Extract collapsed into the header once classification starts
    pub compressed_extract: bool,
    pub transcript_button: bool,
    pub share_button: bool,
    pub verify_phase: bool,
}

/// Views rendered for a stage, in page order.
pub fn visible_views(stage: Stage) -> Vec<View> {
    match stage {
        Stage::Loading => vec![View::Loading],
        Stage::Info => vec![View::Info],
        Stage::Extract => vec![View::Extract],
        Stage::Classify | Stage::Verify => vec![View::Classify],
        Stage::Conclude => vec![View::Conclude, View::Classify],
    }
}

fn past_extract(stage: Stage) -> bool {
    stage >= Stage::Classify
}

/// Whether verification results are on display.
///
/// Verification is not a stored stage: it is classification with at least one
/// verification received, or the conclusion.
pub fn is_verify_phase(state: &WorkflowState) -> bool {
    (state.stage == Stage::Classify && !state.verifications.is_empty())
        || state.stage == Stage::Conclude
}

pub fn select(state: &WorkflowState) -> ViewSelection {
    ViewSelection {
        views: visible_views(state.stage),
        compressed_extract: past_extract(state.stage),
        transcript_button: past_extract(state.stage),
        share_button: state.stage == Stage::Conclude,
        verify_phase: is_verify_phase(state),
    }
}

/// Coarse trust bucket used for colouring scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustBand {
    High,
    Medium,
    Low,
}

impl TrustBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            TrustBand::High
        } else if score >= 40.0 {
            TrustBand::Medium
        } else {
            TrustBand::Low
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TrustBand::High => {
                "This video appears to contain mostly accurate information based on fact-checking."
            }
            TrustBand::Medium => {
                "This video contains a mix of accurate and questionable claims. Review individual facts for details."
            }
            TrustBand::Low => {
                "This video contains significant inaccuracies or unverified claims. Proceed with caution."
            }
        }
    }
}

pub fn trust_label(score: f64) -> &'static str {
    match score {
        s if s >= 80.0 => "Highly Trustworthy",
        s if s >= 60.0 => "Mostly Trustworthy",
        s if s >= 40.0 => "Mixed",
        s if s >= 20.0 => "Questionable",
        _ => "Unreliable",
    }
}

/// Headline numbers for the conclusion view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConclusionSummary {
    pub trust_score: f64,
    pub band: TrustBand,
    pub label: &'static str,
    pub description: &'static str,
    pub claim_count: u32,
    pub fact_count: u32,
    pub evidence_count: u32,
}

impl From<&Conclusion> for ConclusionSummary {
    fn from(conclusion: &Conclusion) -> Self {
        let score = conclusion.normalized_score();
        let band = TrustBand::from_score(score);
        Self {
            trust_score: score,
            band,
            label: trust_label(score),
            description: band.description(),
            claim_count: conclusion.claim_count,
            fact_count: conclusion.fact_count,
            evidence_count: conclusion.evidence_count,
        }
    }
}
