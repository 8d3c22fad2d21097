use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::RelayPhase;

pub type TabId = i64;
pub type WindowId = i64;

/// Message on the extension bus, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayMessage {
    /// Host page asks for an analysis tab
    #[serde(rename_all = "camelCase")]
    StartAnalysis {
        video_id: String,
        video_url: String,
        analysis_url: String,
    },
    /// Analysis page detected completion
    #[serde(rename_all = "camelCase")]
    AnalysisDone {
        #[serde(default)]
        video_url: String,
        #[serde(default)]
        result_url: String,
        #[serde(default)]
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    FocusAnalysisTab { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    GetAnalysisStatus {
        #[serde(default)]
        video_url: String,
    },
    /// Fan-out to host tabs
    AnalysisComplete { data: CompletionNotice },
    DownloadReady {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
    },
    DownloadError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
    },
}

impl RelayMessage {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::StartAnalysis { .. } => "START_ANALYSIS",
            RelayMessage::AnalysisDone { .. } => "ANALYSIS_DONE",
            RelayMessage::FocusAnalysisTab { .. } => "FOCUS_ANALYSIS_TAB",
            RelayMessage::GetAnalysisStatus { .. } => "GET_ANALYSIS_STATUS",
            RelayMessage::AnalysisComplete { .. } => "ANALYSIS_COMPLETE",
            RelayMessage::DownloadReady { .. } => "DOWNLOAD_READY",
            RelayMessage::DownloadError { .. } => "DOWNLOAD_ERROR",
        }
    }
}

/// Body of `ANALYSIS_COMPLETE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionNotice {
    pub video_url: String,
    #[serde(default)]
    pub result_url: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_tab_id: Option<TabId>,
}

/// Reply to a bus message. Every handled message gets one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RelayPhase>,
}

impl RelayResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_tab(mut self, tab_id: TabId) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    pub fn with_status(mut self, status: RelayPhase) -> Self {
        self.status = Some(status);
        self
    }
}
