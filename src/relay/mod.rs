//! Cross-context message relay.
//!
//! The background side tracks one [`AnalysisSession`] per video URL, opens
//! the analysis tab, fans completion out to host tabs and expires stale
//! entries. The content-script side is a [`PageBridge`] between the analysis
//! page's window messages and the extension bus.

mod bridge;
mod browser;
mod message;
mod service;
mod session;

pub use bridge::{
    ExtensionBus, LocalBus, MessageSource, PageBridge, PagePort, ANALYSIS_STATUS_RESPONSE,
    REQUEST_ANALYSIS_STATUS,
};
pub use browser::{matches_pattern, Tab, TabHost};
pub use message::{CompletionNotice, RelayMessage, RelayResponse, TabId, WindowId};
pub use service::Relay;
pub use session::{AnalysisSession, RelayPhase, SessionTable};
