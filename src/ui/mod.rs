//! Host page integration: trigger controls, completion notifications and
//! the launcher that asks the relay for an analysis tab.

mod controller;
mod host;
mod launcher;
mod notification;

pub use controller::{AnalysisStatus, HostPage, InitOutcome, StatusController, REDIRECT_BUTTON_ID};
pub use host::HostTab;
pub use launcher::{analysis_url, extract_video_id, watch_url, AnalysisLauncher, AnalysisRecord};
pub use notification::{NotificationCenter, NotificationSurface, ViewAction};
