//! # FactRay Relay
//!
//! Relay core for a YouTube fact-checking tool: streams a staged video
//! analysis from the backend into a workflow store and coordinates
//! completion across the host tab, the extension background and the
//! analysis tab.
//!
//! ## Features
//!
//! - **Analysis Channel**: Stage-tagged WebSocket or event-tagged pub/sub with bounded reconnection
//! - **Workflow Store**: Forward-only stage progression with shallow patch merges
//! - **View Selection**: Stage-driven panel list and trust-band summaries
//! - **Session Relay**: One analysis tab per video, completion fan-out and TTL sweeping
//! - **Completion Detection**: Single-fire detection from mutations, polling or manual trigger
//! - **Host Controls**: Trigger button status, completion notification and analysis history
//!
//! ## Architecture
//!
//! ```text
//! Host tab (ui) → Relay (background) → Analysis tab (detector)
//!                                           ↓
//!                       Backend (HTTP download + analysis channel)
//!                                           ↓
//!                                   Workflow store (views)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use factray_relay::{AnalysisRunner, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let variant = config.backend.variant;
//!     let runner = AnalysisRunner::new(config)?;
//!     let state = runner
//!         .run("https://www.youtube.com/shorts/abc123", variant)
//!         .await?;
//!     println!("{}", state.stage);
//!     Ok(())
//! }
//! ```

/// HTTP client for the analysis backend.
pub mod backend;
/// Configuration management.
pub mod config;
/// Completion detection on the analysis page.
pub mod detector;
/// Error types and result aliases for the application.
pub mod error;
/// Cross-context message relay.
pub mod relay;
/// End-to-end analysis driver.
pub mod runner;
/// Duplex channel to the analysis backend.
pub mod transport;
/// Host page controls and notifications.
pub mod ui;
/// Analysis workflow state, store and views.
pub mod workflow;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use runner::AnalysisRunner;
