//! HTTP side of the analysis backend.
//!
//! The backend downloads the video audio and exposes a liveness probe; the
//! analysis itself streams over the [`crate::transport`] channel.

mod client;
mod types;


pub use client::BackendClient;
pub use types::*;
