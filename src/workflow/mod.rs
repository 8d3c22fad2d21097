//! Analysis workflow: state model, store, event wiring and view selection.

pub mod state;
mod store;
mod view;
mod wiring;

pub use state::*;
pub use store::{lock_store, SharedStore, WorkflowStore};
pub use view::{
    is_verify_phase, select, trust_label, visible_views, ConclusionSummary, TrustBand, View,
    ViewSelection,
};
pub use wiring::{EventWiring, ExtractPayload, WiringOutcome, WorkflowEvent, WIRED_EVENTS};
