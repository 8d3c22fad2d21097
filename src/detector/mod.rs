//! Completion detection on the rendered analysis page.

mod completion;
pub mod page;

pub use completion::{
    analysis_target, CompletionDetector, CompletionSignal, DetectorOutcome, ManualTrigger,
};
pub use page::{MutationRecord, PageProbe};
