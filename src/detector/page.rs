/// Selectors whose presence marks a finished analysis
pub const COMPLETION_MARKERS: [&str; 3] = [
    ".analysis-complete",
    "[data-status=\"complete\"]",
    "#analysis-done",
];

/// Page text announcing completion (Korean and English UI)
pub const COMPLETION_TEXTS: [&str; 2] = ["분석 완료", "Analysis Complete"];

pub const PROGRESS_BAR: &str = ".progress-bar";
pub const VIEW_RESULT_BUTTON: &str = ".view-result-btn";

/// Attributes whose changes the mutation observer reports
pub const OBSERVED_ATTRIBUTES: [&str; 2] = ["class", "data-status"];

/// Read-only view of the rendered analysis page.
pub trait PageProbe: Send + Sync {
    /// Whether any element matches `selector`
    fn matches(&self, selector: &str) -> bool;

    /// Inline `style.width` of the first element matching `selector`
    fn style_width(&self, selector: &str) -> Option<String>;

    fn body_text(&self) -> String;
}

/// One structural change reported by the page observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    Attributes { name: String },
    ChildList { added: usize, removed: usize },
}

impl MutationRecord {
    /// Attribute changes on `class`/`data-status` and child insertions
    pub fn is_observed(&self) -> bool {
        match self {
            MutationRecord::Attributes { name } => OBSERVED_ATTRIBUTES.contains(&name.as_str()),
            MutationRecord::ChildList { added, .. } => *added > 0,
        }
    }
}

/// Marker check run after each observed mutation batch.
pub fn completion_marker_present(probe: &dyn PageProbe) -> bool {
    COMPLETION_MARKERS.iter().any(|selector| probe.matches(selector))
}

/// Full check run by the poll and the initial check.
///
/// Markers, completion text, a full progress bar, or the view-result button.
pub fn analysis_complete(probe: &dyn PageProbe) -> bool {
    if completion_marker_present(probe) {
        return true;
    }
    let text = probe.body_text();
    if COMPLETION_TEXTS.iter().any(|t| text.contains(t)) {
        return true;
    }
    if probe.style_width(PROGRESS_BAR).as_deref() == Some("100%") {
        return true;
    }
    probe.matches(VIEW_RESULT_BUTTON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct StaticPage {
        selectors: HashSet<&'static str>,
        width: Option<&'static str>,
        text: &'static str,
    }

    impl PageProbe for StaticPage {
        fn matches(&self, selector: &str) -> bool {
            self.selectors.contains(selector)
        }

        fn style_width(&self, selector: &str) -> Option<String> {
            (selector == PROGRESS_BAR)
                .then_some(self.width)
                .flatten()
                .map(str::to_string)
        }

        fn body_text(&self) -> String {
            self.text.to_string()
        }
    }

    #[test]
    fn test_markers() {
        let page = StaticPage {
            selectors: HashSet::from(["#analysis-done"]),
            ..StaticPage::default()
        };
        assert!(completion_marker_present(&page));
        assert!(analysis_complete(&page));
    }

    #[test]
    fn test_poll_heuristics() {
        let text = StaticPage {
            text: "... 분석 완료 ...",
            ..StaticPage::default()
        };
        assert!(!completion_marker_present(&text));
        assert!(analysis_complete(&text));

        let bar = StaticPage {
            width: Some("100%"),
            ..StaticPage::default()
        };
        assert!(analysis_complete(&bar));

        let partial = StaticPage {
            width: Some("60%"),
            text: "Analyzing",
            ..StaticPage::default()
        };
        assert!(!analysis_complete(&partial));

        let button = StaticPage {
            selectors: HashSet::from([VIEW_RESULT_BUTTON]),
            ..StaticPage::default()
        };
        assert!(analysis_complete(&button));
    }

    #[test]
    fn test_observed_mutations() {
        assert!(MutationRecord::Attributes {
            name: "data-status".to_string()
        }
        .is_observed());
        assert!(!MutationRecord::Attributes {
            name: "style".to_string()
        }
        .is_observed());
        assert!(MutationRecord::ChildList { added: 1, removed: 0 }.is_observed());
        assert!(!MutationRecord::ChildList { added: 0, removed: 2 }.is_observed());
    }
}
