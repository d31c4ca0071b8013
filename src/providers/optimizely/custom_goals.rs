use super::types::{CodeChange, ExperimentDetail};

/// Call that custom code makes to report analytics events.
pub const DEFAULT_ANALYTICS_MARKER: &str = "optimizely.sendAnalyticsEvents";

/// Detects custom goal instrumentation in shared or per-variation custom code.
///
/// This is a plain substring check on the code payload: commented-out calls
/// count as instrumentation, and calls assembled dynamically are missed.
pub fn has_custom_goals(experiment: &ExperimentDetail, marker: &str) -> bool {
    let shared = experiment
        .changes
        .iter()
        .any(|change| sends_analytics(change, marker));

    shared
        || experiment
            .variations
            .iter()
            .flat_map(|variation| &variation.actions)
            .flat_map(|action| &action.changes)
            .any(|change| sends_analytics(change, marker))
}

fn sends_analytics(change: &CodeChange, marker: &str) -> bool {
    change.is_custom_code() && change.code().is_some_and(|code| code.contains(marker))
}
