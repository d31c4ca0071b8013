use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::providers::optimizely::EntityId;

/// Half-open polling window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn ending_at(end: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start: end - Duration::minutes(i64::from(minutes)),
            end,
        }
    }

    /// Start as ISO-8601 UTC with millisecond precision.
    pub fn start_iso(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn end_iso(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Latest status transition of one experiment within the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub exp_id: EntityId,
    pub exp_name: String,
    pub exp_status: String,
    pub project: String,
}

/// An experiment judged live to real users, with its quality heuristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedExperiment {
    #[serde(flatten)]
    pub change: StatusChange,
    #[serde(rename = "isEqualTrafficAllocation")]
    pub is_equal_traffic_allocation: bool,
    #[serde(rename = "hasCustomGoals")]
    pub has_custom_goals: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipScope {
    Project,
    Experiment,
    Page,
}

impl fmt::Display for SkipScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Experiment => write!(f, "experiment"),
            Self::Page => write!(f, "page"),
        }
    }
}

/// A unit of work left out of the results because data could not be obtained.
///
/// Omission is indistinguishable from "nothing to report" in the experiment
/// list, so these are surfaced separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub scope: SkipScope,
    pub id: EntityId,
    /// Experiment the skipped page belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_id: Option<EntityId>,
    pub reason: String,
}

impl SkippedUnit {
    pub fn new(scope: SkipScope, id: EntityId, reason: impl fmt::Display) -> Self {
        Self {
            scope,
            id,
            exp_id: None,
            reason: reason.to_string(),
        }
    }

    pub fn for_experiment(mut self, exp_id: EntityId) -> Self {
        self.exp_id = Some(exp_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub window: TimeWindow,
    pub collected_at: DateTime<Utc>,
    pub projects_checked: usize,
    pub experiments: Vec<ClassifiedExperiment>,
    pub skipped: Vec<SkippedUnit>,
}

impl RunReport {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            collected_at: Utc::now(),
            projects_checked: 0,
            experiments: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn has_launches(&self) -> bool {
        !self.experiments.is_empty()
    }
}
