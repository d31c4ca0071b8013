use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::config::{ProjectConfig, TargetingConfig};
use crate::report::{ClassifiedExperiment, SkipScope, SkippedUnit, StatusChange};

use super::client::OptimizelyClient;
use super::custom_goals::has_custom_goals;
use super::traffic_allocation::is_equal_split;
use super::types::{EntityId, PageDetail};

const AND_OPERATOR: &str = "and";

/// Whether the audience conditions conclusively restrict the experiment to
/// the QA audience.
///
/// Approximated by substring search on the serialized expression: the QA
/// audience must appear and the expression must contain an `and`. A nested
/// `or` elsewhere in the expression yields a false positive; an id that is a
/// prefix of another audience id matches too.
pub fn audience_gates_qa(audience_conditions: &str, qa_audience_id: &str) -> bool {
    audience_conditions.contains(qa_audience_id) && audience_conditions.contains(AND_OPERATOR)
}

/// Whether the page's targeting conditions contain the QA marker (e.g. a
/// lower-environment hostname).
pub fn page_marks_qa(page: &PageDetail, qa_page_marker: &str) -> bool {
    page.conditions
        .as_deref()
        .is_some_and(|conditions| conditions.contains(qa_page_marker))
}

/// Outcome of classifying one project's status changes.
#[derive(Debug, Default)]
pub struct Classification {
    /// Experiments exposed to real users, in discovery order
    pub live: Vec<ClassifiedExperiment>,
    pub skipped: Vec<SkippedUnit>,
}

/// Decides, experiment by experiment, whether a status change affects real users.
pub struct TargetingClassifier<'a> {
    client: &'a OptimizelyClient,
    rules: &'a TargetingConfig,
}

impl<'a> TargetingClassifier<'a> {
    pub fn new(client: &'a OptimizelyClient, rules: &'a TargetingConfig) -> Self {
        Self { client, rules }
    }

    /// Classifies status changes sequentially, one experiment fetch at a time.
    ///
    /// Experiments whose detail or page cannot be fetched, or whose detail is
    /// unusable, are left out of `live` and recorded in `skipped`.
    pub async fn classify(
        &self,
        project: &ProjectConfig,
        changes: IndexMap<EntityId, StatusChange>,
    ) -> Classification {
        info!(
            "Checking targeting of {} changed experiments in project {}",
            changes.len(),
            project.display_label()
        );

        let mut classification = Classification::default();

        for change in changes.into_values() {
            let exp_id = change.exp_id;
            match self.classify_experiment(project, change).await {
                Ok(Some(experiment)) => {
                    debug!("Experiment {exp_id} targets real users");
                    classification.live.push(experiment);
                }
                Ok(None) => debug!("Experiment {exp_id} is QA-only"),
                Err(skipped) => {
                    warn!(
                        "Skipping experiment {exp_id}: {} {} unavailable ({})",
                        skipped.scope, skipped.id, skipped.reason
                    );
                    classification.skipped.push(skipped);
                }
            }
        }

        classification
    }

    async fn classify_experiment(
        &self,
        project: &ProjectConfig,
        change: StatusChange,
    ) -> Result<Option<ClassifiedExperiment>, SkippedUnit> {
        let exp_id = change.exp_id;
        let skip = |reason: String| SkippedUnit::new(SkipScope::Experiment, exp_id, reason);

        let experiment = self
            .client
            .fetch_experiment(exp_id)
            .await
            .map_err(|e| skip(e.to_string()))?;

        let audience_conditions = experiment
            .audience_conditions
            .as_deref()
            .ok_or_else(|| skip("missing audience_conditions".to_string()))?;

        let is_equal_traffic_allocation =
            is_equal_split(self.rules.total_allocation, &experiment.variations)
                .map_err(|e| skip(e.to_string()))?;
        let has_custom_goals = has_custom_goals(&experiment, &self.rules.analytics_marker);

        let qa_only = if audience_gates_qa(audience_conditions, &project.qa_audience_id) {
            true
        } else if let Some(&page_id) = experiment.page_ids.first() {
            let page = self.client.fetch_page(page_id).await.map_err(|e| {
                SkippedUnit::new(SkipScope::Page, page_id, e).for_experiment(exp_id)
            })?;
            page_marks_qa(&page, &self.rules.qa_page_marker)
        } else {
            // No page targeting to inspect; exposure is assumed to be broad.
            debug!("Experiment {exp_id} has no pages, treating as live");
            false
        };

        if qa_only {
            return Ok(None);
        }

        Ok(Some(ClassifiedExperiment {
            change,
            is_equal_traffic_allocation,
            has_custom_goals,
        }))
    }
}
