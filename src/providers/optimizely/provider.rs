use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{ProjectConfig, TargetingConfig};
use crate::notified::{NotificationKey, NotifiedStore};
use crate::report::{RunReport, SkipScope, SkippedUnit, TimeWindow};

use super::changes::aggregate;
use super::client::OptimizelyClient;
use super::targeting::TargetingClassifier;

/// Finds experiments launched to real users across the tracked projects.
///
/// Projects are processed in configuration order and experiments in the order
/// the change feed reports them; nothing runs concurrently so the API sees at
/// most one request at a time.
pub struct OptimizelyProvider {
    client: OptimizelyClient,
    projects: Vec<ProjectConfig>,
    rules: TargetingConfig,
    notified: Arc<dyn NotifiedStore>,
}

impl OptimizelyProvider {
    pub fn new(
        client: OptimizelyClient,
        projects: Vec<ProjectConfig>,
        rules: TargetingConfig,
        notified: Arc<dyn NotifiedStore>,
    ) -> Self {
        Self {
            client,
            projects,
            rules,
            notified,
        }
    }

    /// Runs one classification pass over `window`.
    ///
    /// Never fails: a project whose change history cannot be fetched, and any
    /// experiment or page that cannot be fetched, is left out of
    /// `experiments` and listed in `skipped`. Status changes already recorded
    /// in the notified store are dropped before classification.
    pub async fn collect_launches(&self, window: TimeWindow) -> RunReport {
        info!(
            "Checking {} projects for status changes between {} - {}",
            self.projects.len(),
            window.start_iso(),
            window.end_iso()
        );

        let mut report = RunReport::new(window);
        let classifier = TargetingClassifier::new(&self.client, &self.rules);

        for project in &self.projects {
            report.projects_checked += 1;
            let label = project.display_label();

            let events = match self.client.fetch_changes(project.id, &window).await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Skipping project {label}: change history unavailable ({e})");
                    report
                        .skipped
                        .push(SkippedUnit::new(SkipScope::Project, project.id, e));
                    continue;
                }
            };

            if events.is_empty() {
                info!(
                    "No changes made to project {label} between {} - {}",
                    window.start_iso(),
                    window.end_iso()
                );
                continue;
            }

            let mut changes = aggregate(&label, &events);
            changes.retain(|exp_id, change| {
                let seen = self.notified.contains(&NotificationKey::from(&*change));
                if seen {
                    debug!("Experiment {exp_id} already reported as {}", change.exp_status);
                }
                !seen
            });

            if changes.is_empty() {
                info!("No new experiment status changes in project {label}");
                continue;
            }

            let classification = classifier.classify(project, changes).await;
            report.experiments.extend(classification.live);
            report.skipped.extend(classification.skipped);
        }

        info!(
            "Found {} experiments live to real users ({} units skipped)",
            report.experiments.len(),
            report.skipped.len()
        );

        report
    }

    /// Records the report's experiments as notified.
    ///
    /// Call only once the run's results have been delivered, so a failed
    /// delivery is retried on the next run.
    pub fn commit(&self, report: &RunReport) {
        let keys: Vec<NotificationKey> = report
            .experiments
            .iter()
            .map(NotificationKey::from)
            .collect();
        self.notified.mark(&keys);
    }
}
