use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

use crate::report::StatusChange;

use super::types::{ChangeEvent, EntityId};

const STATUS_PROPERTY: &str = "status";

/// Reduces raw change-history events to one status change per experiment.
///
/// Events are taken in feed order and the first `status` change seen for an
/// entity wins; later changes for the same entity are ignored. Events missing
/// an entity id, a change list or an `after` value do not qualify.
pub fn aggregate(project_label: &str, events: &[ChangeEvent]) -> IndexMap<EntityId, StatusChange> {
    let mut changed: IndexMap<EntityId, StatusChange> = IndexMap::new();

    for event in events {
        let Some(entity) = &event.entity else {
            continue;
        };
        let Some(exp_id) = entity.id else {
            continue;
        };

        for change in event.changes.iter().flatten() {
            if change.property.as_deref() != Some(STATUS_PROPERTY) || changed.contains_key(&exp_id)
            {
                continue;
            }
            let Some(after) = &change.after else {
                continue;
            };

            changed.insert(
                exp_id,
                StatusChange {
                    exp_id,
                    exp_name: entity.name.clone().unwrap_or_default(),
                    exp_status: status_text(after),
                    project: project_label.to_string(),
                },
            );
        }
    }

    debug!(
        "Found {} status changes in {} events for project {project_label}",
        changed.len(),
        events.len()
    );

    changed
}

fn status_text(after: &Value) -> String {
    match after {
        Value::String(status) => status.clone(),
        other => other.to_string(),
    }
}
