use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::{json, Value};

use crate::config::NotifyConfig;
use crate::report::{ClassifiedExperiment, TimeWindow};

const WARNING_PREFIX: &str = "⚠️";

/// Builds the Teams message carrying an Adaptive Card that lists the launched
/// experiments for the window.
pub fn build_message(
    experiments: &[ClassifiedExperiment],
    window: &TimeWindow,
    settings: &NotifyConfig,
) -> Value {
    let mut body = vec![header(window, settings)];
    body.extend(experiments.iter().map(experiment_facts));

    json!({
        "type": "message",
        "attachments": [
            {
                "contentType": "application/vnd.microsoft.card.adaptive",
                "contentUrl": null,
                "content": {
                    "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                    "type": "AdaptiveCard",
                    "version": "1.4",
                    "body": body
                }
            }
        ]
    })
}

fn header(window: &TimeWindow, settings: &NotifyConfig) -> Value {
    let range = format!(
        "{} - {}",
        local_time(window.start, settings),
        local_time(window.end, settings)
    );

    json!({
        "type": "Container",
        "items": [
            {
                "type": "TextBlock",
                "text": settings.title,
                "weight": "bolder",
                "size": "Large"
            },
            {
                "type": "TextBlock",
                "text": range,
                "weight": "bolder",
                "size": "small"
            },
            separator()
        ]
    })
}

fn experiment_facts(experiment: &ClassifiedExperiment) -> Value {
    let change = &experiment.change;

    json!({
        "type": "Container",
        "items": [
            {
                "type": "FactSet",
                "facts": [
                    {"title": "Experiment name:", "value": change.exp_name},
                    {"title": "Status:", "value": change.exp_status},
                    {
                        "title": "Equal traffic allocation:",
                        "value": flag(experiment.is_equal_traffic_allocation)
                    },
                    {
                        "title": "Custom goals found:",
                        "value": flag(experiment.has_custom_goals)
                    },
                    {"title": "Project:", "value": change.project}
                ]
            },
            separator()
        ]
    })
}

fn separator() -> Value {
    json!({
        "type": "TextBlock",
        "text": " ",
        "separator": true,
        "isSubtle": true,
        "size": "small"
    })
}

/// Negative heuristics get a warning marker so they stand out in the channel.
fn flag(value: bool) -> String {
    if value {
        "true".to_string()
    } else {
        format!("{WARNING_PREFIX} false")
    }
}

/// Renders a timestamp like `Fri Mar 01 2024 13:00:00 CET`.
fn local_time(timestamp: DateTime<Utc>, settings: &NotifyConfig) -> String {
    let offset = FixedOffset::east_opt(settings.utc_offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix());
    format!(
        "{} {}",
        timestamp.with_timezone(&offset).format("%a %b %d %Y %H:%M:%S"),
        settings.timezone_label
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::StatusChange;
    use chrono::TimeZone;

    fn experiment(name: &str, equal: bool, goals: bool) -> ClassifiedExperiment {
        ClassifiedExperiment {
            change: StatusChange {
                exp_id: 1,
                exp_name: name.to_string(),
                exp_status: "running".to_string(),
                project: "TH".to_string(),
            },
            is_equal_traffic_allocation: equal,
            has_custom_goals: goals,
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::ending_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(), 60)
    }

    #[test]
    fn test_local_time_applies_offset() {
        let settings = NotifyConfig::default();
        let rendered = local_time(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(), &settings);
        assert_eq!(rendered, "Fri Mar 01 2024 13:00:00 CET");
    }

    #[test]
    fn test_local_time_out_of_range_offset_falls_back_to_utc() {
        let settings = NotifyConfig {
            utc_offset_minutes: 100_000,
            timezone_label: "UTC".to_string(),
            ..Default::default()
        };
        let rendered = local_time(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(), &settings);
        assert_eq!(rendered, "Fri Mar 01 2024 12:00:00 UTC");
    }

    #[test]
    fn test_message_envelope() {
        let message = build_message(&[], &window(), &NotifyConfig::default());

        assert_eq!(message["type"], "message");
        let attachment = &message["attachments"][0];
        assert_eq!(
            attachment["contentType"],
            "application/vnd.microsoft.card.adaptive"
        );
        assert_eq!(attachment["content"]["type"], "AdaptiveCard");
        assert_eq!(attachment["content"]["version"], "1.4");
    }

    #[test]
    fn test_header_shows_title_and_window() {
        let message = build_message(&[], &window(), &NotifyConfig::default());
        let header = &message["attachments"][0]["content"]["body"][0];

        assert_eq!(header["items"][0]["text"], "Optimizely client-side updates");
        assert_eq!(
            header["items"][1]["text"],
            "Fri Mar 01 2024 12:00:00 CET - Fri Mar 01 2024 13:00:00 CET"
        );
    }

    #[test]
    fn test_one_fact_set_per_experiment() {
        let experiments = vec![
            experiment("Hero", true, true),
            experiment("Checkout", false, false),
        ];
        let message = build_message(&experiments, &window(), &NotifyConfig::default());
        let body = message["attachments"][0]["content"]["body"]
            .as_array()
            .unwrap();

        assert_eq!(body.len(), 3);

        let hero = &body[1]["items"][0]["facts"];
        assert_eq!(hero[0]["value"], "Hero");
        assert_eq!(hero[1]["value"], "running");
        assert_eq!(hero[2]["value"], "true");
        assert_eq!(hero[3]["value"], "true");
        assert_eq!(hero[4]["value"], "TH");

        let checkout = &body[2]["items"][0]["facts"];
        assert_eq!(checkout[2]["value"], "⚠️ false");
        assert_eq!(checkout[3]["value"], "⚠️ false");
    }
}
