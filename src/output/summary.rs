use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::report::RunReport;

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{create_table, cyan_header, heuristic_cell};

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

/// Renders a human-readable summary of a run.
///
/// Shows an overview of the window, a table of experiments launched to real
/// users with their heuristics, and the units that had to be skipped.
pub fn render_summary(report: &RunReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");

    let launched = if report.experiments.is_empty() {
        bright_green(report.experiments.len())
    } else {
        bright_yellow(report.experiments.len())
    };
    let skipped = if report.skipped.is_empty() {
        bright_green(report.skipped.len())
    } else {
        bright_red(report.skipped.len())
    };

    let _ = writeln!(
        output,
        "  {} {} - {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Window:"),
        cyan(report.window.start_iso()),
        cyan(report.window.end_iso()),
        dim("Projects checked:"),
        bright_yellow(report.projects_checked),
        dim("Live experiments:"),
        launched,
        dim("Skipped units:"),
        skipped,
        dim("Checked at:"),
        dim(report.collected_at.format("%Y-%m-%d %H:%M UTC"))
    );

    if report.experiments.is_empty() {
        let _ = writeln!(output, "{}\n", bright_green("No experiments in production."));
    } else {
        add_section_header(&mut output, "🚀", "Live Experiments");

        let mut table = create_table();
        table.set_header(cyan_header(&[
            "#",
            "Experiment",
            "ID",
            "Status",
            "Project",
            "Equal Split",
            "Custom Goals",
        ]));

        for (idx, experiment) in report.experiments.iter().enumerate() {
            let change = &experiment.change;
            table.add_row(vec![
                Cell::new(idx + 1),
                Cell::new(&change.exp_name),
                Cell::new(change.exp_id),
                Cell::new(&change.exp_status),
                Cell::new(&change.project),
                heuristic_cell(experiment.is_equal_traffic_allocation),
                heuristic_cell(experiment.has_custom_goals),
            ]);
        }

        let _ = writeln!(output, "{table}\n");
    }

    if !report.skipped.is_empty() {
        add_section_header(&mut output, "⚠️", "Skipped");

        let mut table = create_table();
        table.set_header(cyan_header(&["Scope", "ID", "Experiment", "Reason"]));

        for unit in &report.skipped {
            table.add_row(vec![
                Cell::new(unit.scope),
                Cell::new(unit.id),
                Cell::new(unit.exp_id.map_or_else(|| "-".to_string(), |id| id.to_string())),
                Cell::new(&unit.reason).fg(TableColor::Red),
            ]);
        }

        let _ = writeln!(output, "{table}\n");
        let _ = writeln!(
            output,
            "  {} Skipped units may hide live experiments; they are retried on the next run.",
            cyan("•")
        );
    }

    output
}
