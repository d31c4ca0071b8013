use anyhow::Result;
use std::io::Write;

use crate::config::OutputFormat;
use crate::report::RunReport;

use super::summary::render_summary;

/// Writes a run report in the requested format.
///
/// - Summary: human-readable tables
/// - JSON: the complete report, for piping into other tools
/// - CSV: one row per live experiment, for spreadsheets
pub fn export_report(
    report: &RunReport,
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Summary => {
            write!(output, "{}", render_summary(report))?;
            Ok(())
        }
        OutputFormat::Json => export_json(report, pretty, output),
        OutputFormat::Csv => export_csv(report, output),
    }
}

fn export_json(report: &RunReport, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_csv(report: &RunReport, output: &mut dyn Write) -> Result<()> {
    writeln!(
        output,
        "Experiment ID,Experiment Name,Status,Project,Equal Traffic Allocation,Custom Goals,Window Start,Window End"
    )?;

    for experiment in &report.experiments {
        let change = &experiment.change;
        writeln!(
            output,
            "{},{},{},{},{},{},{},{}",
            change.exp_id,
            csv_field(&change.exp_name),
            csv_field(&change.exp_status),
            csv_field(&change.project),
            experiment.is_equal_traffic_allocation,
            experiment.has_custom_goals,
            report.window.start_iso(),
            report.window.end_iso()
        )?;
    }

    Ok(())
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
