mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::export_report;
pub use progress::RunProgress;
pub use styling::{dim, magenta_bold};

/// Prints the launchwatch banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🚦 launchwatch"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Optimizely launch monitor")
    );
}
