mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{write_json, write_text};
pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::{
    render_analysis, render_analysis_history, render_analytics, render_execution,
    render_execution_history, render_pipelines, render_tracking,
};

/// Prints the deployguard banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🛡️ deployguard"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Deployment risk gate and auto-remediation")
    );
}
