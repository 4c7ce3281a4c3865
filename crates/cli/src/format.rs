//! Report and error rendering.

use walletrace::ScenarioReport;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Plain text
    Human,
    /// Pretty JSON
    Json,
}

/// Render a scenario report.
pub fn format_report(report: &ScenarioReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => report.to_string(),
        OutputMode::Json => serde_json::to_string_pretty(report)
            .unwrap_or_else(|e| format!("{{\"error\": \"unable to encode report: {}\"}}", e)),
    }
}

/// Render a fatal error with its whole context chain.
pub fn format_error(error: &anyhow::Error) -> String {
    format!("(error) {:#}", error)
}
