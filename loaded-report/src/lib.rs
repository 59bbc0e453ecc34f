#![warn(missing_docs)]
//! Loaded Report - Run Output
//!
//! Renders a finished run:
//! - JSON (machine-readable, run metadata plus the statistics map)
//! - Human-readable terminal table

mod human;
mod json;

pub use human::format_human_output;
pub use json::{RunRecord, generate_json_report};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON run record
    Json,
    /// Human-readable terminal output
    #[default]
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Render a run record in the requested format
pub fn render(record: &RunRecord, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => generate_json_report(record),
        OutputFormat::Human => Ok(format_human_output(record)),
    }
}
