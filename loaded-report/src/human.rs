//! Human-Readable Output

use crate::json::RunRecord;
use loaded_suite::Phase;

fn format_percentile(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2} ms", v),
        None => "n/a".to_string(),
    }
}

/// Format a run record as a terminal report.
///
/// Keys are listed in sorted order and indented by their depth in the
/// hierarchy, so `a.b` appears right below `a`.
pub fn format_human_output(record: &RunRecord) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!("Loaded Results: {}\n", record.title));
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    if record.stats.is_empty() {
        output.push_str("  (no samples recorded)\n\n");
    }

    for (key, stats) in record.stats.iter() {
        let depth = key.matches(loaded_core::NAME_SEPARATOR).count();
        let indent = "  ".repeat(depth + 1);

        output.push_str(&format!("{}{}\n", indent, key));
        output.push_str(&format!(
            "{}    count: {}  sum: {:.2} ms  mean: {:.2} ms  median: {:.2} ms\n",
            indent, stats.count, stats.sum, stats.mean, stats.median
        ));
        output.push_str(&format!(
            "{}    min: {:.2} ms  max: {:.2} ms\n",
            indent, stats.min, stats.max
        ));
        output.push_str(&format!(
            "{}    p90: {}  p95: {}  p99: {}\n",
            indent,
            format_percentile(stats.p90),
            format_percentile(stats.p95),
            format_percentile(stats.p99)
        ));
    }

    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "Iterations: {} dispatched, {} failed | Errors: {} | Elapsed: {:.2} ms\n",
        record.dispatched, record.failed_iterations, record.errors, record.elapsed_ms
    ));
    if record.phase != Phase::Done {
        output.push_str(&format!("Run stopped during {}\n", record.phase));
    }

    output
}
