//! Formatting for sizes, durations and the build summary.

use std::time::Duration;

use console::Term;
use owo_colors::OwoColorize;

/// One line of the build summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub pipeline: String,
    /// Primary output path as shown to the user
    pub output: String,
    pub bytes: u64,
    pub duration: Duration,
    /// `None` for a successful pipeline
    pub error: Option<String>,
}

/// Human-readable size.
///
/// ```
/// use kiln_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

/// Human-readable duration: `50ms`, `1.50s`, `1m 30s`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms < 1000 {
        format!("{total_ms}ms")
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Print the per-pipeline table `kiln build` ends with.
pub fn print_build_summary(rows: &[SummaryRow]) {
    let width = (Term::stderr().size().1 as usize).min(80);

    eprintln!("\n{}", "Build Summary".bold().underline());
    eprintln!("{}", "─".repeat(width));

    for row in rows {
        match &row.error {
            None => eprintln!(
                "  {} {} {} {} {}",
                "▸".blue(),
                row.pipeline.bright_white().bold(),
                row.output,
                format_size(row.bytes).dimmed(),
                format!("({})", format_duration(row.duration)).dimmed()
            ),
            Some(_) => eprintln!(
                "  {} {} {}",
                "✗".red(),
                row.pipeline.bright_white().bold(),
                "failed".red()
            ),
        }
    }

    eprintln!("{}", "─".repeat(width));

    let built: Vec<&SummaryRow> = rows.iter().filter(|r| r.error.is_none()).collect();
    let total_size: u64 = built.iter().map(|r| r.bytes).sum();
    let total_time = rows.iter().map(|r| r.duration).max().unwrap_or_default();
    eprintln!(
        "  {} {} of {} pipelines, {} in {}",
        "Total:".bold(),
        built.len(),
        rows.len(),
        format_size(total_size).green(),
        format_duration(total_time).green()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1_572_864), "1.50 MB");
        assert_eq!(format_size(2_147_483_648), "2.00 GB");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
    }
}
