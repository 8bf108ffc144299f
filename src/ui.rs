use colored::Colorize;
use declarative::{BatchSummary, DiffRecord, ReconcileReport};
use serde_json::Value;
use std::collections::BTreeMap;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Reports
// ============================================================================

/// Print one result record as a status line, its steps and optionally its diff.
pub fn report(report: &ReconcileReport, show_diff: bool) {
    if report.failed {
        error(&report.msg);
    } else if report.changed {
        let marker = if report.check_mode { "~".yellow() } else { "✓".green() };
        println!("{} {}", marker, report.msg);
    } else {
        println!("{} {}", "=".dimmed(), report.msg);
    }

    for step in &report.steps {
        let marker = if step.failed {
            "✗".red()
        } else if step.skipped {
            "-".dimmed()
        } else if step.changed {
            "✓".green()
        } else {
            "=".dimmed()
        };
        println!("    {} {} {}", marker, step.name.bold(), step.msg.dimmed());
    }

    if show_diff && let Some(diff) = &report.diff {
        print_diff(diff);
    }
}

/// Render a before/after record as a line diff.
pub fn print_diff(diff: &DiffRecord) {
    let before = render_map(&diff.before);
    let after = render_map(&diff.after);
    let text_diff = similar::TextDiff::from_lines(&before, &after);
    let mut has_changes = false;

    for change in text_diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                has_changes = true;
                print!("    {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                has_changes = true;
                print!("    {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }

    if !has_changes {
        println!("    {}", "(no field changes)".dimmed());
    }
}

/// One `key: value` line per field, keys in sorted order.
fn render_map(map: &BTreeMap<String, Value>) -> String {
    map.iter()
        .map(|(key, value)| format!("{key}: {value}\n"))
        .collect()
}

/// Print batch totals
pub fn summary(summary: &BatchSummary, check_mode: bool) {
    println!();
    let verb = if check_mode { "would change" } else { "changed" };
    let line = format!(
        "{} {verb} ({} created, {} updated, {} deleted), {} unchanged, {} failed",
        summary.total_changes(),
        summary.created,
        summary.updated,
        summary.deleted,
        summary.unchanged,
        summary.failed
    );
    if summary.is_success() {
        success(&line);
    } else {
        warn(&line);
    }
}
