use chrono::{NaiveDate, TimeZone, Utc};
use colored::Colorize;

use crate::adapters::audit::json_audit_logger::JsonAuditLogger;
use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::{EnvaultError, Result};
use crate::core::models::audit_entry::{AuditAction, AuditEntry, AuditOutcome};
use crate::core::traits::audit::AuditLogger;

/// Execute the `envault log` command.
///
/// Displays the audit log with optional filters for action, date,
/// and entry count.
pub fn execute(action: Option<&str>, since: Option<&str>, last: Option<usize>) -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;
    let logger = JsonAuditLogger::for_project(dir, config.audit.as_ref());

    let action_filter = action
        .map(|a| a.parse::<AuditAction>())
        .transpose()
        .map_err(|detail| EnvaultError::InvalidInput { detail })?;
    let since_dt = since.map(parse_since).transpose()?;

    let entries = logger.query(action_filter, since_dt)?;

    if entries.is_empty() {
        output::header("envault log");
        output::warning("No audit entries found");
        if action.is_some() || since.is_some() {
            println!("  Try removing filters to see all entries.");
        }
        return Ok(());
    }

    // Apply --last N (take from the end)
    let display: Vec<&AuditEntry> = match last {
        Some(n) => entries
            .iter()
            .rev()
            .take(n)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect(),
        None => entries.iter().collect(),
    };

    output::header(&format!("envault log ({} entries)", display.len()));
    println!();

    for entry in &display {
        print_entry(entry);
    }

    Ok(())
}

/// Parse a date string (ISO 8601: `YYYY-MM-DD`) into a UTC DateTime.
fn parse_since(s: &str) -> Result<chrono::DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| EnvaultError::InvalidInput {
            detail: format!(
                "Invalid date format: '{s}'. Expected ISO 8601 (YYYY-MM-DD), e.g. 2026-01-15"
            ),
        })
        .map(|d| Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).expect("midnight is always valid")))
}

/// Print a single audit entry as a formatted row.
fn print_entry(entry: &AuditEntry) {
    let date = entry.timestamp.format("%Y-%m-%d %H:%M:%S");
    let action = format_action(&entry.action);
    let outcome = match entry.outcome {
        AuditOutcome::Success => "✓".green().to_string(),
        AuditOutcome::Failure => "✗".red().to_string(),
    };
    let key = entry.key_name.as_deref().unwrap_or("-");
    let files = if entry.files.is_empty() {
        String::new()
    } else {
        entry.files.join(", ")
    };
    let detail = entry.detail.as_deref().unwrap_or("").dimmed().to_string();

    println!(
        "  {} {} {} {:<10} {:<16} {} {}",
        date.to_string().dimmed(),
        "│".dimmed(),
        outcome,
        action,
        key,
        files,
        detail,
    );
}

/// Format an AuditAction as a colored string.
fn format_action(action: &AuditAction) -> String {
    match action {
        AuditAction::Init => "init".cyan().to_string(),
        AuditAction::KeyCreate => "key create".green().to_string(),
        AuditAction::KeyGet => "key get".blue().to_string(),
        AuditAction::Encrypt => "encrypt".green().to_string(),
        AuditAction::Decrypt => "decrypt".blue().to_string(),
        AuditAction::Retrieve => "retrieve".yellow().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_parses_iso_date() {
        let dt = parse_since("2026-01-15").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-01-15T00:00:00+00:00");
    }

    #[test]
    fn since_rejects_other_formats() {
        assert!(parse_since("15/01/2026").is_err());
    }
}
