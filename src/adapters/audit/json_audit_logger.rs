use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::app_config::AuditSection;
use crate::core::errors::{EnvaultError, Result};
use crate::core::models::audit_entry::{AuditAction, AuditEntry};
use crate::core::traits::audit::AuditLogger;

/// File name used when the config has no `[audit]` section.
pub const DEFAULT_LOG_FILE: &str = "audit.log";

/// Append-only JSON-lines audit trail, one `AuditEntry` per line.
///
/// Several CLI processes may append at once. Each entry goes out in a
/// single write on a file opened for append, so lines never interleave.
pub struct JsonAuditLogger {
    path: PathBuf,
}

impl JsonAuditLogger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The project's audit log, whether or not recording is enabled.
    pub fn for_project(envault_dir: &Path, section: Option<&AuditSection>) -> Self {
        let file = section.map_or(DEFAULT_LOG_FILE, |a| a.log_file.as_str());
        Self::new(envault_dir.join(file))
    }

    /// Logger to record into, or `None` when `[audit] enabled = false`.
    /// A missing section means enabled.
    pub fn recording(envault_dir: &Path, section: Option<&AuditSection>) -> Option<Self> {
        match section {
            Some(a) if !a.enabled => None,
            _ => Some(Self::for_project(envault_dir, section)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, what: &str, e: impl std::fmt::Display) -> EnvaultError {
        EnvaultError::AuditError {
            detail: format!("{what} {}: {e}", self.path.display()),
        }
    }
}

fn wanted(entry: &AuditEntry, action: Option<AuditAction>, since: Option<DateTime<Utc>>) -> bool {
    action.is_none_or(|a| a == entry.action) && since.is_none_or(|s| entry.timestamp >= s)
}

impl AuditLogger for JsonAuditLogger {
    fn log_event(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry).map_err(|e| EnvaultError::AuditError {
            detail: format!("Failed to serialize audit entry: {e}"),
        })?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&line))
            .map_err(|e| self.error("Cannot append to audit log", e))?;

        debug!(action = ?entry.action, outcome = ?entry.outcome, "audit entry written");
        Ok(())
    }

    fn query(
        &self,
        action: Option<AuditAction>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error("Cannot read audit log", e)),
        };

        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.error("Cannot read audit log", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry =
                serde_json::from_str(&line).map_err(|e| EnvaultError::AuditError {
                    detail: format!("Malformed audit entry at line {}: {e}", idx + 1),
                })?;
            if wanted(&entry, action, since) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::audit_entry::AuditOutcome;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(key: &str, action: AuditAction) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            author: "alice".to_string(),
            action,
            key_name: Some(key.to_string()),
            files: vec!["report.pdf".to_string()],
            detail: None,
            outcome: AuditOutcome::Success,
            state_hash: None,
        }
    }

    fn temp_logger() -> (TempDir, JsonAuditLogger) {
        let tmp = TempDir::new().unwrap();
        let logger = JsonAuditLogger::for_project(tmp.path(), None);
        (tmp, logger)
    }

    #[test]
    fn entries_are_read_back_in_order() {
        let (_tmp, logger) = temp_logger();
        logger.log_event(&entry("doc-key", AuditAction::KeyCreate)).unwrap();
        logger.log_event(&entry("doc-key", AuditAction::Encrypt)).unwrap();
        logger.log_event(&entry("doc-key", AuditAction::Encrypt)).unwrap();

        let all = logger.query(None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, AuditAction::KeyCreate);

        let encrypts = logger.query(Some(AuditAction::Encrypt), None).unwrap();
        assert_eq!(encrypts.len(), 2);
    }

    #[test]
    fn since_drops_older_entries() {
        let (_tmp, logger) = temp_logger();
        let old = AuditEntry {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ..entry("old-key", AuditAction::Init)
        };
        let recent = AuditEntry {
            timestamp: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
            ..entry("new-key", AuditAction::Decrypt)
        };
        logger.log_event(&old).unwrap();
        logger.log_event(&recent).unwrap();

        let cutoff = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let results = logger.query(None, Some(cutoff)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key_name.as_deref(), Some("new-key"));
    }

    #[test]
    fn missing_log_is_empty() {
        let logger = JsonAuditLogger::new(PathBuf::from("/nonexistent/audit.log"));
        assert!(logger.query(None, None).unwrap().is_empty());
    }

    #[test]
    fn malformed_line_is_reported_with_line_number() {
        let (_tmp, logger) = temp_logger();
        logger.log_event(&entry("doc-key", AuditAction::Init)).unwrap();
        let mut file = OpenOptions::new().append(true).open(logger.path()).unwrap();
        writeln!(file, "{{}}").unwrap();

        let err = logger.query(None, None).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn concurrent_appends_keep_whole_lines() {
        let (_tmp, logger) = temp_logger();
        std::thread::scope(|s| {
            for i in 0..8 {
                let logger = JsonAuditLogger::new(logger.path().to_path_buf());
                s.spawn(move || {
                    for _ in 0..20 {
                        logger.log_event(&entry(&format!("k{i}"), AuditAction::KeyGet)).unwrap();
                    }
                });
            }
        });
        assert_eq!(logger.query(None, None).unwrap().len(), 160);
    }

    #[test]
    fn recording_follows_config() {
        let tmp = TempDir::new().unwrap();
        let disabled = AuditSection {
            enabled: false,
            log_file: "trail.log".to_string(),
        };

        assert!(JsonAuditLogger::recording(tmp.path(), None).is_some());
        assert!(JsonAuditLogger::recording(tmp.path(), Some(&disabled)).is_none());
        assert_eq!(
            JsonAuditLogger::for_project(tmp.path(), Some(&disabled)).path(),
            tmp.path().join("trail.log")
        );
    }
}
