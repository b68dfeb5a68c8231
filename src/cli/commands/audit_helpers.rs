use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::adapters::audit::json_audit_logger::JsonAuditLogger;
use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::EnvaultError;
use crate::core::models::audit_entry::{AuditAction, AuditEntry, AuditOutcome};
use crate::core::traits::audit::AuditLogger;

/// One audited operation, before it is stamped and written.
pub struct AuditEvent<'a> {
    pub action: AuditAction,
    pub key_name: Option<&'a str>,
    pub files: Vec<String>,
    pub detail: Option<String>,
    pub outcome: AuditOutcome,
    pub state_hash: Option<String>,
}

impl<'a> AuditEvent<'a> {
    pub fn success(action: AuditAction, key_name: Option<&'a str>) -> Self {
        Self {
            action,
            key_name,
            files: Vec::new(),
            detail: None,
            outcome: AuditOutcome::Success,
            state_hash: None,
        }
    }

    pub fn failure(action: AuditAction, key_name: Option<&'a str>, err: &EnvaultError) -> Self {
        let reason = err.to_string();
        Self {
            detail: reason.lines().next().map(str::to_string),
            outcome: AuditOutcome::Failure,
            ..Self::success(action, key_name)
        }
    }

    pub fn files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn state_hash(mut self, hash: String) -> Self {
        self.state_hash = Some(hash);
        self
    }
}

/// Login name of the person running the command.
pub fn current_author() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// SHA-256 of an envelope document, hex encoded.
pub fn envelope_hash(document: &[u8]) -> String {
    hex::encode(Sha256::digest(document))
}

/// Record an audit event. Warns on failure instead of propagating
/// the error, since audit should not block the main operation.
pub fn log_audit(event: AuditEvent<'_>) {
    let dir = context::envault_dir();
    let config = AppConfig::load(dir).ok();
    let audit_section = config.as_ref().and_then(|c| c.audit.as_ref());

    let Some(logger) = JsonAuditLogger::recording(dir, audit_section) else {
        return;
    };
    let entry = AuditEntry {
        timestamp: Utc::now(),
        author: current_author(),
        action: event.action,
        key_name: event.key_name.map(str::to_string),
        files: event.files,
        detail: event.detail,
        outcome: event.outcome,
        state_hash: event.state_hash,
    };

    if let Err(e) = logger.log_event(&entry) {
        output::warning(&format!("Could not write audit log: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_hash_is_sha256_hex() {
        assert_eq!(
            envelope_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn failure_event_keeps_first_line_only() {
        let err = EnvaultError::KeyNotFound {
            name: "ghost".into(),
        };
        let event = AuditEvent::failure(AuditAction::Decrypt, Some("ghost"), &err);
        assert_eq!(event.outcome, AuditOutcome::Failure);
        assert_eq!(event.detail.as_deref(), Some("Key 'ghost' not found"));
    }
}
