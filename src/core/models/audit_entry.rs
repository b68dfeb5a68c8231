use serde::{Deserialize, Serialize};

/// Actions that get recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Init,
    KeyCreate,
    KeyGet,
    Encrypt,
    Decrypt,
    Retrieve,
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "init" => Ok(AuditAction::Init),
            "key_create" => Ok(AuditAction::KeyCreate),
            "key_get" => Ok(AuditAction::KeyGet),
            "encrypt" => Ok(AuditAction::Encrypt),
            "decrypt" => Ok(AuditAction::Decrypt),
            "retrieve" => Ok(AuditAction::Retrieve),
            other => Err(format!("unknown audit action '{other}'")),
        }
    }
}

/// A single entry in the audit log (JSON lines format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub author: String,
    pub action: AuditAction,
    pub key_name: Option<String>,
    pub files: Vec<String>,
    pub detail: Option<String>,
    pub outcome: AuditOutcome,
    /// SHA-256 of the envelope produced or consumed, when there is one.
    pub state_hash: Option<String>,
}

/// Whether the audited operation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_dashed_and_snake_forms() {
        assert_eq!("key-create".parse::<AuditAction>(), Ok(AuditAction::KeyCreate));
        assert_eq!("key_get".parse::<AuditAction>(), Ok(AuditAction::KeyGet));
        assert!("rotate".parse::<AuditAction>().is_err());
    }
}
