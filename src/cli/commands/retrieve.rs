use crate::cli::commands::audit_helpers::{self, AuditEvent};
use crate::cli::commands::decrypt::write_plaintext;
use crate::cli::context;
use crate::config::app_config::AppConfig;
use crate::core::errors::Result;
use crate::core::models::audit_entry::AuditAction;

/// Execute the `envault retrieve` command.
pub fn execute(
    name: &str,
    key: Option<&str>,
    location: Option<&str>,
    out: Option<&str>,
) -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;
    let storage = context::object_storage(dir, &config)?;
    let service = context::envelope_service(dir, &config)?;

    let document = match service.retrieve_document(&storage, name, key, location) {
        Ok(doc) => doc,
        Err(e) => {
            audit_helpers::log_audit(
                AuditEvent::failure(AuditAction::Retrieve, key, &e).files(vec![name.to_string()]),
            );
            return Err(e);
        }
    };

    write_plaintext(&document.decrypted, out)?;

    let key_name = key.or_else(|| document.metadata.get("keyName").map(String::as_str));
    audit_helpers::log_audit(
        AuditEvent::success(AuditAction::Retrieve, key_name)
            .files(vec![format!("{}:{name}", document.location)])
            .detail(format!("{} bytes", document.decrypted.decrypted_size)),
    );
    Ok(())
}
