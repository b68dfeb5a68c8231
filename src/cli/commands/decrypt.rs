use std::io::{Read, Write};
use std::path::PathBuf;

use crate::cli::commands::audit_helpers::{self, AuditEvent};
use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::{EnvaultError, Result};
use crate::core::models::audit_entry::AuditAction;
use crate::core::models::envelope::{Decrypted, EncryptionType, Envelope};

/// Execute the `envault decrypt` command.
///
/// Reads an envelope from a file or stdin and writes the plaintext to
/// `--out` or stdout.
pub fn execute(file: Option<&str>, key: Option<&str>, out: Option<&str>) -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;

    let raw = match file {
        Some(f) => {
            let path = PathBuf::from(f);
            if !path.is_file() {
                return Err(EnvaultError::FileNotFound { path });
            }
            std::fs::read(&path)?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin().lock().read_to_end(&mut buf)?;
            buf
        }
    };
    let files: Vec<String> = file.map(str::to_string).into_iter().collect();

    let envelope = Envelope::from_slice(&raw)?;
    let service = match envelope.encryption_type {
        EncryptionType::AsymmetricEnvelope => context::local_envelope_service(dir, &config)?,
        EncryptionType::Symmetric => context::envelope_service(dir, &config)?,
    };
    let key_name = key.unwrap_or(envelope.key_name.as_str());

    let decrypted = match service.decrypt(&envelope, key) {
        Ok(d) => d,
        Err(e) => {
            audit_helpers::log_audit(
                AuditEvent::failure(AuditAction::Decrypt, Some(key_name), &e).files(files),
            );
            return Err(e);
        }
    };

    write_plaintext(&decrypted, out)?;
    audit_helpers::log_audit(
        AuditEvent::success(AuditAction::Decrypt, Some(key_name))
            .files(files)
            .detail(format!("{} bytes", decrypted.decrypted_size))
            .state_hash(audit_helpers::envelope_hash(&raw)),
    );
    Ok(())
}

/// Write plaintext to `out`, or raw to stdout when no path is given.
pub fn write_plaintext(decrypted: &Decrypted, out: Option<&str>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, &decrypted.data)?;
            if decrypted.is_file && !decrypted.original_file_name.is_empty() {
                output::detail(&format!("Original file: {}", decrypted.original_file_name));
            }
            output::success(&format!(
                "Decrypted {} bytes to {path}",
                decrypted.decrypted_size
            ));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&decrypted.data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
