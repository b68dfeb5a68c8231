use std::io::Read;
use std::path::{Path, PathBuf};

use crate::cli::commands::audit_helpers::{self, AuditEvent};
use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::{EnvaultError, Result};
use crate::core::models::audit_entry::AuditAction;
use crate::core::models::envelope::Envelope;

/// Where the payload comes from.
enum Source {
    File(PathBuf),
    Inline(String),
    Stdin,
}

/// Execute the `envault encrypt` command.
///
/// Produces an envelope and writes it to stdout, to `--out`, or to
/// document storage with `--store`.
pub fn execute(
    file: Option<&str>,
    key: &str,
    data: Option<&str>,
    store: bool,
    location: Option<&str>,
    out: Option<&str>,
) -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;

    let source = match (file, data) {
        (Some(f), _) => Source::File(PathBuf::from(f)),
        (None, Some(d)) => Source::Inline(d.to_string()),
        (None, None) => Source::Stdin,
    };
    let (payload, file_name) = read_payload(&source, config.storage.max_file_size)?;
    let is_file = matches!(source, Source::File(_));

    let service = context::envelope_service(dir, &config)?;
    let envelope = match service.encrypt(&payload, key, is_file, file_name.as_deref()) {
        Ok(envelope) => envelope,
        Err(e) => {
            audit_helpers::log_audit(
                AuditEvent::failure(AuditAction::Encrypt, Some(key), &e)
                    .files(file_name.into_iter().collect()),
            );
            return Err(e);
        }
    };
    let document = envelope.to_json()?;
    let hash = audit_helpers::envelope_hash(document.as_bytes());

    let destination = if store {
        let storage = context::object_storage(dir, &config)?;
        let stored = service.store_envelope(&envelope, &storage, location)?;
        output::success(&format!(
            "Stored {} in location '{}' ({} bytes)",
            stored.name, stored.location, stored.size
        ));
        Some(format!("{}:{}", stored.location, stored.name))
    } else if let Some(out) = out {
        std::fs::write(out, &document)?;
        print_summary(&envelope);
        output::success(&format!("Envelope written to {out}"));
        Some(out.to_string())
    } else {
        println!("{document}");
        None
    };

    let mut files: Vec<String> = file_name.into_iter().collect();
    files.extend(destination);
    audit_helpers::log_audit(
        AuditEvent::success(AuditAction::Encrypt, Some(key))
            .files(files)
            .detail(format!(
                "{} envelope, {} bytes",
                envelope.encryption_type.as_str(),
                envelope.original_size
            ))
            .state_hash(hash),
    );
    Ok(())
}

/// Read the payload, refusing files over the size limit before reading them.
fn read_payload(source: &Source, limit: usize) -> Result<(Vec<u8>, Option<String>)> {
    match source {
        Source::File(path) => {
            if !path.is_file() {
                return Err(EnvaultError::FileNotFound { path: path.clone() });
            }
            let size = std::fs::metadata(path)?.len() as usize;
            if size > limit {
                return Err(EnvaultError::payload_too_large(size, limit));
            }
            Ok((std::fs::read(path)?, Some(display_name(path))))
        }
        Source::Inline(text) => Ok((text.as_bytes().to_vec(), None)),
        Source::Stdin => Ok((read_limited(std::io::stdin().lock(), limit)?, None)),
    }
}

/// Read at most `limit` bytes, failing as soon as the stream goes past it.
fn read_limited(reader: impl Read, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)?;
    if buf.len() > limit {
        return Err(EnvaultError::payload_too_large(buf.len(), limit));
    }
    Ok(buf)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_summary(envelope: &Envelope) {
    output::field("Key", &envelope.key_name);
    output::field("Type", envelope.encryption_type.as_str());
    output::field("Size", &format!("{} -> {} bytes", envelope.original_size, envelope.encrypted_size));
    if envelope.temp_key.is_some() {
        output::warning("Asymmetric envelopes carry their ephemeral key: anyone holding the envelope can decrypt it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_within_limit_is_read_whole() {
        let data = vec![1u8; 64];
        assert_eq!(read_limited(data.as_slice(), 64).unwrap(), data);
    }

    #[test]
    fn stream_over_limit_stops_one_byte_past_it() {
        let data = vec![1u8; 4096];
        match read_limited(data.as_slice(), 100) {
            Err(EnvaultError::PayloadTooLarge { size, limit, .. }) => {
                assert_eq!(size, 101);
                assert_eq!(limit, 100);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }
}
