use colored::Colorize;

use crate::cli::KeysAction;
use crate::cli::commands::audit_helpers::{self, AuditEvent};
use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::{EnvaultError, Result};
use crate::core::models::audit_entry::AuditAction;
use crate::core::models::key::{Key, KeyKind, KeyMaterial, StorageType};

/// Execute `envault keys <action>`.
pub fn execute(action: &KeysAction) -> Result<()> {
    match action {
        KeysAction::Create {
            name,
            key_type,
            size,
        } => create(name, key_type.as_deref(), size.as_deref()),
        KeysAction::Get { name, json } => get(name, *json),
        KeysAction::List => list(),
    }
}

fn create(name: &str, key_type: Option<&str>, size: Option<&str>) -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;
    let service = context::envelope_service(dir, &config)?;

    let sp = output::spinner(&format!("Creating key '{name}'..."));
    let result = service.registry.create_key(name, key_type, size);
    sp.finish_and_clear();

    let key = match result {
        Ok(key) => key,
        Err(e) => {
            audit_helpers::log_audit(AuditEvent::failure(AuditAction::KeyCreate, Some(name), &e));
            return Err(e);
        }
    };

    output::success(&format!("Created key '{}'", key.name));
    print_key(&key);
    if key.storage == StorageType::Local && key.kind() != KeyKind::Symmetric {
        output::warning("Key pair generated locally; its private half stays in the local registry");
    }

    audit_helpers::log_audit(
        AuditEvent::success(AuditAction::KeyCreate, Some(name))
            .detail(format!("{} {}", key.kind(), describe_size(&key))),
    );
    Ok(())
}

fn get(name: &str, json: bool) -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;
    let service = context::envelope_service(dir, &config)?;

    let key = match service.registry.get_key(name) {
        Ok(key) => key,
        Err(e) => {
            audit_helpers::log_audit(AuditEvent::failure(AuditAction::KeyGet, Some(name), &e));
            return Err(e);
        }
    };
    audit_helpers::log_audit(AuditEvent::success(AuditAction::KeyGet, Some(name)));

    if json {
        let out = serde_json::to_string_pretty(&key).map_err(|e| EnvaultError::InvalidInput {
            detail: format!("Cannot serialize key: {e}"),
        })?;
        println!("{out}");
        return Ok(());
    }

    output::header(&format!("Key '{}'", key.name));
    print_key(&key);
    Ok(())
}

fn list() -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;
    let service = context::envelope_service(dir, &config)?;
    let keys = service.registry.list_local()?;

    if keys.is_empty() {
        output::header("envault keys");
        output::warning("No keys in the local registry");
        println!("  Run 'envault keys create <name>' to create one.");
        return Ok(());
    }

    output::header(&format!("envault keys ({})", keys.len()));
    println!();
    for key in &keys {
        println!(
            "  {:<24} {:<4} {:<10} {:<7} {}",
            key.name.bold(),
            key.kind().tag(),
            describe_size(&key),
            storage_label(key.storage),
            key.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        );
    }
    Ok(())
}

fn print_key(key: &Key) {
    output::field("Type", key.kind().tag());
    output::field("Size", &describe_size(key));
    output::field("Storage", storage_label(key.storage));
    output::field("Created", &key.created_at.to_rfc3339());

    if let KeyMaterial::Asymmetric {
        key_id,
        public_key_pem,
        ..
    } = &key.material
    {
        output::field("Key ID", key_id);
        println!();
        for line in public_key_pem.lines() {
            println!("    {line}");
        }
    }
}

fn describe_size(key: &Key) -> String {
    match &key.material {
        KeyMaterial::Symmetric { secret } => format!("{} bits", secret.len() * 8),
        KeyMaterial::Asymmetric {
            size_bits,
            curve: Some(curve),
            ..
        } => format!("{curve} ({size_bits} bits)"),
        KeyMaterial::Asymmetric { size_bits, .. } => format!("{size_bits} bits"),
    }
}

fn storage_label(storage: StorageType) -> &'static str {
    match storage {
        StorageType::Secret => "secret",
        StorageType::Key => "vault",
        StorageType::Local => "local",
    }
}
