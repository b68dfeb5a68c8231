use std::io::Write;
use std::path::Path;

use crate::cli::commands::audit_helpers::{self, AuditEvent};
use crate::cli::{context, output};
use crate::core::errors::{EnvaultError, Result};
use crate::core::models::audit_entry::AuditAction;

const CONFIG_TEMPLATE: &str = r#"[envault]
version = "0.3.0"

[keys]
default_type = "AES"
symmetric_bits = 256
asymmetric_bits = 2048
default_curve = "P-256"

# Remote key vault. Leave `name` unset to keep every key local.
# Credentials are read from AZURE_TENANT_ID, AZURE_CLIENT_ID and
# AZURE_CLIENT_SECRET.
[vault]
# name = "my-key-vault"
max_retries = 3
retry_delay_ms = 1000
timeout_secs = 10

[storage]
max_file_size = 104857600
default_location = "default"

[storage.locations.default]
path = "documents"
description = "Local documents"

[registry]
file = "keys.json"

[audit]
enabled = true
log_file = "audit.log"
"#;

/// Execute the `envault init` command.
///
/// Creates the envault directory with a default `config.toml` and
/// keeps the local key registry out of version control.
pub fn execute(verbose: bool) -> Result<()> {
    let dir = context::envault_dir();

    if dir.exists() {
        return Err(EnvaultError::InvalidConfig {
            detail: format!(
                "Envault is already initialized in this project ({} exists)",
                dir.display()
            ),
        });
    }

    output::header("envault: initializing project");

    std::fs::create_dir_all(dir.join("documents"))?;
    output::success(&format!("Created {}/", dir.display()));

    std::fs::write(dir.join("config.toml"), CONFIG_TEMPLATE)?;
    output::success("Generated config.toml with defaults");

    add_to_gitignore(&dir.join("keys.json").to_string_lossy())?;

    audit_helpers::log_audit(
        AuditEvent::success(AuditAction::Init, None).detail("project initialized"),
    );

    output::success("Project ready.\n");
    print_next_steps(dir, verbose);
    Ok(())
}

/// Add an entry to .gitignore if not already present.
fn add_to_gitignore(entry: &str) -> Result<()> {
    let gitignore = Path::new(".gitignore");

    if gitignore.exists() {
        let content = std::fs::read_to_string(gitignore)?;
        if content.lines().any(|l| l.trim() == entry) {
            output::success(&format!("{entry} already in .gitignore"));
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new().append(true).open(gitignore)?;
        writeln!(file, "\n# envault: the local key registry holds secrets\n{entry}")?;
    } else {
        std::fs::write(
            gitignore,
            format!("# envault: the local key registry holds secrets\n{entry}\n"),
        )?;
    }

    output::success(&format!("Added {entry} to .gitignore"));
    Ok(())
}

fn print_next_steps(dir: &Path, verbose: bool) {
    println!("  Next steps:");
    println!("     1. Run 'envault keys create doc-key' to create a key");
    println!("     2. Run 'envault encrypt report.pdf --key doc-key --store'");
    println!("     3. Set KEY_VAULT_NAME and the AZURE_* variables to use a remote vault");

    if verbose {
        println!();
        println!("  Files created:");
        println!("     {}/config.toml   envault configuration", dir.display());
        println!("     {}/documents/    default storage location", dir.display());
    }
}
