use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use crate::adapters::registry::file_registry::FileKeyRegistry;
use crate::adapters::storage::fs_storage::FsObjectStorage;
use crate::adapters::vault::azure_key_vault::AzureKeyVault;
use crate::adapters::vault::offline_vault::OfflineVault;
use crate::cli::output;
use crate::config::app_config::AppConfig;
use crate::core::errors::{EnvaultError, Result};
use crate::core::models::stored_object::StorageLocation;
use crate::core::services::envelope_service::EnvelopeService;
use crate::core::services::key_registry::KeyRegistry;
use crate::core::traits::remote_vault::RemoteKeyVault;

static ENVAULT_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Envelope service as wired up by the CLI.
pub type CliEnvelopeService = EnvelopeService<Box<dyn RemoteKeyVault>, FileKeyRegistry>;

/// Initialize the global envault directory path.
/// If `custom` is provided, uses that path; otherwise defaults to `.envault`.
pub fn init(custom: Option<&str>) {
    let dir = custom
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".envault"));
    let _ = ENVAULT_DIR.set(dir);
}

/// Get the current envault directory path.
pub fn envault_dir() -> &'static Path {
    ENVAULT_DIR
        .get()
        .map(|p| p.as_path())
        .unwrap_or(Path::new(".envault"))
}

/// The envault directory, failing if `envault init` has not run.
pub fn require_initialized() -> Result<&'static Path> {
    let dir = envault_dir();
    if !dir.exists() {
        return Err(EnvaultError::InvalidConfig {
            detail: format!(
                "Envault not initialized ({} missing). Run 'envault init' first.",
                dir.display()
            ),
        });
    }
    Ok(dir)
}

/// Connect to the configured vault and open the local registry.
pub fn envelope_service(dir: &Path, config: &AppConfig) -> Result<CliEnvelopeService> {
    let vault: Box<dyn RemoteKeyVault> = match config.azure()? {
        Some(azure) => {
            let sp = output::spinner(&format!("Connecting to key vault {}...", azure.vault_name));
            let vault = AzureKeyVault::connect(azure)?;
            sp.finish_and_clear();
            if !vault.is_available() {
                output::warning("Key vault unreachable, working from the local registry only");
            }
            Box::new(vault)
        }
        None => Box::new(OfflineVault::new()),
    };
    build_service(vault, dir, config)
}

/// Envelope service that never contacts the vault. For envelopes that
/// carry their own key, where no lookup happens.
pub fn local_envelope_service(dir: &Path, config: &AppConfig) -> Result<CliEnvelopeService> {
    build_service(Box::new(OfflineVault::new()), dir, config)
}

fn build_service(
    vault: Box<dyn RemoteKeyVault>,
    dir: &Path,
    config: &AppConfig,
) -> Result<CliEnvelopeService> {
    let registry = KeyRegistry::new(vault, FileKeyRegistry::new(dir.join(&config.registry.file)))
        .with_defaults(config.key_defaults()?)
        .with_retry(config.retry_policy());

    Ok(EnvelopeService::new(registry).with_max_payload(config.storage.max_file_size))
}

/// Open the configured document storage.
pub fn object_storage(dir: &Path, config: &AppConfig) -> Result<FsObjectStorage> {
    let locations = config
        .storage_locations(dir)
        .into_iter()
        .map(|(code, description, path)| (StorageLocation { code, description }, path))
        .collect();
    FsObjectStorage::new(locations, &config.storage.default_location)
}

/// Validate a storage location code.
///
/// Codes name directories, so only ASCII alphanumerics, `-` and `_` are
/// allowed.
pub fn validate_location_code(code: &str) -> Result<()> {
    if code.is_empty()
        || !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EnvaultError::InvalidConfig {
            detail: format!(
                "Invalid storage location code '{code}'. Use letters, digits, '-' or '_'."
            ),
        });
    }
    Ok(())
}

/// Validate a relative directory path: no absolute paths, no `..`.
pub fn validate_relative_path(path: &str, what: &str) -> Result<()> {
    let p = Path::new(path);
    let escapes = p
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.trim().is_empty() || escapes {
        return Err(EnvaultError::InvalidConfig {
            detail: format!("Invalid {what} '{path}': must be a relative path inside .envault/"),
        });
    }
    Ok(())
}

/// Validate that a configured file name has no directory components.
pub fn validate_simple_filename(name: &str, what: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(EnvaultError::InvalidConfig {
            detail: format!("Invalid {what} '{name}': must be a plain file name"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_codes() {
        assert!(validate_location_code("eu-west_1").is_ok());
        assert!(validate_location_code("").is_err());
        assert!(validate_location_code("../x").is_err());
        assert!(validate_location_code("a b").is_err());
    }

    #[test]
    fn relative_paths() {
        assert!(validate_relative_path("docs/eu", "path").is_ok());
        assert!(validate_relative_path("./docs", "path").is_ok());
        assert!(validate_relative_path("../docs", "path").is_err());
        assert!(validate_relative_path("docs/../../x", "path").is_err());
        assert!(validate_relative_path("/etc", "path").is_err());
        assert!(validate_relative_path("", "path").is_err());
    }

    #[test]
    fn simple_filenames() {
        assert!(validate_simple_filename("audit.log", "audit log file").is_ok());
        assert!(validate_simple_filename("..", "audit log file").is_err());
        assert!(validate_simple_filename("logs/audit.log", "audit log file").is_err());
        assert!(validate_simple_filename("C:\\audit.log", "audit log file").is_err());
    }
}
