use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapters::vault::azure_key_vault::AzureVaultConfig;
use crate::core::errors::{EnvaultError, Result};
use crate::core::services::envelope_service::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::core::services::key_policy::KeyDefaults;
use crate::core::services::key_registry::RetryPolicy;

/// Top-level configuration read from `.envault/config.toml`.
///
/// Every section is optional; a missing section means its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub envault: EnvaultSection,
    #[serde(default)]
    pub keys: KeysSection,
    #[serde(default)]
    pub vault: VaultSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub registry: RegistrySection,
    pub audit: Option<AuditSection>,
}

impl AppConfig {
    /// Load `.envault/config.toml` and apply environment overrides.
    ///
    /// After parsing, validates location codes and file names to prevent
    /// path traversal from a compromised config file.
    pub fn load(envault_dir: &Path) -> Result<Self> {
        let config_path = envault_dir.join("config.toml");
        if !config_path.exists() {
            return Err(EnvaultError::InvalidConfig {
                detail: "config.toml not found. Run 'envault init' first.".into(),
            });
        }
        let content = std::fs::read_to_string(&config_path)?;
        let mut config = Self::parse(&content)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EnvaultError::InvalidConfig {
            detail: format!("Failed to parse config.toml: {e}"),
        })
    }

    /// Overlay values from the environment (`KEY_VAULT_NAME`, ...).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(name) = get("KEY_VAULT_NAME") {
            self.vault.name = Some(name);
        }
        if let Some(tenant) = get("AZURE_TENANT_ID") {
            self.vault.tenant_id = Some(tenant);
        }
        if let Some(client) = get("AZURE_CLIENT_ID") {
            self.vault.client_id = Some(client);
        }
        if let Some(secret) = get("AZURE_CLIENT_SECRET") {
            self.vault.client_secret = Some(secret);
        }
        if let Some(raw) = get("KEY_VAULT_MAX_RETRIES") {
            self.vault.max_retries = parse_number("KEY_VAULT_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = get("KEY_VAULT_RETRY_DELAY") {
            self.vault.retry_delay_ms = parse_number("KEY_VAULT_RETRY_DELAY", &raw)?;
        }
        if let Some(raw) = get("MAX_FILE_SIZE") {
            self.storage.max_file_size = parse_number("MAX_FILE_SIZE", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (code, location) in &self.storage.locations {
            crate::cli::context::validate_location_code(code)?;
            crate::cli::context::validate_relative_path(&location.path, "storage location path")?;
        }
        if !self.storage.locations.is_empty()
            && !self.storage.locations.contains_key(&self.storage.default_location)
        {
            return Err(EnvaultError::InvalidConfig {
                detail: format!(
                    "Default storage location '{}' is not defined under [storage.locations]",
                    self.storage.default_location
                ),
            });
        }
        crate::cli::context::validate_simple_filename(&self.registry.file, "registry file")?;
        if let Some(audit) = &self.audit {
            crate::cli::context::validate_simple_filename(&audit.log_file, "audit log file")?;
        }
        self.key_defaults()?;
        Ok(())
    }

    /// Key creation defaults from `[keys]`.
    pub fn key_defaults(&self) -> Result<KeyDefaults> {
        Ok(KeyDefaults {
            key_type: self.keys.default_type.parse()?,
            symmetric_bits: self.keys.symmetric_bits,
            asymmetric_bits: self.keys.asymmetric_bits,
            curve: self.keys.default_curve.parse()?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.vault.max_retries,
            delay: Duration::from_millis(self.vault.retry_delay_ms),
        }
    }

    /// Azure connection settings, or `None` when no vault is configured.
    pub fn azure(&self) -> Result<Option<AzureVaultConfig>> {
        let Some(vault_name) = self.vault.name.clone().filter(|n| !n.trim().is_empty()) else {
            return Ok(None);
        };

        let require = |value: &Option<String>, var: &str| {
            value.clone().ok_or_else(|| EnvaultError::InvalidConfig {
                detail: format!("Key vault '{vault_name}' is configured but {var} is not set"),
            })
        };

        Ok(Some(AzureVaultConfig {
            tenant_id: require(&self.vault.tenant_id, "AZURE_TENANT_ID")?,
            client_id: require(&self.vault.client_id, "AZURE_CLIENT_ID")?,
            client_secret: require(&self.vault.client_secret, "AZURE_CLIENT_SECRET")?,
            timeout: Duration::from_secs(self.vault.timeout_secs),
            vault_name,
        }))
    }

    /// Storage locations as `(code, description, directory)`, resolved
    /// against the envault directory. Falls back to a single `default`
    /// location under `documents/`.
    pub fn storage_locations(&self, envault_dir: &Path) -> Vec<(String, String, PathBuf)> {
        if self.storage.locations.is_empty() {
            return vec![(
                self.storage.default_location.clone(),
                "Local documents".to_string(),
                envault_dir.join("documents"),
            )];
        }
        self.storage
            .locations
            .iter()
            .map(|(code, loc)| {
                (
                    code.clone(),
                    loc.description.clone().unwrap_or_else(|| code.clone()),
                    envault_dir.join(&loc.path),
                )
            })
            .collect()
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| EnvaultError::InvalidConfig {
        detail: format!("{var} must be a non-negative integer, got '{raw}'"),
    })
}

/// The `[envault]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvaultSection {
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for EnvaultSection {
    fn default() -> Self {
        Self {
            version: default_version(),
        }
    }
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// The `[keys]` section: defaults for `envault keys create`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeysSection {
    #[serde(default = "default_key_type")]
    pub default_type: String,
    #[serde(default = "default_symmetric_bits")]
    pub symmetric_bits: u32,
    #[serde(default = "default_asymmetric_bits")]
    pub asymmetric_bits: u32,
    #[serde(default = "default_curve")]
    pub default_curve: String,
}

impl Default for KeysSection {
    fn default() -> Self {
        Self {
            default_type: default_key_type(),
            symmetric_bits: default_symmetric_bits(),
            asymmetric_bits: default_asymmetric_bits(),
            default_curve: default_curve(),
        }
    }
}

fn default_key_type() -> String {
    "AES".into()
}

fn default_symmetric_bits() -> u32 {
    256
}

fn default_asymmetric_bits() -> u32 {
    2048
}

fn default_curve() -> String {
    "P-256".into()
}

/// The `[vault]` section. Credentials usually come from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultSection {
    pub name: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            name: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}

/// The `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    #[serde(default = "default_location")]
    pub default_location: String,
    #[serde(default)]
    pub locations: BTreeMap<String, LocationEntry>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            default_location: default_location(),
            locations: BTreeMap::new(),
        }
    }
}

fn default_max_file_size() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_location() -> String {
    "default".into()
}

/// A `[storage.locations.<code>]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationEntry {
    /// Directory, relative to `.envault/`.
    pub path: String,
    pub description: Option<String>,
}

/// The `[registry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    #[serde(default = "default_registry_file")]
    pub file: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            file: default_registry_file(),
        }
    }
}

fn default_registry_file() -> String {
    "keys.json".into()
}

/// The `[audit]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSection {
    pub enabled: bool,
    pub log_file: String,
}
