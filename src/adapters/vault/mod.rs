pub mod azure_key_vault;
pub mod offline_vault;
