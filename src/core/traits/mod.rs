pub mod audit;
pub mod local_registry;
pub mod object_storage;
pub mod remote_vault;
