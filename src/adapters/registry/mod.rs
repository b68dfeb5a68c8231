pub mod file_registry;
pub mod memory_registry;
