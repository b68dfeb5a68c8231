pub mod fs_storage;
