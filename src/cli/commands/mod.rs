pub mod audit_helpers;
pub mod decrypt;
pub mod encrypt;
pub mod files;
pub mod init;
pub mod keys;
pub mod log;
pub mod retrieve;
