pub mod audit_entry;
pub mod envelope;
pub mod key;
pub mod key_record;
pub mod remote;
pub mod stored_object;
