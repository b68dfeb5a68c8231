pub mod block_cipher;
pub mod envelope_service;
pub mod key_policy;
pub mod key_registry;
pub mod public_key_encoder;
