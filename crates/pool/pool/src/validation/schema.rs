//! Structural schemas for transaction payloads.

use std::fmt::Debug;

/// Checks that a payload is well-formed for the application the node is running.
///
/// Implementations must be pure: the same payload always gives the same answer.
pub trait TxSchema: Debug + Send + Sync {
    /// Returns a human readable reason when the payload is malformed.
    fn check(&self, payload: &[u8]) -> Result<(), String>;
}

/// The `key=value` format of a key/value store application.
///
/// The payload is split at its first `=`. The key must be non-empty printable ASCII; the value is
/// arbitrary and may itself contain `=`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvSchema;

impl TxSchema for KvSchema {
    fn check(&self, payload: &[u8]) -> Result<(), String> {
        let Some(split) = payload.iter().position(|b| *b == b'=') else {
            return Err("missing '=' separator".to_string());
        };

        let key = &payload[..split];
        if key.is_empty() {
            return Err("empty key".to_string());
        }

        if let Some(pos) = key.iter().position(|b| !b.is_ascii_graphic()) {
            return Err(format!("key contains a non-printable byte at offset {pos}"));
        }

        Ok(())
    }
}
