use std::fmt;

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// 24-character lowercase hex identifier laid out like a Mongo ObjectId:
/// 4 bytes of big-endian unix seconds followed by 8 random bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let seconds = Utc::now().timestamp() as u32;
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[4..]);
        Self(hex::encode(bytes))
    }

    pub fn parse(value: &str) -> Result<Self> {
        if Self::is_valid(value) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(AppError::Validation(format!("Invalid id: {}", value)))
        }
    }

    pub fn is_valid(value: &str) -> bool {
        value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_object_id_shape() {
        let id = ObjectId::new();
        assert_eq!(id.as_str().len(), 24);
        assert!(ObjectId::is_valid(id.as_str()));
        assert_ne!(id, ObjectId::new());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(ObjectId::parse("not-an-id").is_err());
        assert!(ObjectId::parse("5f8d0d55b54764421b7156c").is_err());
        assert!(ObjectId::parse("5f8d0d55b54764421b7156cz").is_err());
        assert!(ObjectId::parse("5F8D0D55B54764421B7156C9").is_ok());
    }
}
