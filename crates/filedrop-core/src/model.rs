//! File descriptor carried from the watcher to the worker.
//!
//! # Design
//! - Fields are declared in sorted key order so `serde_json` emits a
//!   byte-identical payload for identical inputs.
//! - Decoding validates the invariants the publisher guarantees; anything
//!   else is treated as a malformed payload.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

/// Content type attached to every published descriptor.
pub const CONTENT_TYPE: &str = "application/json";

const SHA256_HEX_LEN: usize = 64;

/// Immutable description of a stable file in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDescriptor {
    /// Lowercase hex SHA-256 digest of the file contents.
    pub content_hash: String,
    /// Modification time in seconds since the Unix epoch.
    pub modified_at: f64,
    /// Final path component of the file.
    pub name: String,
    /// Absolute path of the file inside the inbox.
    #[serde(rename = "path")]
    pub absolute_path: PathBuf,
    /// File size in bytes.
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

impl FileDescriptor {
    /// Serialise the descriptor into a message body.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Serialization`] if the path is not valid UTF-8.
    pub fn encode(&self) -> IngestResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| IngestError::Serialization {
            operation: "descriptor.encode",
            source,
        })
    }

    /// Parse and validate a message body.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Serialization`] for bodies that are not a
    /// descriptor object and [`IngestError::InvalidDescriptor`] for
    /// descriptors that violate a field invariant.
    pub fn decode(body: &[u8]) -> IngestResult<Self> {
        let descriptor: Self =
            serde_json::from_slice(body).map_err(|source| IngestError::Serialization {
                operation: "descriptor.decode",
                source,
            })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Path of the referenced file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.absolute_path
    }

    fn validate(&self) -> IngestResult<()> {
        if !self.absolute_path.is_absolute() {
            return Err(invalid("path", "not_absolute", Some(self.path_label())));
        }
        if self.name.is_empty() {
            return Err(invalid("name", "empty", None));
        }
        let file_name = self.absolute_path.file_name().and_then(|name| name.to_str());
        if file_name != Some(self.name.as_str()) {
            return Err(invalid("name", "path_mismatch", Some(self.name.clone())));
        }
        if self.content_hash.len() != SHA256_HEX_LEN
            || !self
                .content_hash
                .bytes()
                .all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(invalid(
                "content_hash",
                "not_lowercase_sha256_hex",
                Some(self.content_hash.clone()),
            ));
        }
        if !self.modified_at.is_finite() {
            return Err(invalid("modified_at", "not_finite", None));
        }
        Ok(())
    }

    fn path_label(&self) -> String {
        self.absolute_path.to_string_lossy().into_owned()
    }
}

fn invalid(field: &'static str, reason: &'static str, value: Option<String>) -> IngestError {
    IngestError::InvalidDescriptor {
        field,
        reason,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn sample() -> FileDescriptor {
        FileDescriptor {
            content_hash: ABC_SHA256.to_string(),
            modified_at: 1_700_000_000.25,
            name: "hello.txt".to_string(),
            absolute_path: PathBuf::from("/srv/inbox/hello.txt"),
            size_bytes: 3,
        }
    }

    #[test]
    fn encode_emits_sorted_keys() -> Result<()> {
        let body = String::from_utf8(sample().encode()?)?;
        assert_eq!(
            body,
            format!(
                r#"{{"content_hash":"{ABC_SHA256}","modified_at":1700000000.25,"name":"hello.txt","path":"/srv/inbox/hello.txt","size":3}}"#
            )
        );
        Ok(())
    }

    #[test]
    fn decode_restores_every_field() -> Result<()> {
        let original = sample();
        let decoded = FileDescriptor::decode(&original.encode()?)?;
        assert_eq!(decoded, original);
        assert_eq!(decoded.path(), Path::new("/srv/inbox/hello.txt"));
        Ok(())
    }

    #[test]
    fn decode_rejects_non_descriptor_bodies() {
        for body in [
            &b"not json"[..],
            &br#"{"path":"/srv/inbox/a"}"#[..],
            &br#"["content_hash"]"#[..],
        ] {
            let err = FileDescriptor::decode(body).expect_err("body should be rejected");
            assert!(matches!(err, IngestError::Serialization { .. }));
        }
    }

    #[test]
    fn decode_rejects_unknown_fields() -> Result<()> {
        let mut value = serde_json::to_value(sample())?;
        value["extra"] = serde_json::json!(true);
        let err = FileDescriptor::decode(&serde_json::to_vec(&value)?)
            .expect_err("unknown field should be rejected");
        assert_eq!(err.kind(), "serialization");
        Ok(())
    }

    #[test]
    fn decode_validates_field_invariants() -> Result<()> {
        let mut relative = sample();
        relative.absolute_path = PathBuf::from("inbox/hello.txt");
        let err = FileDescriptor::decode(&relative.encode()?).expect_err("relative path");
        assert!(matches!(
            err,
            IngestError::InvalidDescriptor { field: "path", .. }
        ));

        let mut upper = sample();
        upper.content_hash = ABC_SHA256.to_uppercase();
        let err = FileDescriptor::decode(&upper.encode()?).expect_err("uppercase hash");
        assert!(matches!(
            err,
            IngestError::InvalidDescriptor {
                field: "content_hash",
                ..
            }
        ));

        let mut renamed = sample();
        renamed.name = "other.txt".to_string();
        let err = FileDescriptor::decode(&renamed.encode()?).expect_err("name mismatch");
        assert!(matches!(
            err,
            IngestError::InvalidDescriptor { field: "name", .. }
        ));
        Ok(())
    }
}
