/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Domain models for signature records.
//!
//! Embedded and detached signatures share one record shape. The
//! [`SignatureKind`] tag says where the signature bytes live: inside the
//! document file itself, or in a separate blob stored with the record.

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the signature of a record lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignatureKind {
    /// The document file is itself an OpenPGP signed message.
    Embedded,
    /// Raw binary OpenPGP signature stored next to the unmodified file.
    Detached {
        #[serde(skip)]
        signature_file: Vec<u8>,
    },
}

impl SignatureKind {
    pub fn label(&self) -> &'static str {
        match self {
            SignatureKind::Embedded => "embedded",
            SignatureKind::Detached { .. } => "detached",
        }
    }
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields recovered from verifying a signature.
///
/// `key_id` is known as soon as the signature parses, even when the signer's
/// key is not. `signature_id` and `public_key_fingerprint` stay `None` until
/// the signer's key is present in the key repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDetails {
    pub date_time: Option<UniversalTimestamp>,
    pub key_id: String,
    pub signature_id: Option<String>,
    pub public_key_fingerprint: Option<String>,
}

/// Domain model for a stored signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: UniversalUuid,
    pub document_file_id: UniversalUuid,
    #[serde(flatten)]
    pub kind: SignatureKind,
    #[serde(flatten)]
    pub details: SignatureDetails,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl SignatureRecord {
    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, SignatureKind::Embedded)
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.kind, SignatureKind::Detached { .. })
    }

    /// The detached signature blob, if this is a detached record.
    pub fn signature_file(&self) -> Option<&[u8]> {
        match &self.kind {
            SignatureKind::Detached { signature_file } => Some(signature_file),
            SignatureKind::Embedded => None,
        }
    }

    /// True once the signature has been matched to a known key.
    pub fn is_verified(&self) -> bool {
        self.details.signature_id.is_some()
    }
}

/// Model for inserting a signature record.
#[derive(Debug, Clone)]
pub struct NewSignatureRecord {
    pub document_file_id: UniversalUuid,
    pub kind: SignatureKind,
    pub details: SignatureDetails,
}

impl NewSignatureRecord {
    pub fn embedded(document_file_id: UniversalUuid, details: SignatureDetails) -> Self {
        Self {
            document_file_id,
            kind: SignatureKind::Embedded,
            details,
        }
    }

    pub fn detached(document_file_id: UniversalUuid, signature_file: Vec<u8>) -> Self {
        Self {
            document_file_id,
            kind: SignatureKind::Detached { signature_file },
            details: SignatureDetails::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_accessors() {
        let new = NewSignatureRecord::detached(UniversalUuid::new_v4(), vec![1, 2, 3]);
        let record = SignatureRecord {
            id: UniversalUuid::new_v4(),
            document_file_id: new.document_file_id,
            kind: new.kind,
            details: new.details,
            created_at: UniversalTimestamp::now(),
            updated_at: UniversalTimestamp::now(),
        };

        assert!(record.is_detached());
        assert!(!record.is_embedded());
        assert_eq!(record.signature_file(), Some(&[1u8, 2, 3][..]));
        assert!(!record.is_verified());
        assert_eq!(record.kind.to_string(), "detached");
    }

    #[test]
    fn test_serialized_record_omits_blob() {
        let record = SignatureRecord {
            id: UniversalUuid::new_v4(),
            document_file_id: UniversalUuid::new_v4(),
            kind: SignatureKind::Detached {
                signature_file: vec![0xde, 0xad],
            },
            details: SignatureDetails {
                key_id: "89ABCDEF".to_string(),
                signature_id: Some("abc".to_string()),
                ..Default::default()
            },
            created_at: UniversalTimestamp::now(),
            updated_at: UniversalTimestamp::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "detached");
        assert_eq!(json["key_id"], "89ABCDEF");
        assert!(json.get("signature_file").is_none());
    }
}
