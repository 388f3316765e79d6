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

//! The backend capability trait and the values it exchanges.
//!
//! Every method is one isolated, blocking operation. Implementations must not
//! let key material imported by one call be visible to any other call.

use crate::models::{fingerprint_suffix, KeyType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a crypto backend.
///
/// `Io`, `Process` and `Timeout` describe the backend failing to run at all.
/// They are transient and distinct from a definite answer such as
/// "this content is not signed".
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Unable to import key: {0}")]
    KeyImport(String),

    #[error("Unable to fetch key: {0}")]
    KeyFetching(String),

    #[error("A passphrase is required to unlock the signing key")]
    NeedPassphrase,

    #[error("The passphrase supplied for the signing key is incorrect")]
    BadPassphrase,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend process failed: {0}")]
    Process(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    /// True for failures worth retrying: the backend could not run, as
    /// opposed to running and giving an answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Io(_) | BackendError::Process(_) | BackendError::Timeout(_)
        )
    }
}

/// Outcome of importing key material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub count: usize,
    /// Fingerprints of the imported primary keys, without duplicates
    pub fingerprints: Vec<String>,
    /// Whether any secret key material was imported
    pub secret: bool,
}

/// Metadata of a single imported key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub fingerprint: String,
    pub key_type: KeyType,
    pub algorithm: i32,
    pub length: i32,
    pub creation_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub uids: Vec<String>,
}

/// Unpersisted key descriptor returned by a keyserver search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStub {
    /// Fingerprint, or long key id when the keyserver does not report one
    pub fingerprint: String,
    pub key_type: KeyType,
    pub algorithm: Option<i32>,
    pub length: Option<i32>,
    pub creation_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub uids: Vec<String>,
}

impl KeyStub {
    /// The last 16 characters of the fingerprint.
    pub fn key_id(&self) -> &str {
        fingerprint_suffix(&self.fingerprint, 16)
    }

    /// First user id, or an empty string.
    pub fn user_id(&self) -> &str {
        self.uids.first().map(String::as_str).unwrap_or_default()
    }
}

/// Options for a sign operation.
#[derive(Clone, Default)]
pub struct SignOptions {
    pub passphrase: Option<String>,
    pub clearsign: bool,
    pub detached: bool,
    /// Binary output; ASCII armor otherwise
    pub binary: bool,
}

impl std::fmt::Debug for SignOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignOptions")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("clearsign", &self.clearsign)
            .field("detached", &self.detached)
            .field("binary", &self.binary)
            .finish()
    }
}

impl SignOptions {
    /// Binary detached signature.
    pub fn detached(passphrase: Option<&str>) -> Self {
        Self {
            passphrase: passphrase.map(str::to_string),
            clearsign: false,
            detached: true,
            binary: true,
        }
    }

    /// Binary signed message wrapping the content.
    pub fn embedded(passphrase: Option<&str>) -> Self {
        Self {
            passphrase: passphrase.map(str::to_string),
            clearsign: false,
            detached: false,
            binary: true,
        }
    }
}

/// Signature status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Valid,
    NoPublicKey,
    BadSignature,
    ExpiredSignature,
    ExpiredKey,
    RevokedKey,
    Error,
}

/// Result of verifying signed content.
///
/// A result is returned whenever a signature was found, even when the signer
/// is unknown or the signature is bad; `key_id` is always set in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub status: VerifyStatus,
    pub key_id: String,
    pub date_time: Option<DateTime<Utc>>,
    pub signature_id: Option<String>,
    /// Fingerprint of the (sub)key that made the signature
    pub fingerprint: Option<String>,
    /// Fingerprint of the primary key
    pub pubkey_fingerprint: Option<String>,
    pub username: Option<String>,
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        self.status == VerifyStatus::Valid
    }
}

/// Capability interface over an OpenPGP implementation.
///
/// Methods block; async callers should move them onto a blocking thread.
pub trait CryptoBackend: Send + Sync {
    /// Imports key material into a fresh keyring and reports what was imported.
    ///
    /// Data holding no keys is not an error; the result has a count of zero.
    fn import_key(&self, key_data: &[u8]) -> Result<ImportResult, BackendError>;

    /// Imports key material and lists the first imported key, if any.
    fn import_and_introspect(
        &self,
        key_data: &[u8],
    ) -> Result<(ImportResult, Option<KeyInfo>), BackendError>;

    /// Signs `content` with the secret key in `key_data`.
    fn sign(
        &self,
        content: &[u8],
        key_data: &[u8],
        options: &SignOptions,
    ) -> Result<Vec<u8>, BackendError>;

    /// Verifies an embedded signature, or `detached_signature` over `content`.
    ///
    /// `known_keys` are imported first. Content with no signature at all is a
    /// [`BackendError::Verification`].
    fn verify(
        &self,
        content: &[u8],
        detached_signature: Option<&[u8]>,
        known_keys: &[String],
    ) -> Result<VerificationResult, BackendError>;

    /// Unwraps a signed or encrypted message and returns the literal data.
    fn decrypt(&self, content: &[u8], known_keys: &[String]) -> Result<Vec<u8>, BackendError>;

    /// Fetches a key by id from `server` and returns it ASCII-armored.
    fn receive_from_keyserver(&self, server: &str, key_id: &str) -> Result<Vec<u8>, BackendError>;

    /// Searches `server` for keys matching `query`.
    fn search_keyserver(&self, server: &str, query: &str) -> Result<Vec<KeyStub>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(BackendError::Process("killed".into()).is_retryable());
        assert!(BackendError::Io(std::io::Error::other("disk")).is_retryable());
        assert!(!BackendError::Verification("File not signed".into()).is_retryable());
        assert!(!BackendError::NeedPassphrase.is_retryable());
    }

    #[test]
    fn test_passphrase_messages_are_distinct() {
        let need = BackendError::NeedPassphrase.to_string();
        let bad = BackendError::BadPassphrase.to_string();
        assert_ne!(need, bad);
        assert!(need.contains("required"));
        assert!(bad.contains("incorrect"));
    }

    #[test]
    fn test_sign_options_debug_redacts_passphrase() {
        let options = SignOptions::detached(Some("hunter2"));
        let debug = format!("{:?}", options);
        assert!(!debug.contains("hunter2"));
        assert!(options.detached && options.binary);
        assert!(!SignOptions::embedded(None).detached);
    }

    #[test]
    fn test_key_stub_key_id() {
        let stub = KeyStub {
            fingerprint: "0123456789ABCDEF0123456789ABCDEF89ABCDEF".to_string(),
            key_type: KeyType::Public,
            algorithm: Some(1),
            length: Some(4096),
            creation_date: None,
            expiration_date: None,
            uids: vec![],
        };
        assert_eq!(stub.key_id(), "89ABCDEF89ABCDEF");
        assert_eq!(stub.user_id(), "");
    }
}
