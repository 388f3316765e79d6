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

//! Signing, verification and the embedded-signature read path.
//!
//! The engine ties the crypto backend, the key repository and the signature
//! records together. Its central routine is the verification side-effect:
//! every time a record is created or refreshed, the document file's current
//! bytes are verified against every known key and the record's derived
//! fields (`date_time`, `key_id`, `signature_id`, `public_key_fingerprint`)
//! are taken from the result.
//!
//! Content that carries no signature is a normal state, not a failure of the
//! side-effect. A backend that could not run at all is reported as
//! [`SignatureError::Backend`] so callers can retry.

use super::audit;
use super::key_repository::{KeyError, KeyRepository};
use crate::config::SignumConfig;
use crate::crypto::{
    content_digest, run_blocking, BackendError, CryptoBackend, SignOptions, VerificationResult,
    VerifyStatus,
};
use crate::dal::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::document::{DocumentError, DocumentFile, DocumentSource};
use crate::error::ValidationError;
use crate::models::{Key, NewSignatureRecord, SignatureDetails, SignatureRecord};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors from signature engine operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("A passphrase is required to unlock the signing key")]
    NeedPassphrase,

    #[error("The passphrase supplied for the signing key is incorrect")]
    Passphrase,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Key does not exist: {0}")]
    KeyDoesNotExist(String),

    #[error("Signature does not exist: {0}")]
    SignatureDoesNotExist(UniversalUuid),

    #[error("Signature {0} is embedded in its document file")]
    WrongKind(UniversalUuid),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Backend(BackendError),

    #[error(transparent)]
    Key(KeyError),

    #[error(transparent)]
    Database(#[from] ValidationError),
}

impl From<BackendError> for SignatureError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NeedPassphrase => SignatureError::NeedPassphrase,
            BackendError::BadPassphrase => SignatureError::Passphrase,
            BackendError::Signing(msg) => SignatureError::Signing(msg),
            BackendError::Decryption(msg) => SignatureError::Decryption(msg),
            BackendError::Verification(msg) => SignatureError::Verification(msg),
            other => SignatureError::Backend(other),
        }
    }
}

impl From<KeyError> for SignatureError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Database(e) => SignatureError::Database(e),
            KeyError::Backend(e) => e.into(),
            KeyError::KeyDoesNotExist(id) => SignatureError::KeyDoesNotExist(id),
            other => SignatureError::Key(other),
        }
    }
}

impl SignatureError {
    /// True when the operation failed for a reason that may clear on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SignatureError::Backend(e) => e.is_retryable(),
            SignatureError::Database(ValidationError::ConnectionPool(_)) => true,
            SignatureError::Document(DocumentError::Io(_)) => true,
            _ => false,
        }
    }
}

/// Orchestrates signing and verification.
#[derive(Clone)]
pub struct SignatureEngine {
    pub(crate) dal: DAL,
    backend: Arc<dyn CryptoBackend>,
    keys: KeyRepository,
    documents: Arc<dyn DocumentSource>,
    config: SignumConfig,
}

impl SignatureEngine {
    pub fn new(
        dal: DAL,
        backend: Arc<dyn CryptoBackend>,
        keys: KeyRepository,
        documents: Arc<dyn DocumentSource>,
        config: SignumConfig,
    ) -> Self {
        Self {
            dal,
            backend,
            keys,
            documents,
            config,
        }
    }

    pub fn documents(&self) -> &Arc<dyn DocumentSource> {
        &self.documents
    }

    pub fn keys(&self) -> &KeyRepository {
        &self.keys
    }

    pub fn config(&self) -> &SignumConfig {
        &self.config
    }

    async fn call_backend<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CryptoBackend) -> Result<T, BackendError> + Send + 'static,
    {
        run_blocking(self.backend.clone(), self.config.backend_timeout(), call).await
    }

    /// Verifies content against every known key.
    ///
    /// When the signer is unknown and fetching is enabled, the signer's key is
    /// fetched from the keyservers (without storing it) and verification is
    /// retried once.
    async fn verify_content(
        &self,
        content: Arc<Vec<u8>>,
        signature: Option<Arc<Vec<u8>>>,
    ) -> Result<VerificationResult, SignatureError> {
        let mut known = self.keys.known_key_data().await?;

        let (c, s, k) = (content.clone(), signature.clone(), known.clone());
        let result = self
            .call_backend(move |backend| backend.verify(&c, s.as_deref().map(Vec::as_slice), &k))
            .await?;

        if result.status != VerifyStatus::NoPublicKey || !self.config.fetch_missing_keys() {
            return Ok(result);
        }

        match self.keys.fetch_key_data(&result.key_id).await {
            Ok(data) => match String::from_utf8(data) {
                Ok(armored) => {
                    debug!("Retrying verification with fetched key {}", result.key_id);
                    known.push(armored);
                    let retried = self
                        .call_backend(move |backend| {
                            backend.verify(&content, signature.as_deref().map(Vec::as_slice), &known)
                        })
                        .await?;
                    Ok(retried)
                }
                Err(_) => {
                    warn!("Fetched key {} is not ASCII-armored", result.key_id);
                    Ok(result)
                }
            },
            Err(e) => {
                debug!("Could not fetch signer key {}: {}", result.key_id, e);
                Ok(result)
            }
        }
    }

    /// Derived record fields for a verification result.
    ///
    /// The signer's identity (`signature_id`, `public_key_fingerprint`) is only
    /// kept when the signature checked out and the signing key is stored in
    /// the repository.
    async fn resolve_details(
        &self,
        result: &VerificationResult,
    ) -> Result<SignatureDetails, SignatureError> {
        let trusted_status = matches!(
            result.status,
            VerifyStatus::Valid
                | VerifyStatus::ExpiredSignature
                | VerifyStatus::ExpiredKey
                | VerifyStatus::RevokedKey
        );

        let fingerprint = match result.pubkey_fingerprint.as_deref() {
            Some(fpr) if trusted_status && self.keys.contains(fpr).await? => Some(fpr.to_uppercase()),
            _ => None,
        };

        Ok(SignatureDetails {
            date_time: result.date_time.map(UniversalTimestamp),
            key_id: result.key_id.clone(),
            signature_id: fingerprint.as_ref().and(result.signature_id.clone()),
            public_key_fingerprint: fingerprint,
        })
    }

    /// The verification side-effect.
    ///
    /// Returns `None` when the content is not signed; the caller keeps its
    /// current fields in that case.
    async fn verification_details(
        &self,
        file: &dyn DocumentFile,
        signature: Option<Vec<u8>>,
    ) -> Result<Option<SignatureDetails>, SignatureError> {
        let content = file.open().await?;
        let digest = content_digest(&content);

        match self.verify_content(Arc::new(content), signature.map(Arc::new)).await {
            Ok(result) => {
                let details = self.resolve_details(&result).await?;
                audit::log_signature_verified(
                    file.id(),
                    &digest,
                    &details.key_id,
                    details.public_key_fingerprint.as_deref(),
                );
                Ok(Some(details))
            }
            Err(SignatureError::Verification(reason)) => {
                audit::log_signature_unverified(file.id(), &digest, &reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Signs `file` with `key` and stores a detached signature.
    ///
    /// Passphrase problems surface as [`SignatureError::NeedPassphrase`] or
    /// [`SignatureError::Passphrase`]; nothing is stored on failure.
    pub async fn sign_detached(
        &self,
        file: &dyn DocumentFile,
        key: &Key,
        passphrase: Option<&str>,
    ) -> Result<SignatureRecord, SignatureError> {
        let content = file.open().await?;
        let signature = self
            .sign_bytes(file.id(), content, key, SignOptions::detached(passphrase))
            .await?;
        self.attach_detached(file, signature).await
    }

    async fn sign_bytes(
        &self,
        file_id: UniversalUuid,
        content: Vec<u8>,
        key: &Key,
        options: SignOptions,
    ) -> Result<Vec<u8>, SignatureError> {
        if !key.is_secret() {
            let reason = format!("key {} has no secret material", key.key_id);
            audit::log_signature_sign_failed(file_id, &key.fingerprint, &reason);
            return Err(SignatureError::Signing(reason));
        }

        let key_data = key.key_data.clone().into_bytes();
        let signed = self
            .call_backend(move |backend| backend.sign(&content, &key_data, &options))
            .await;
        signed.map_err(|e| {
            audit::log_signature_sign_failed(file_id, &key.fingerprint, &e.to_string());
            SignatureError::from(e)
        })
    }

    /// Stores an externally produced detached signature for `file`.
    ///
    /// The record's fields are populated by verifying the signature against
    /// the file's current content. A signature that does not verify is still
    /// stored, with its derived fields empty.
    pub async fn attach_detached(
        &self,
        file: &dyn DocumentFile,
        signature: Vec<u8>,
    ) -> Result<SignatureRecord, SignatureError> {
        let details = self
            .verification_details(file, Some(signature.clone()))
            .await?
            .unwrap_or_default();

        let mut new_record = NewSignatureRecord::detached(file.id(), signature);
        new_record.details = details;
        let record = self.dal.signature_records().create(new_record).await?;

        audit::log_signature_created(
            record.id,
            record.document_file_id,
            &record.kind,
            &record.details.key_id,
        );
        Ok(record)
    }

    /// Signs `file` into an OpenPGP container stored as a new revision.
    ///
    /// The backend does not report the new signature's id, so the container is
    /// verified right after signing to recover it. The returned record belongs
    /// to the new revision.
    pub async fn sign_embedded(
        &self,
        file: &dyn DocumentFile,
        key: &Key,
        passphrase: Option<&str>,
    ) -> Result<SignatureRecord, SignatureError> {
        let content = file.open().await?;
        let signed = Arc::new(
            self.sign_bytes(file.id(), content, key, SignOptions::embedded(passphrase))
                .await?,
        );

        let result = match self.verify_content(signed.clone(), None).await {
            Ok(result) => result,
            Err(SignatureError::Verification(reason)) => {
                return Err(SignatureError::Signing(format!(
                    "signed output did not verify: {}",
                    reason
                )))
            }
            Err(e) => return Err(e),
        };
        if result.signature_id.is_none() {
            return Err(SignatureError::Signing(
                "signature id could not be recovered from the signed output".to_string(),
            ));
        }
        let details = self.resolve_details(&result).await?;

        let revision = file
            .create_new_revision(Arc::unwrap_or_clone(signed))
            .await?;
        let record = match self
            .dal
            .signature_records()
            .create(NewSignatureRecord::embedded(revision.id(), details))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = self.documents.delete(revision.id()).await {
                    error!(
                        "Signed revision {} of document file {} has no signature record and could not be removed: {}",
                        revision.id(),
                        file.id(),
                        cleanup
                    );
                }
                return Err(e.into());
            }
        };

        audit::log_signature_created(
            record.id,
            record.document_file_id,
            &record.kind,
            &record.details.key_id,
        );
        info!(
            "Document file {} signed into revision {}",
            file.id(),
            revision.id()
        );
        Ok(record)
    }

    /// Verifies `file`, with a detached signature when one is given.
    ///
    /// Unsigned content is a [`SignatureError::Verification`]. Nothing is stored.
    pub async fn verify(
        &self,
        file: &dyn DocumentFile,
        detached_signature: Option<&[u8]>,
    ) -> Result<VerificationResult, SignatureError> {
        let content = file.open().await?;
        let result = self
            .verify_content(
                Arc::new(content),
                detached_signature.map(|s| Arc::new(s.to_vec())),
            )
            .await?;
        Ok(result)
    }

    /// Returns the readable content of `file`.
    ///
    /// Files without an embedded signature are returned as stored. Otherwise
    /// signed layers are peeled off one at a time until a layer can no longer
    /// be opened, stops changing, or the configured depth is reached; the last
    /// layer reached is returned.
    pub async fn open_plaintext(&self, file: &dyn DocumentFile) -> Result<Vec<u8>, SignatureError> {
        let content = file.open().await?;
        if self
            .dal
            .signature_records()
            .embedded_for_file(file.id())
            .await?
            .is_none()
        {
            return Ok(content);
        }

        let known = Arc::new(self.keys.known_key_data().await?);
        let mut current = Arc::new(content);
        for depth in 0..self.config.max_unwrap_depth() {
            let (layer, keys) = (current.clone(), known.clone());
            match self
                .call_backend(move |backend| backend.decrypt(&layer, &keys))
                .await
            {
                Ok(plaintext) if plaintext == *current => break,
                Ok(plaintext) => current = Arc::new(plaintext),
                Err(BackendError::Decryption(reason)) => {
                    debug!(
                        "Stopped unwrapping {} at depth {}: {}",
                        file.id(),
                        depth,
                        reason
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Arc::unwrap_or_clone(current))
    }

    /// Records attached to one document file.
    pub async fn signature_records(
        &self,
        document_file_id: UniversalUuid,
    ) -> Result<Vec<SignatureRecord>, SignatureError> {
        Ok(self
            .dal
            .signature_records()
            .list_for_file(document_file_id)
            .await?)
    }

    pub async fn get_signature(&self, id: UniversalUuid) -> Result<SignatureRecord, SignatureError> {
        self.dal
            .signature_records()
            .get(id)
            .await?
            .ok_or(SignatureError::SignatureDoesNotExist(id))
    }

    /// The stored blob of a detached signature.
    pub async fn detached_signature_blob(&self, id: UniversalUuid) -> Result<Vec<u8>, SignatureError> {
        let record = self.get_signature(id).await?;
        record
            .signature_file()
            .map(<[u8]>::to_vec)
            .ok_or(SignatureError::WrongKind(id))
    }

    /// Deletes a detached signature together with its blob.
    pub async fn delete_detached(&self, id: UniversalUuid) -> Result<(), SignatureError> {
        let record = self.get_signature(id).await?;
        if !record.is_detached() {
            return Err(SignatureError::WrongKind(id));
        }
        if self.dal.signature_records().delete(id).await? == 0 {
            return Err(SignatureError::SignatureDoesNotExist(id));
        }
        audit::log_signature_deleted(id, record.document_file_id);
        Ok(())
    }

    /// Re-runs the verification side-effect for one record.
    ///
    /// Returns `true` when the stored fields changed.
    pub async fn refresh_record(&self, record: &SignatureRecord) -> Result<bool, SignatureError> {
        let file = self.documents.get(record.document_file_id).await?;
        let signature = record.signature_file().map(<[u8]>::to_vec);

        let Some(details) = self.verification_details(file.as_ref(), signature).await? else {
            return Ok(false);
        };
        if details == record.details {
            return Ok(false);
        }

        self.dal
            .signature_records()
            .update_details(record.id, &details)
            .await?;
        debug!("Refreshed signature record {}", record.id);
        Ok(true)
    }

    /// Creates the embedded record for one revision if it is signed and has none.
    ///
    /// Returns the new record, or `None` when the revision already has one or
    /// is not signed.
    pub async fn verify_document_file(
        &self,
        document_file_id: UniversalUuid,
    ) -> Result<Option<SignatureRecord>, SignatureError> {
        let records = self.dal.signature_records();
        if records.embedded_for_file(document_file_id).await?.is_some() {
            return Ok(None);
        }

        let file = self.documents.get(document_file_id).await?;
        let Some(details) = self.verification_details(file.as_ref(), None).await? else {
            return Ok(None);
        };

        match records
            .create(NewSignatureRecord::embedded(document_file_id, details))
            .await
        {
            Ok(record) => {
                audit::log_signature_created(
                    record.id,
                    record.document_file_id,
                    &record.kind,
                    &record.details.key_id,
                );
                Ok(Some(record))
            }
            Err(ValidationError::EmbeddedSignatureExists(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
