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

//! Security audit logging for key and signature operations.
//!
//! Events are emitted through `tracing` with an `event_type` field from
//! [`events`], so they can be filtered and shipped like any other log line.
//! Document content is never logged; it is identified by its SHA256 digest.

use super::reconciliation::BatchReport;
use crate::database::universal_types::UniversalUuid;
use crate::models::{KeyType, SignatureKind};

/// Event types.
pub mod events {
    /// A key was added to the repository.
    pub const KEY_IMPORTED: &str = "key.imported";
    /// Key material was rejected.
    pub const KEY_IMPORT_FAILED: &str = "key.import_failed";
    /// A key was fetched from a keyserver.
    pub const KEY_RECEIVED: &str = "key.received";
    /// A key was removed from the repository.
    pub const KEY_DELETED: &str = "key.deleted";

    /// A signature record was created.
    pub const SIGNATURE_CREATED: &str = "signature.created";
    /// A signing attempt failed.
    pub const SIGNATURE_SIGN_FAILED: &str = "signature.sign_failed";
    /// A signature was matched to a known key.
    pub const SIGNATURE_VERIFIED: &str = "signature.verified";
    /// A signature could not be verified under the current keys.
    pub const SIGNATURE_UNVERIFIED: &str = "signature.unverified";
    /// A signature record was deleted.
    pub const SIGNATURE_DELETED: &str = "signature.deleted";

    /// A reconciliation sweep finished.
    pub const BATCH_COMPLETED: &str = "batch.completed";
}

pub fn log_key_imported(fingerprint: &str, key_type: KeyType, user_id: &str) {
    tracing::info!(
        event_type = events::KEY_IMPORTED,
        fingerprint = %fingerprint,
        key_type = %key_type,
        user_id = %user_id,
        "Key imported"
    );
}

pub fn log_key_import_failed(reason: &str) {
    tracing::warn!(
        event_type = events::KEY_IMPORT_FAILED,
        reason = %reason,
        "Key import failed"
    );
}

pub fn log_key_received(key_id: &str, keyserver: &str) {
    tracing::info!(
        event_type = events::KEY_RECEIVED,
        key_id = %key_id,
        keyserver = %keyserver,
        "Key received from keyserver"
    );
}

pub fn log_key_deleted(fingerprint: &str, key_type: KeyType) {
    tracing::info!(
        event_type = events::KEY_DELETED,
        fingerprint = %fingerprint,
        key_type = %key_type,
        "Key deleted"
    );
}

pub fn log_signature_created(
    record_id: UniversalUuid,
    document_file_id: UniversalUuid,
    kind: &SignatureKind,
    key_id: &str,
) {
    tracing::info!(
        event_type = events::SIGNATURE_CREATED,
        record_id = %record_id,
        document_file_id = %document_file_id,
        kind = %kind,
        key_id = %key_id,
        "Signature created"
    );
}

pub fn log_signature_sign_failed(document_file_id: UniversalUuid, fingerprint: &str, reason: &str) {
    tracing::warn!(
        event_type = events::SIGNATURE_SIGN_FAILED,
        document_file_id = %document_file_id,
        fingerprint = %fingerprint,
        reason = %reason,
        "Signing failed"
    );
}

/// Log a verification that resolved the signer.
///
/// `public_key_fingerprint` is `None` when the signer's key id is known but the
/// key itself is not in the repository.
pub fn log_signature_verified(
    document_file_id: UniversalUuid,
    content_digest: &str,
    key_id: &str,
    public_key_fingerprint: Option<&str>,
) {
    tracing::info!(
        event_type = events::SIGNATURE_VERIFIED,
        document_file_id = %document_file_id,
        content_digest = %content_digest,
        key_id = %key_id,
        public_key_fingerprint = ?public_key_fingerprint,
        "Signature verified"
    );
}

pub fn log_signature_unverified(document_file_id: UniversalUuid, content_digest: &str, reason: &str) {
    tracing::info!(
        event_type = events::SIGNATURE_UNVERIFIED,
        document_file_id = %document_file_id,
        content_digest = %content_digest,
        reason = %reason,
        "Signature not verified"
    );
}

pub fn log_signature_deleted(record_id: UniversalUuid, document_file_id: UniversalUuid) {
    tracing::info!(
        event_type = events::SIGNATURE_DELETED,
        record_id = %record_id,
        document_file_id = %document_file_id,
        "Signature deleted"
    );
}

pub fn log_batch_completed(job: &str, report: &BatchReport) {
    tracing::info!(
        event_type = events::BATCH_COMPLETED,
        job = %job,
        processed = report.processed,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        "Batch job completed"
    );
}
