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

//! Signature Record Data Access Layer
//!
//! Embedded and detached signatures live in one table. The database enforces
//! that a document file has at most one embedded record; a second insert is
//! reported as [`ValidationError::EmbeddedSignatureExists`].

use super::models::{current_timestamp_string, NewSignatureRecordRow, SignatureRecordRow};
use super::DAL;
use crate::database::schema::signature_records;
use crate::database::universal_types::UniversalUuid;
use crate::error::ValidationError;
use crate::models::{NewSignatureRecord, SignatureDetails, SignatureKind, SignatureRecord};
use diesel::prelude::*;
use std::collections::HashSet;

pub struct SignatureRecordDAL<'a> {
    pub dal: &'a DAL,
}

fn convert(rows: Vec<SignatureRecordRow>) -> Result<Vec<SignatureRecord>, ValidationError> {
    rows.into_iter().map(SignatureRecord::try_from).collect()
}

impl<'a> SignatureRecordDAL<'a> {
    /// Inserts a new record.
    pub async fn create(
        &self,
        new_record: NewSignatureRecord,
    ) -> Result<SignatureRecord, ValidationError> {
        let conn = self.dal.database.get_connection().await?;

        let id = UniversalUuid::new_v4();
        let document_file_id = new_record.document_file_id;
        let now = current_timestamp_string();
        let kind = new_record.kind.label().to_string();
        let signature_file = match new_record.kind {
            SignatureKind::Detached { signature_file } => Some(signature_file),
            SignatureKind::Embedded => None,
        };
        let details = new_record.details;
        let row = NewSignatureRecordRow {
            id: id.to_blob(),
            document_file_id: document_file_id.to_blob(),
            kind,
            signature_file,
            date_time: details.date_time.map(|t| t.to_rfc3339()),
            key_id: details.key_id,
            signature_id: details.signature_id,
            public_key_fingerprint: details.public_key_fingerprint,
            created_at: now.clone(),
            updated_at: now,
        };

        let inserted: Result<usize, diesel::result::Error> = conn
            .interact(move |conn| {
                diesel::insert_into(signature_records::table)
                    .values(&row)
                    .execute(conn)
            })
            .await?;
        match inserted.map_err(ValidationError::from) {
            Err(e) if e.is_unique_violation() => {
                return Err(ValidationError::EmbeddedSignatureExists(
                    document_file_id.to_string(),
                ))
            }
            other => other?,
        };

        let id_blob = id.to_blob();
        let row: SignatureRecordRow = conn
            .interact(move |conn| {
                signature_records::table
                    .filter(signature_records::id.eq(id_blob))
                    .select(SignatureRecordRow::as_select())
                    .first(conn)
            })
            .await??;
        SignatureRecord::try_from(row)
    }

    pub async fn get(&self, id: UniversalUuid) -> Result<Option<SignatureRecord>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let id_blob = id.to_blob();
        let row: Option<SignatureRecordRow> = conn
            .interact(move |conn| {
                signature_records::table
                    .filter(signature_records::id.eq(id_blob))
                    .select(SignatureRecordRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await??;
        row.map(SignatureRecord::try_from).transpose()
    }

    /// Overwrites the verification details of a record.
    pub async fn update_details(
        &self,
        id: UniversalUuid,
        details: &SignatureDetails,
    ) -> Result<usize, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let id_blob = id.to_blob();
        let date_time = details.date_time.map(|t| t.to_rfc3339());
        let key_id = details.key_id.clone();
        let signature_id = details.signature_id.clone();
        let fingerprint = details.public_key_fingerprint.clone();
        let now = current_timestamp_string();

        let updated = conn
            .interact(move |conn| {
                diesel::update(signature_records::table.filter(signature_records::id.eq(id_blob)))
                    .set((
                        signature_records::date_time.eq(date_time),
                        signature_records::key_id.eq(key_id),
                        signature_records::signature_id.eq(signature_id),
                        signature_records::public_key_fingerprint.eq(fingerprint),
                        signature_records::updated_at.eq(now),
                    ))
                    .execute(conn)
            })
            .await??;
        Ok(updated)
    }

    pub async fn delete(&self, id: UniversalUuid) -> Result<usize, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let id_blob = id.to_blob();
        let deleted = conn
            .interact(move |conn| {
                diesel::delete(signature_records::table.filter(signature_records::id.eq(id_blob)))
                    .execute(conn)
            })
            .await??;
        Ok(deleted)
    }

    /// Every record, oldest first.
    pub async fn list_all(&self) -> Result<Vec<SignatureRecord>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let rows: Vec<SignatureRecordRow> = conn
            .interact(|conn| {
                signature_records::table
                    .order(signature_records::created_at.asc())
                    .select(SignatureRecordRow::as_select())
                    .load(conn)
            })
            .await??;
        convert(rows)
    }

    /// Records attached to one document file.
    pub async fn list_for_file(
        &self,
        document_file_id: UniversalUuid,
    ) -> Result<Vec<SignatureRecord>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let file_blob = document_file_id.to_blob();
        let rows: Vec<SignatureRecordRow> = conn
            .interact(move |conn| {
                signature_records::table
                    .filter(signature_records::document_file_id.eq(file_blob))
                    .order(signature_records::created_at.asc())
                    .select(SignatureRecordRow::as_select())
                    .load(conn)
            })
            .await??;
        convert(rows)
    }

    /// The embedded record of a document file, if it has one.
    pub async fn embedded_for_file(
        &self,
        document_file_id: UniversalUuid,
    ) -> Result<Option<SignatureRecord>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let file_blob = document_file_id.to_blob();
        let row: Option<SignatureRecordRow> = conn
            .interact(move |conn| {
                signature_records::table
                    .filter(signature_records::document_file_id.eq(file_blob))
                    .filter(signature_records::kind.eq("embedded"))
                    .select(SignatureRecordRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await??;
        row.map(SignatureRecord::try_from).transpose()
    }

    /// Ids of every document file that already has an embedded record.
    pub async fn files_with_embedded(&self) -> Result<HashSet<UniversalUuid>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let blobs: Vec<Vec<u8>> = conn
            .interact(|conn| {
                signature_records::table
                    .filter(signature_records::kind.eq("embedded"))
                    .select(signature_records::document_file_id)
                    .load(conn)
            })
            .await??;
        blobs
            .iter()
            .map(|b| {
                UniversalUuid::from_bytes(b)
                    .map_err(|e| ValidationError::InvalidRecord(format!("document_file_id: {}", e)))
            })
            .collect()
    }

    /// Records whose key id matches `key_id` and whose verified state is `verified`.
    ///
    /// `key_id` may be a short id, a long id, or a full fingerprint; records
    /// carry long key ids, so at most the last 16 characters are compared.
    pub async fn list_by_key_id(
        &self,
        key_id: &str,
        verified: bool,
    ) -> Result<Vec<SignatureRecord>, ValidationError> {
        let key_id = key_id.trim().to_uppercase();
        if key_id.is_empty() || !key_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Vec::new());
        }
        let suffix = key_id[key_id.len().saturating_sub(16)..].to_string();

        let conn = self.dal.database.get_connection().await?;
        let pattern = format!("%{}", suffix);
        let rows: Vec<SignatureRecordRow> = conn
            .interact(move |conn| {
                let query = signature_records::table
                    .filter(signature_records::key_id.like(pattern))
                    .order(signature_records::created_at.asc())
                    .select(SignatureRecordRow::as_select())
                    .into_boxed();
                let query = if verified {
                    query.filter(signature_records::signature_id.is_not_null())
                } else {
                    query.filter(signature_records::signature_id.is_null())
                };
                query.load(conn)
            })
            .await??;
        convert(rows)
    }
}
