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

//! SQLite row models.
//!
//! SQLite has no native UUID or timestamp types, so ids are stored as 16 byte
//! BLOBs and timestamps as RFC 3339 TEXT. Rows are converted to domain types
//! at the DAL boundary; a row that does not convert is reported as
//! [`ValidationError::InvalidRecord`] instead of panicking.

use crate::config::KeyIdLength;
use crate::database::schema::{keys, signature_records};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::ValidationError;
use crate::models::{derive_key_id, Key, SignatureDetails, SignatureKind, SignatureRecord};
use chrono::NaiveDate;
use diesel::prelude::*;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn current_timestamp_string() -> String {
    UniversalTimestamp::now().to_rfc3339()
}

fn parse_uuid(column: &str, bytes: &[u8]) -> Result<UniversalUuid, ValidationError> {
    UniversalUuid::from_bytes(bytes)
        .map_err(|e| ValidationError::InvalidRecord(format!("{}: {}", column, e)))
}

fn parse_timestamp(column: &str, value: &str) -> Result<UniversalTimestamp, ValidationError> {
    UniversalTimestamp::from_rfc3339(value)
        .map_err(|e| ValidationError::InvalidRecord(format!("{}: {}", column, e)))
}

fn parse_date(column: &str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| ValidationError::InvalidRecord(format!("{}: {}", column, e)))
}

// ============================================================================
// Key Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = keys)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KeyRow {
    pub id: Vec<u8>,
    pub fingerprint: String,
    pub key_type: String,
    pub algorithm: i32,
    pub length: i32,
    pub user_id: String,
    pub creation_date: String,
    pub expiration_date: Option<String>,
    pub key_data: String,
    pub created_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = keys)]
pub struct NewKeyRow {
    pub id: Vec<u8>,
    pub fingerprint: String,
    pub key_type: String,
    pub algorithm: i32,
    pub length: i32,
    pub user_id: String,
    pub creation_date: String,
    pub expiration_date: Option<String>,
    pub key_data: String,
    pub created_at: String,
}

impl KeyRow {
    /// Converts the row, deriving the key id with `key_id_length`.
    pub fn into_key(self, key_id_length: KeyIdLength) -> Result<Key, ValidationError> {
        Ok(Key {
            id: parse_uuid("keys.id", &self.id)?,
            key_id: derive_key_id(&self.fingerprint, key_id_length),
            key_type: self
                .key_type
                .parse()
                .map_err(ValidationError::InvalidRecord)?,
            algorithm: self.algorithm,
            length: self.length,
            user_id: self.user_id,
            creation_date: parse_date("keys.creation_date", &self.creation_date)?,
            expiration_date: self
                .expiration_date
                .as_deref()
                .map(|d| parse_date("keys.expiration_date", d))
                .transpose()?,
            key_data: self.key_data,
            created_at: parse_timestamp("keys.created_at", &self.created_at)?,
            fingerprint: self.fingerprint,
        })
    }
}

// ============================================================================
// Signature Record Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = signature_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SignatureRecordRow {
    pub id: Vec<u8>,
    pub document_file_id: Vec<u8>,
    pub kind: String,
    pub signature_file: Option<Vec<u8>>,
    pub date_time: Option<String>,
    pub key_id: String,
    pub signature_id: Option<String>,
    pub public_key_fingerprint: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = signature_records)]
pub struct NewSignatureRecordRow {
    pub id: Vec<u8>,
    pub document_file_id: Vec<u8>,
    pub kind: String,
    pub signature_file: Option<Vec<u8>>,
    pub date_time: Option<String>,
    pub key_id: String,
    pub signature_id: Option<String>,
    pub public_key_fingerprint: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<SignatureRecordRow> for SignatureRecord {
    type Error = ValidationError;

    fn try_from(row: SignatureRecordRow) -> Result<Self, Self::Error> {
        let kind = match (row.kind.as_str(), row.signature_file) {
            ("embedded", _) => SignatureKind::Embedded,
            ("detached", Some(signature_file)) => SignatureKind::Detached { signature_file },
            (other, _) => {
                return Err(ValidationError::InvalidRecord(format!(
                    "signature_records.kind '{}' does not match its columns",
                    other
                )))
            }
        };

        Ok(SignatureRecord {
            id: parse_uuid("signature_records.id", &row.id)?,
            document_file_id: parse_uuid(
                "signature_records.document_file_id",
                &row.document_file_id,
            )?,
            kind,
            details: SignatureDetails {
                date_time: row
                    .date_time
                    .as_deref()
                    .map(|t| parse_timestamp("signature_records.date_time", t))
                    .transpose()?,
                key_id: row.key_id,
                signature_id: row.signature_id,
                public_key_fingerprint: row.public_key_fingerprint,
            },
            created_at: parse_timestamp("signature_records.created_at", &row.created_at)?,
            updated_at: parse_timestamp("signature_records.updated_at", &row.updated_at)?,
        })
    }
}
