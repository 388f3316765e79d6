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

//! Key Data Access Layer
//!
//! Storage for imported OpenPGP keys. Fingerprints are stored uppercase and are
//! unique; a second import of the same fingerprint is rejected with
//! [`ValidationError::KeyAlreadyExists`].

use super::models::{current_timestamp_string, KeyRow, NewKeyRow, DATE_FORMAT};
use super::DAL;
use crate::database::schema::keys;
use crate::database::universal_types::UniversalUuid;
use crate::error::ValidationError;
use crate::models::{Key, KeyType, NewKey};
use diesel::prelude::*;

pub struct KeyDAL<'a> {
    pub dal: &'a DAL,
}

/// Uppercases `key_id` and rejects anything that is not hex.
fn normalize_key_id(key_id: &str) -> Option<String> {
    let key_id = key_id.trim().to_uppercase();
    if key_id.is_empty() || !key_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(key_id)
}

impl<'a> KeyDAL<'a> {
    fn convert(&self, rows: Vec<KeyRow>) -> Result<Vec<Key>, ValidationError> {
        let length = self.dal.key_id_length();
        rows.into_iter().map(|row| row.into_key(length)).collect()
    }

    /// Inserts a new key.
    pub async fn create(&self, new_key: NewKey) -> Result<Key, ValidationError> {
        let conn = self.dal.database.get_connection().await?;

        let id = UniversalUuid::new_v4();
        let fingerprint = new_key.fingerprint.to_uppercase();
        let row = NewKeyRow {
            id: id.to_blob(),
            fingerprint: fingerprint.clone(),
            key_type: new_key.key_type.as_str().to_string(),
            algorithm: new_key.algorithm,
            length: new_key.length,
            user_id: new_key.user_id,
            creation_date: new_key.creation_date.format(DATE_FORMAT).to_string(),
            expiration_date: new_key
                .expiration_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
            key_data: new_key.key_data,
            created_at: current_timestamp_string(),
        };

        let inserted: Result<usize, diesel::result::Error> = conn
            .interact(move |conn| diesel::insert_into(keys::table).values(&row).execute(conn))
            .await?;
        match inserted.map_err(ValidationError::from) {
            Err(e) if e.is_unique_violation() => {
                return Err(ValidationError::KeyAlreadyExists(fingerprint))
            }
            other => other?,
        };

        let id_blob = id.to_blob();
        let row: KeyRow = conn
            .interact(move |conn| {
                keys::table
                    .filter(keys::id.eq(id_blob))
                    .select(KeyRow::as_select())
                    .first(conn)
            })
            .await??;
        row.into_key(self.dal.key_id_length())
    }

    /// Looks a key up by its full fingerprint.
    pub async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Key>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let fingerprint = fingerprint.to_uppercase();
        let row: Option<KeyRow> = conn
            .interact(move |conn| {
                keys::table
                    .filter(keys::fingerprint.eq(fingerprint))
                    .select(KeyRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await??;
        row.map(|r| r.into_key(self.dal.key_id_length())).transpose()
    }

    /// Looks a key up by its row id.
    pub async fn get(&self, id: UniversalUuid) -> Result<Option<Key>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let id_blob = id.to_blob();
        let row: Option<KeyRow> = conn
            .interact(move |conn| {
                keys::table
                    .filter(keys::id.eq(id_blob))
                    .select(KeyRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await??;
        row.map(|r| r.into_key(self.dal.key_id_length())).transpose()
    }

    /// Keys whose fingerprint ends with `key_id`. Any suffix length works.
    pub async fn find_by_key_id(&self, key_id: &str) -> Result<Vec<Key>, ValidationError> {
        let Some(key_id) = normalize_key_id(key_id) else {
            return Ok(Vec::new());
        };
        let conn = self.dal.database.get_connection().await?;
        let pattern = format!("%{}", key_id);
        let rows: Vec<KeyRow> = conn
            .interact(move |conn| {
                keys::table
                    .filter(keys::fingerprint.like(pattern))
                    .order(keys::created_at.asc())
                    .select(KeyRow::as_select())
                    .load(conn)
            })
            .await??;
        self.convert(rows)
    }

    /// Lists keys, optionally only those of one type, oldest first.
    pub async fn list(&self, key_type: Option<KeyType>) -> Result<Vec<Key>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let rows: Vec<KeyRow> = conn
            .interact(move |conn| {
                let mut query = keys::table
                    .order(keys::created_at.asc())
                    .select(KeyRow::as_select())
                    .into_boxed();
                if let Some(key_type) = key_type {
                    query = query.filter(keys::key_type.eq(key_type.as_str()));
                }
                query.load(conn)
            })
            .await??;
        self.convert(rows)
    }

    /// The stored key blocks of every key, for seeding a verification keyring.
    pub async fn all_key_data(&self) -> Result<Vec<String>, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let data: Vec<String> = conn
            .interact(|conn| {
                keys::table
                    .order(keys::created_at.asc())
                    .select(keys::key_data)
                    .load(conn)
            })
            .await??;
        Ok(data)
    }

    /// True when a key with `fingerprint` is stored.
    pub async fn exists(&self, fingerprint: &str) -> Result<bool, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let fingerprint = fingerprint.to_uppercase();
        let count: i64 = conn
            .interact(move |conn| {
                keys::table
                    .filter(keys::fingerprint.eq(fingerprint))
                    .count()
                    .get_result(conn)
            })
            .await??;
        Ok(count > 0)
    }

    /// Deletes the key with `fingerprint`. Returns the number of rows removed.
    pub async fn delete(&self, fingerprint: &str) -> Result<usize, ValidationError> {
        let conn = self.dal.database.get_connection().await?;
        let fingerprint = fingerprint.to_uppercase();
        let deleted = conn
            .interact(move |conn| {
                diesel::delete(keys::table.filter(keys::fingerprint.eq(fingerprint))).execute(conn)
            })
            .await??;
        Ok(deleted)
    }
}
