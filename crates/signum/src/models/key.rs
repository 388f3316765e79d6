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

//! Domain models for OpenPGP keys.
//!
//! A key is identified by its 40 hex character fingerprint. The short key id
//! shown to users is a suffix of the fingerprint and is derived on load, never
//! stored on its own.

use crate::config::KeyIdLength;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a key carries only public material or a secret key as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Public,
    Secret,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Public => "public",
            KeyType::Secret => "secret",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" | "pub" => Ok(KeyType::Public),
            "secret" | "sec" => Ok(KeyType::Secret),
            other => Err(format!("unknown key type '{}'", other)),
        }
    }
}

/// The last `len` characters of `value`, or all of it when shorter.
pub fn fingerprint_suffix(value: &str, len: usize) -> &str {
    if len == 0 {
        return "";
    }
    match value.char_indices().rev().nth(len - 1) {
        Some((start, _)) => &value[start..],
        None => value,
    }
}

/// Returns the key id for `fingerprint`: its last 8 or 16 characters.
pub fn derive_key_id(fingerprint: &str, length: KeyIdLength) -> String {
    fingerprint_suffix(fingerprint, length.chars()).to_uppercase()
}

/// Domain model for a stored key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub id: UniversalUuid,
    /// 40 hex character fingerprint, unique across the repository
    pub fingerprint: String,
    /// Fingerprint suffix, derived with the configured length
    pub key_id: String,
    pub key_type: KeyType,
    /// OpenPGP public key algorithm number
    pub algorithm: i32,
    /// Key length in bits
    pub length: i32,
    /// First user id on the key
    pub user_id: String,
    pub creation_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    /// ASCII-armored key block as imported
    #[serde(skip_serializing)]
    pub key_data: String,
    pub created_at: UniversalTimestamp,
}

impl Key {
    pub fn is_secret(&self) -> bool {
        self.key_type == KeyType::Secret
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.key_id, self.user_id)
    }
}

/// Model for inserting a newly imported key.
#[derive(Debug, Clone)]
pub struct NewKey {
    pub fingerprint: String,
    pub key_type: KeyType,
    pub algorithm: i32,
    pub length: i32,
    pub user_id: String,
    pub creation_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub key_data: String,
}
