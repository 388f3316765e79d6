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

//! Fake key material.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

pub(crate) const BEGIN: &str = "-----BEGIN FAKE PGP KEY BLOCK-----";
pub(crate) const END: &str = "-----END FAKE PGP KEY BLOCK-----";

/// A key understood by [`crate::FakeBackend`].
///
/// The fingerprint is derived from the seed, so the same seed always gives
/// the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeKey {
    pub(crate) fingerprint: String,
    pub(crate) uid: String,
    pub(crate) passphrase: Option<String>,
    pub(crate) secret: bool,
    pub(crate) created: NaiveDate,
    pub(crate) expires: Option<NaiveDate>,
}

impl FakeKey {
    pub fn new(seed: &str) -> Self {
        let digest = hex::encode_upper(Sha256::digest(seed.as_bytes()));
        Self {
            fingerprint: digest[..40].to_string(),
            uid: format!("{} <{}@example.com>", seed, seed.to_lowercase()),
            passphrase: None,
            secret: true,
            created: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default(),
            expires: None,
        }
    }

    pub fn with_uid(mut self, uid: &str) -> Self {
        self.uid = uid.to_string();
        self
    }

    /// Protects the secret key with `passphrase`.
    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    pub fn expiring(mut self, date: NaiveDate) -> Self {
        self.expires = Some(date);
        self
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Long (16 character) key id.
    pub fn key_id(&self) -> &str {
        &self.fingerprint[24..]
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Block with public material only.
    pub fn public_block(&self) -> String {
        self.block(false)
    }

    /// Block with secret material.
    pub fn secret_block(&self) -> String {
        self.block(true)
    }

    fn block(&self, secret: bool) -> String {
        let mut lines = vec![
            BEGIN.to_string(),
            format!("fingerprint: {}", self.fingerprint),
            format!("user: {}", self.uid),
            format!("created: {}", self.created),
        ];
        if let Some(expires) = self.expires {
            lines.push(format!("expires: {}", expires));
        }
        if secret {
            lines.push("secret: yes".to_string());
            if let Some(passphrase) = &self.passphrase {
                lines.push(format!("passphrase: {}", passphrase));
            }
        }
        lines.push(END.to_string());
        lines.join("\n") + "\n"
    }

    /// Parses every block in `data`. Malformed blocks are skipped.
    pub(crate) fn parse_all(data: &str) -> Vec<FakeKey> {
        let mut keys = Vec::new();
        let mut current: Option<Vec<(String, String)>> = None;

        for line in data.lines() {
            let line = line.trim();
            if line == BEGIN {
                current = Some(Vec::new());
            } else if line == END {
                if let Some(key) = current.take().and_then(|fields| Self::from_fields(&fields)) {
                    keys.push(key);
                }
            } else if let (Some(fields), Some((name, value))) = (current.as_mut(), line.split_once(": ")) {
                fields.push((name.to_string(), value.to_string()));
            }
        }
        keys
    }

    fn from_fields(fields: &[(String, String)]) -> Option<FakeKey> {
        let get = |name: &str| {
            fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.clone())
        };

        let fingerprint = get("fingerprint")?;
        if fingerprint.len() != 40 || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(FakeKey {
            fingerprint: fingerprint.to_uppercase(),
            uid: get("user").unwrap_or_default(),
            passphrase: get("passphrase"),
            secret: get("secret").as_deref() == Some("yes"),
            created: get("created")?.parse().ok()?,
            expires: get("expires").and_then(|d| d.parse().ok()),
        })
    }
}
