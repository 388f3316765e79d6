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

//! Parsers for gpg's colon-delimited output.
//!
//! Two formats are handled: the local key listing produced by
//! `--with-colons --fixed-list-mode --list-keys`, and the keyserver index
//! produced by `--with-colons --search-keys`. Field numbers below are
//! zero-based.

use super::backend::{KeyInfo, KeyStub};
use crate::models::KeyType;
use chrono::{DateTime, NaiveDate};

/// Parses a date column: epoch seconds or `YYYY-MM-DD`. Empty means none.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0).map(|dt| dt.date_naive());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Reverses gpg's C-style `\xHH` escaping of user ids in listings.
pub fn unescape_colon_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

struct PartialKey {
    key_type: KeyType,
    algorithm: i32,
    length: i32,
    creation_date: Option<NaiveDate>,
    expiration_date: Option<NaiveDate>,
    fingerprint: Option<String>,
    uids: Vec<String>,
}

impl PartialKey {
    fn finish(self) -> Option<KeyInfo> {
        Some(KeyInfo {
            fingerprint: self.fingerprint?,
            key_type: self.key_type,
            algorithm: self.algorithm,
            length: self.length,
            creation_date: self.creation_date?,
            expiration_date: self.expiration_date,
            uids: self.uids,
        })
    }
}

/// Parses a local key listing into one [`KeyInfo`] per primary key.
///
/// Subkey records (`sub`, `ssb`) and their fingerprints are skipped; only the
/// `fpr` following a primary key record is taken as that key's fingerprint.
/// Keys missing a fingerprint or creation date are dropped.
pub fn parse_key_listing(output: &str) -> Vec<KeyInfo> {
    let mut keys = Vec::new();
    let mut current: Option<PartialKey> = None;
    let mut in_primary = false;

    for line in output.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or_default();

        match field(0) {
            record @ ("pub" | "sec") => {
                if let Some(key) = current.take().and_then(PartialKey::finish) {
                    keys.push(key);
                }
                current = Some(PartialKey {
                    key_type: if record == "sec" {
                        KeyType::Secret
                    } else {
                        KeyType::Public
                    },
                    length: field(2).parse().unwrap_or_default(),
                    algorithm: field(3).parse().unwrap_or_default(),
                    creation_date: parse_date(field(5)),
                    expiration_date: parse_date(field(6)),
                    fingerprint: None,
                    uids: Vec::new(),
                });
                in_primary = true;
            }
            "sub" | "ssb" => in_primary = false,
            "fpr" if in_primary => {
                if let Some(key) = current.as_mut() {
                    if key.fingerprint.is_none() {
                        key.fingerprint = Some(field(9).to_uppercase());
                    }
                }
            }
            "uid" => {
                if let Some(key) = current.as_mut() {
                    let uid = unescape_colon_field(field(9));
                    if !uid.is_empty() {
                        key.uids.push(uid);
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(key) = current.and_then(PartialKey::finish) {
        keys.push(key);
    }
    keys
}

/// Parses a keyserver index listing into key stubs.
///
/// `pub:<keyid>:<algo>:<keylen>:<creationdate>:<expirationdate>:<flags>`
/// introduces a key; following `uid:<escaped uid>:...` lines belong to it.
/// User ids are percent-encoded in this format.
pub fn parse_search_listing(output: &str) -> Vec<KeyStub> {
    let mut stubs: Vec<KeyStub> = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.trim().split(':').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or_default();

        match field(0) {
            "pub" if !field(1).is_empty() => stubs.push(KeyStub {
                fingerprint: field(1).to_uppercase(),
                key_type: KeyType::Public,
                algorithm: field(2).parse().ok(),
                length: field(3).parse().ok(),
                creation_date: parse_date(field(4)),
                expiration_date: parse_date(field(5)),
                uids: Vec::new(),
            }),
            "uid" => {
                if let Some(stub) = stubs.last_mut() {
                    let raw = field(1);
                    let uid = urlencoding::decode(raw)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| raw.to_string());
                    if !uid.is_empty() {
                        stub.uids.push(uid);
                    }
                }
            }
            _ => {}
        }
    }
    stubs
}
