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

//! GnuPG machine-readable status output.
//!
//! With `--status-fd`, gpg reports what happened as lines of the form
//! `[GNUPG:] KEYWORD arg arg ...`. Everything the backend decides (was a
//! signature made, which passphrase problem occurred, who signed this) is read
//! from these lines rather than from human-readable diagnostics.

use super::backend::{BackendError, ImportResult, VerificationResult, VerifyStatus};
use crate::models::fingerprint_suffix;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Prefix of every status line.
pub const STATUS_PREFIX: &str = "[GNUPG:] ";

/// Import reason bit set when the imported block contained a secret key.
const IMPORT_REASON_SECRET: u32 = 16;

/// `ERRSIG` return code for a missing public key.
const ERRSIG_NO_PUBKEY: u32 = 9;

/// libgpg-error codes seen in `FAILURE` / `ERROR` lines.
const GPG_ERR_BAD_PASSPHRASE: u32 = 11;
const GPG_ERR_CANCELED: u32 = 99;
const GPG_ERR_NO_PASSPHRASE: u32 = 177;

/// One parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    NewSig,
    GoodSig { key_id: String, username: String },
    BadSig { key_id: String, username: String },
    ExpSig { key_id: String, username: String },
    ExpKeySig { key_id: String, username: String },
    RevKeySig { key_id: String, username: String },
    ErrSig {
        key_id: String,
        timestamp: Option<String>,
        rc: u32,
        fingerprint: Option<String>,
    },
    ValidSig {
        fingerprint: String,
        timestamp: String,
        primary_fingerprint: Option<String>,
    },
    SigId { signature_id: String, timestamp: String },
    NoPubkey { key_id: String },
    NoSeckey { key_id: String },
    NoData(u32),
    SigCreated { fingerprint: String, timestamp: String },
    NeedPassphrase,
    BadPassphrase,
    GoodPassphrase,
    MissingPassphrase,
    ImportOk { reason: u32, fingerprint: String },
    ImportProblem { reason: u32 },
    ImportRes { count: usize, imported: usize, unchanged: usize },
    Imported { key_id: String, username: String },
    Plaintext,
    DecryptionOkay,
    DecryptionFailed,
    Failure { location: String, code: u32 },
    Error { location: String, code: u32 },
    Other { keyword: String, args: Vec<String> },
}

fn arg(args: &[&str], index: usize) -> String {
    args.get(index).map(|s| s.to_string()).unwrap_or_default()
}

fn opt_arg(args: &[&str], index: usize) -> Option<String> {
    args.get(index)
        .filter(|s| !s.is_empty() && **s != "-")
        .map(|s| s.to_string())
}

fn num_arg<T: std::str::FromStr + Default>(args: &[&str], index: usize) -> T {
    args.get(index)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Parses a single line; returns `None` for lines that are not status lines.
pub fn parse_status_line(line: &str) -> Option<StatusLine> {
    let rest = line.trim_end().strip_prefix(STATUS_PREFIX)?;
    let (keyword, tail) = rest.split_once(' ').unwrap_or((rest, ""));
    let args: Vec<&str> = tail.split(' ').filter(|s| !s.is_empty()).collect();
    // Usernames may contain spaces and run to the end of the line.
    let username = tail.split_once(' ').map(|(_, u)| u.to_string()).unwrap_or_default();

    let parsed = match keyword {
        "NEWSIG" => StatusLine::NewSig,
        "GOODSIG" => StatusLine::GoodSig { key_id: arg(&args, 0), username },
        "BADSIG" => StatusLine::BadSig { key_id: arg(&args, 0), username },
        "EXPSIG" => StatusLine::ExpSig { key_id: arg(&args, 0), username },
        "EXPKEYSIG" => StatusLine::ExpKeySig { key_id: arg(&args, 0), username },
        "REVKEYSIG" => StatusLine::RevKeySig { key_id: arg(&args, 0), username },
        "ERRSIG" => StatusLine::ErrSig {
            key_id: arg(&args, 0),
            timestamp: opt_arg(&args, 4),
            rc: num_arg(&args, 5),
            fingerprint: opt_arg(&args, 6),
        },
        "VALIDSIG" => StatusLine::ValidSig {
            fingerprint: arg(&args, 0),
            timestamp: arg(&args, 2),
            primary_fingerprint: opt_arg(&args, 9),
        },
        "SIG_ID" => StatusLine::SigId {
            signature_id: arg(&args, 0),
            timestamp: arg(&args, 2),
        },
        "NO_PUBKEY" => StatusLine::NoPubkey { key_id: arg(&args, 0) },
        "NO_SECKEY" => StatusLine::NoSeckey { key_id: arg(&args, 0) },
        "NODATA" => StatusLine::NoData(num_arg(&args, 0)),
        "SIG_CREATED" => StatusLine::SigCreated {
            fingerprint: arg(&args, 5),
            timestamp: arg(&args, 4),
        },
        "NEED_PASSPHRASE" => StatusLine::NeedPassphrase,
        "BAD_PASSPHRASE" => StatusLine::BadPassphrase,
        "GOOD_PASSPHRASE" => StatusLine::GoodPassphrase,
        "MISSING_PASSPHRASE" => StatusLine::MissingPassphrase,
        "IMPORT_OK" => StatusLine::ImportOk {
            reason: num_arg(&args, 0),
            fingerprint: arg(&args, 1),
        },
        "IMPORT_PROBLEM" => StatusLine::ImportProblem { reason: num_arg(&args, 0) },
        "IMPORT_RES" => StatusLine::ImportRes {
            count: num_arg(&args, 0),
            imported: num_arg(&args, 2),
            unchanged: num_arg(&args, 4),
        },
        "IMPORTED" => StatusLine::Imported { key_id: arg(&args, 0), username },
        "PLAINTEXT" => StatusLine::Plaintext,
        "DECRYPTION_OKAY" => StatusLine::DecryptionOkay,
        "DECRYPTION_FAILED" => StatusLine::DecryptionFailed,
        "FAILURE" => StatusLine::Failure {
            location: arg(&args, 0),
            code: num_arg(&args, 1),
        },
        "ERROR" => StatusLine::Error {
            location: arg(&args, 0),
            code: num_arg(&args, 1),
        },
        other => StatusLine::Other {
            keyword: other.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        },
    };
    Some(parsed)
}

/// Parses a gpg timestamp: seconds since the epoch or ISO 8601 basic format.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0);
    }
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Normalises a key id or fingerprint reported by gpg to a long key id.
fn long_key_id(value: &str) -> String {
    fingerprint_suffix(value, 16).to_uppercase()
}

/// Status lines and free-form diagnostics from one gpg run.
#[derive(Debug, Clone, Default)]
pub struct StatusLog {
    lines: Vec<StatusLine>,
    diagnostics: Vec<String>,
}

impl StatusLog {
    /// Splits gpg's stderr into status lines and diagnostics.
    pub fn parse(stderr: &str) -> Self {
        let mut log = StatusLog::default();
        for line in stderr.lines() {
            match parse_status_line(line) {
                Some(status) => log.lines.push(status),
                None if !line.trim().is_empty() => log.diagnostics.push(line.trim().to_string()),
                None => {}
            }
        }
        log
    }

    pub fn lines(&self) -> &[StatusLine] {
        &self.lines
    }

    /// Human-readable gpg output, joined for error messages.
    pub fn diagnostics(&self) -> String {
        self.diagnostics.join("; ")
    }

    fn has(&self, predicate: impl Fn(&StatusLine) -> bool) -> bool {
        self.lines.iter().any(predicate)
    }

    fn failure_code(&self, code: u32) -> bool {
        self.has(|line| match line {
            StatusLine::Failure { code: c, .. } | StatusLine::Error { code: c, .. } => {
                c & 0xFFFF == code
            }
            _ => false,
        })
    }

    /// Fingerprint of the key that made a signature, or the reason none was made.
    ///
    /// A wrong passphrase and a missing passphrase are reported separately:
    /// `BAD_PASSPHRASE` wins, then a passphrase request that was never
    /// satisfied, and only then a generic signing failure.
    pub fn sign_outcome(&self) -> Result<String, BackendError> {
        for line in &self.lines {
            if let StatusLine::SigCreated { fingerprint, .. } = line {
                return Ok(fingerprint.clone());
            }
        }

        if self.has(|l| *l == StatusLine::BadPassphrase) || self.failure_code(GPG_ERR_BAD_PASSPHRASE)
        {
            return Err(BackendError::BadPassphrase);
        }

        let asked = self.has(|l| *l == StatusLine::NeedPassphrase);
        let satisfied = self.has(|l| *l == StatusLine::GoodPassphrase);
        if self.has(|l| *l == StatusLine::MissingPassphrase)
            || (asked && !satisfied)
            || self.failure_code(GPG_ERR_NO_PASSPHRASE)
            || self.failure_code(GPG_ERR_CANCELED)
        {
            return Err(BackendError::NeedPassphrase);
        }

        let detail = self.diagnostics();
        Err(BackendError::Signing(if detail.is_empty() {
            "no signature was created".to_string()
        } else {
            detail
        }))
    }

    /// Summarises `IMPORT_OK` lines.
    pub fn import_result(&self) -> ImportResult {
        let mut result = ImportResult::default();
        for line in &self.lines {
            if let StatusLine::ImportOk { reason, fingerprint } = line {
                if reason & IMPORT_REASON_SECRET != 0 {
                    result.secret = true;
                }
                let fingerprint = fingerprint.to_uppercase();
                if !fingerprint.is_empty() && !result.fingerprints.contains(&fingerprint) {
                    result.fingerprints.push(fingerprint);
                }
            }
        }
        result.count = result.fingerprints.len();
        result
    }

    /// Extracts the first signature's details; `None` when no signature was seen.
    pub fn verification(&self) -> Option<VerificationResult> {
        let mut status = None;
        let mut key_id = None;
        let mut username = None;
        let mut date_time = None;
        let mut signature_id = None;
        let mut fingerprint = None;
        let mut pubkey_fingerprint = None;

        for line in &self.lines {
            match line {
                StatusLine::GoodSig { key_id: k, username: u }
                | StatusLine::BadSig { key_id: k, username: u }
                | StatusLine::ExpSig { key_id: k, username: u }
                | StatusLine::ExpKeySig { key_id: k, username: u }
                | StatusLine::RevKeySig { key_id: k, username: u } => {
                    if status.is_none() {
                        status = Some(match line {
                            StatusLine::GoodSig { .. } => VerifyStatus::Valid,
                            StatusLine::BadSig { .. } => VerifyStatus::BadSignature,
                            StatusLine::ExpSig { .. } => VerifyStatus::ExpiredSignature,
                            StatusLine::ExpKeySig { .. } => VerifyStatus::ExpiredKey,
                            _ => VerifyStatus::RevokedKey,
                        });
                        key_id = Some(long_key_id(k));
                        username = Some(u.clone()).filter(|u| !u.is_empty());
                    }
                }
                StatusLine::ErrSig {
                    key_id: k,
                    timestamp,
                    rc,
                    ..
                } => {
                    if status.is_none() {
                        status = Some(if *rc == ERRSIG_NO_PUBKEY {
                            VerifyStatus::NoPublicKey
                        } else {
                            VerifyStatus::Error
                        });
                        key_id = Some(long_key_id(k));
                    }
                    if date_time.is_none() {
                        date_time = timestamp.as_deref().and_then(parse_timestamp);
                    }
                }
                StatusLine::NoPubkey { key_id: k } => {
                    if key_id.is_none() {
                        key_id = Some(long_key_id(k));
                    }
                    if status.is_none() {
                        status = Some(VerifyStatus::NoPublicKey);
                    }
                }
                StatusLine::ValidSig {
                    fingerprint: f,
                    timestamp,
                    primary_fingerprint,
                } => {
                    if fingerprint.is_none() {
                        fingerprint = Some(f.to_uppercase());
                        pubkey_fingerprint = Some(
                            primary_fingerprint
                                .as_deref()
                                .unwrap_or(f)
                                .to_uppercase(),
                        );
                        date_time = date_time.or_else(|| parse_timestamp(timestamp));
                    }
                }
                StatusLine::SigId {
                    signature_id: id,
                    timestamp,
                } => {
                    if signature_id.is_none() {
                        signature_id = Some(id.clone());
                        date_time = date_time.or_else(|| parse_timestamp(timestamp));
                    }
                }
                _ => {}
            }
        }

        let key_id = key_id.filter(|k| !k.is_empty())?;
        Some(VerificationResult {
            status: status.unwrap_or(VerifyStatus::Error),
            key_id,
            date_time,
            signature_id,
            fingerprint,
            pubkey_fingerprint,
            username,
        })
    }

    /// Whether a decrypt run produced literal data.
    pub fn decryption_outcome(&self) -> Result<(), BackendError> {
        if self.has(|l| *l == StatusLine::DecryptionFailed) {
            return Err(BackendError::Decryption("decryption failed".to_string()));
        }
        if self.has(|l| matches!(l, StatusLine::Plaintext | StatusLine::DecryptionOkay)) {
            return Ok(());
        }
        if self.has(|l| matches!(l, StatusLine::NoData(_))) {
            return Err(BackendError::Decryption("no data was provided".to_string()));
        }
        if self.has(|l| matches!(l, StatusLine::NoSeckey { .. })) {
            return Err(BackendError::Decryption("secret key not available".to_string()));
        }
        Err(BackendError::Decryption(format!(
            "no plaintext produced: {}",
            self.diagnostics()
        )))
    }
}
