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

//! A deterministic in-process crypto backend.
//!
//! Formats:
//!
//! - embedded container: `FAKEPGP-SIGNED` header lines (`signer`, `sig`,
//!   `time`), a blank line, then the original content byte for byte
//! - detached signature: `FAKEPGP-DETACHED` header lines plus a `digest` of
//!   the signed content
//!
//! Signature ids are random per signing, like real OpenPGP signatures.

use crate::keys::FakeKey;
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use signum::crypto::{
    BackendError, CryptoBackend, ImportResult, KeyInfo, KeyStub, SignOptions, VerificationResult,
    VerifyStatus,
};
use signum::models::{fingerprint_suffix, KeyType};
use std::collections::{HashMap, HashSet, VecDeque};

const EMBEDDED_MAGIC: &str = "FAKEPGP-SIGNED\n";
const DETACHED_MAGIC: &str = "FAKEPGP-DETACHED\n";

struct Header {
    signer: String,
    signature_id: String,
    time: i64,
    digest: Option<String>,
}

fn parse_header(text: &str) -> Option<Header> {
    let mut fields = HashMap::new();
    for line in text.lines() {
        if let Some((name, value)) = line.split_once(": ") {
            fields.insert(name, value);
        }
    }
    Some(Header {
        signer: fields.get("signer")?.to_string(),
        signature_id: fields.get("sig")?.to_string(),
        time: fields.get("time")?.parse().ok()?,
        digest: fields.get("digest").map(|d| d.to_string()),
    })
}

/// Splits an embedded container into header and content.
fn open_container(content: &[u8]) -> Option<(Header, &[u8])> {
    let rest = content.strip_prefix(EMBEDDED_MAGIC.as_bytes())?;
    let split = rest.windows(2).position(|w| w == b"\n\n")?;
    let header = parse_header(std::str::from_utf8(&rest[..split]).ok()?)?;
    Some((header, &rest[split + 2..]))
}

fn digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn long_key_id(fingerprint: &str) -> String {
    fingerprint_suffix(fingerprint, 16).to_string()
}

/// Deterministic [`CryptoBackend`] for tests.
///
/// Holds a simulated keyserver and a queue of injected failures; it keeps no
/// keyring between calls.
#[derive(Default)]
pub struct FakeBackend {
    keyserver: Mutex<HashMap<String, FakeKey>>,
    unreachable: Mutex<HashSet<String>>,
    failures: Mutex<VecDeque<BackendError>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the public part of `key` available from every reachable keyserver.
    pub fn publish(&self, key: &FakeKey) {
        let mut public = key.clone();
        public.secret = false;
        public.passphrase = None;
        self.keyserver.lock().insert(key.fingerprint().to_string(), public);
    }

    /// Makes calls against `server` fail as if it could not be reached.
    pub fn set_unreachable(&self, server: &str) {
        self.unreachable.lock().insert(server.to_string());
    }

    /// The next backend call returns `error` instead of running.
    pub fn inject_failure(&self, error: BackendError) {
        self.failures.lock().push_back(error);
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn check_server(&self, server: &str) -> Result<(), BackendError> {
        if self.unreachable.lock().contains(server) {
            return Err(BackendError::Process(format!("keyserver {} unreachable", server)));
        }
        Ok(())
    }

    fn parse_keys(key_data: &[u8]) -> Vec<FakeKey> {
        FakeKey::parse_all(&String::from_utf8_lossy(key_data))
    }

    /// Builds a verification result for a signature made by `header.signer`.
    fn result_for(header: &Header, known: &[FakeKey], digest_ok: bool) -> VerificationResult {
        let key_id = long_key_id(&header.signer);
        let date_time = DateTime::<Utc>::from_timestamp(header.time, 0);
        let signer = known.iter().find(|k| k.fingerprint == header.signer);

        match signer {
            None => VerificationResult {
                status: VerifyStatus::NoPublicKey,
                key_id,
                date_time,
                signature_id: None,
                fingerprint: None,
                pubkey_fingerprint: None,
                username: None,
            },
            Some(_) if !digest_ok => VerificationResult {
                status: VerifyStatus::BadSignature,
                key_id,
                date_time,
                signature_id: None,
                fingerprint: None,
                pubkey_fingerprint: None,
                username: None,
            },
            Some(key) => VerificationResult {
                status: VerifyStatus::Valid,
                key_id,
                date_time,
                signature_id: Some(header.signature_id.clone()),
                fingerprint: Some(key.fingerprint.clone()),
                pubkey_fingerprint: Some(key.fingerprint.clone()),
                username: Some(key.uid.clone()),
            },
        }
    }
}

impl CryptoBackend for FakeBackend {
    fn import_key(&self, key_data: &[u8]) -> Result<ImportResult, BackendError> {
        self.take_failure()?;
        let keys = Self::parse_keys(key_data);
        let mut fingerprints: Vec<String> = Vec::new();
        for key in &keys {
            if !fingerprints.contains(&key.fingerprint) {
                fingerprints.push(key.fingerprint.clone());
            }
        }
        Ok(ImportResult {
            count: fingerprints.len(),
            fingerprints,
            secret: keys.iter().any(|k| k.secret),
        })
    }

    fn import_and_introspect(
        &self,
        key_data: &[u8],
    ) -> Result<(ImportResult, Option<KeyInfo>), BackendError> {
        let result = self.import_key(key_data)?;
        let keys = Self::parse_keys(key_data);
        let Some(first) = keys.first() else {
            return Ok((result, None));
        };
        let info = KeyInfo {
            fingerprint: first.fingerprint.clone(),
            key_type: if first.secret {
                KeyType::Secret
            } else {
                KeyType::Public
            },
            algorithm: 1,
            length: 3072,
            creation_date: first.created,
            expiration_date: first.expires,
            uids: vec![first.uid.clone()],
        };
        Ok((result, Some(info)))
    }

    fn sign(
        &self,
        content: &[u8],
        key_data: &[u8],
        options: &SignOptions,
    ) -> Result<Vec<u8>, BackendError> {
        self.take_failure()?;
        let keys = Self::parse_keys(key_data);
        if keys.is_empty() {
            return Err(BackendError::KeyImport("no keys found in key data".to_string()));
        }
        let key = keys.iter().find(|k| k.secret).ok_or_else(|| {
            BackendError::Signing("key data does not contain a secret key".to_string())
        })?;

        match (&key.passphrase, &options.passphrase) {
            (Some(_), None) => return Err(BackendError::NeedPassphrase),
            (Some(expected), Some(given)) if expected != given => {
                return Err(BackendError::BadPassphrase)
            }
            _ => {}
        }

        let mut raw = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut raw);
        let signature_id = base64::engine::general_purpose::STANDARD_NO_PAD.encode(raw);
        let time = Utc::now().timestamp();

        if options.detached {
            Ok(format!(
                "{}signer: {}\nsig: {}\ntime: {}\ndigest: {}\n",
                DETACHED_MAGIC,
                key.fingerprint,
                signature_id,
                time,
                digest(content)
            )
            .into_bytes())
        } else {
            let mut signed = format!(
                "{}signer: {}\nsig: {}\ntime: {}\n\n",
                EMBEDDED_MAGIC, key.fingerprint, signature_id, time
            )
            .into_bytes();
            signed.extend_from_slice(content);
            Ok(signed)
        }
    }

    fn verify(
        &self,
        content: &[u8],
        detached_signature: Option<&[u8]>,
        known_keys: &[String],
    ) -> Result<VerificationResult, BackendError> {
        self.take_failure()?;
        let known = FakeKey::parse_all(&known_keys.join("\n"));
        let not_signed = || BackendError::Verification("File not signed".to_string());

        match detached_signature {
            Some(signature) => {
                let header = signature
                    .strip_prefix(DETACHED_MAGIC.as_bytes())
                    .and_then(|rest| std::str::from_utf8(rest).ok())
                    .and_then(parse_header)
                    .ok_or_else(not_signed)?;
                let digest_ok = header.digest.as_deref() == Some(digest(content).as_str());
                Ok(Self::result_for(&header, &known, digest_ok))
            }
            None => {
                let (header, _) = open_container(content).ok_or_else(not_signed)?;
                Ok(Self::result_for(&header, &known, true))
            }
        }
    }

    fn decrypt(&self, content: &[u8], _known_keys: &[String]) -> Result<Vec<u8>, BackendError> {
        self.take_failure()?;
        open_container(content)
            .map(|(_, body)| body.to_vec())
            .ok_or_else(|| BackendError::Decryption("no data was provided".to_string()))
    }

    fn receive_from_keyserver(&self, server: &str, key_id: &str) -> Result<Vec<u8>, BackendError> {
        self.take_failure()?;
        self.check_server(server)?;
        let wanted = key_id.to_uppercase();
        self.keyserver
            .lock()
            .values()
            .find(|k| k.fingerprint.ends_with(&wanted))
            .map(|k| k.public_block().into_bytes())
            .ok_or_else(|| {
                BackendError::KeyFetching(format!("key {} not found on {}", key_id, server))
            })
    }

    fn search_keyserver(&self, server: &str, query: &str) -> Result<Vec<KeyStub>, BackendError> {
        self.take_failure()?;
        self.check_server(server)?;
        let needle = query.to_lowercase();
        let mut stubs: Vec<KeyStub> = self
            .keyserver
            .lock()
            .values()
            .filter(|k| {
                k.uid.to_lowercase().contains(&needle)
                    || k.fingerprint.to_lowercase().ends_with(&needle)
            })
            .map(|k| KeyStub {
                fingerprint: k.fingerprint.clone(),
                key_type: KeyType::Public,
                algorithm: Some(1),
                length: Some(3072),
                creation_date: Some(k.created),
                expiration_date: k.expires,
                uids: vec![k.uid.clone()],
            })
            .collect();
        stubs.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(stubs)
    }
}
