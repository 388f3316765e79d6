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

//! [`CryptoBackend`] implementation driving the `gpg` executable.

use super::backend::{
    BackendError, CryptoBackend, ImportResult, KeyInfo, KeyStub, SignOptions, VerificationResult,
};
use super::colons::{parse_key_listing, parse_search_listing};
use super::keyring::EphemeralKeyring;
use super::status::StatusLine;
use crate::config::SignumConfig;
use crate::models::KeyType;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Backend that runs every operation in its own throwaway gpg home directory.
#[derive(Debug, Clone)]
pub struct GpgBackend {
    gpg_path: PathBuf,
    keyring_root: Option<PathBuf>,
    timeout: Duration,
}

impl GpgBackend {
    pub fn new(config: &SignumConfig) -> Self {
        Self {
            gpg_path: config.gpg_path().to_path_buf(),
            keyring_root: config.keyring_root().map(|p| p.to_path_buf()),
            timeout: config.backend_timeout(),
        }
    }

    fn keyring(&self) -> Result<EphemeralKeyring, BackendError> {
        EphemeralKeyring::create(&self.gpg_path, self.keyring_root.as_deref(), self.timeout)
    }

    fn import_into(
        &self,
        keyring: &EphemeralKeyring,
        key_data: &[u8],
    ) -> Result<ImportResult, BackendError> {
        let result = keyring.import(key_data)?;
        if result.count == 0 {
            return Err(BackendError::KeyImport("no keys found in key data".to_string()));
        }
        Ok(result)
    }

    fn list_key(
        &self,
        keyring: &EphemeralKeyring,
        fingerprint: &str,
        secret: bool,
    ) -> Result<Option<KeyInfo>, BackendError> {
        let listing = if secret {
            "--list-secret-keys"
        } else {
            "--list-keys"
        };
        let output = keyring.run(["--with-colons", "--fixed-list-mode", listing, fingerprint])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_key_listing(&stdout)
            .into_iter()
            .find(|key| key.fingerprint.eq_ignore_ascii_case(fingerprint)))
    }
}

impl CryptoBackend for GpgBackend {
    fn import_key(&self, key_data: &[u8]) -> Result<ImportResult, BackendError> {
        let keyring = self.keyring()?;
        keyring.import(key_data)
    }

    fn import_and_introspect(
        &self,
        key_data: &[u8],
    ) -> Result<(ImportResult, Option<KeyInfo>), BackendError> {
        let keyring = self.keyring()?;
        let result = keyring.import(key_data)?;
        if result.count == 0 {
            return Ok((result, None));
        }
        let fingerprint = result
            .fingerprints
            .first()
            .cloned()
            .ok_or_else(|| BackendError::KeyImport("no fingerprint reported".to_string()))?;

        let info = match self.list_key(&keyring, &fingerprint, result.secret)? {
            Some(info) => info,
            None if result.secret => self
                .list_key(&keyring, &fingerprint, false)?
                .map(|info| KeyInfo {
                    key_type: KeyType::Secret,
                    ..info
                })
                .ok_or_else(|| BackendError::KeyImport(format!("key {} not listed", fingerprint)))?,
            None => {
                return Err(BackendError::KeyImport(format!(
                    "key {} not listed",
                    fingerprint
                )))
            }
        };
        Ok((result, Some(info)))
    }

    fn sign(
        &self,
        content: &[u8],
        key_data: &[u8],
        options: &SignOptions,
    ) -> Result<Vec<u8>, BackendError> {
        let keyring = self.keyring()?;
        let imported = self.import_into(&keyring, key_data)?;
        if !imported.secret {
            return Err(BackendError::Signing(
                "key data does not contain a secret key".to_string(),
            ));
        }
        let fingerprint = imported.fingerprints[0].clone();

        let content_path = keyring.write_file("content", content)?;
        let mut args: Vec<OsString> = vec![
            "--local-user".into(),
            fingerprint.into(),
            "--output".into(),
            "-".into(),
        ];
        if let Some(passphrase) = options.passphrase.as_deref() {
            let path = keyring.write_secret_file("passphrase", passphrase.as_bytes())?;
            args.push("--passphrase-file".into());
            args.push(path.into_os_string());
        }
        if !options.binary {
            args.push("--armor".into());
        }
        args.push(
            if options.detached {
                "--detach-sign"
            } else if options.clearsign {
                "--clearsign"
            } else {
                "--sign"
            }
            .into(),
        );
        args.push(content_path.into_os_string());

        let output = keyring.run(args)?;
        let signer = output.status.sign_outcome()?;
        if output.stdout.is_empty() {
            return Err(BackendError::Signing("gpg produced no output".to_string()));
        }
        debug!("Created signature with key {}", signer);
        Ok(output.stdout)
    }

    fn verify(
        &self,
        content: &[u8],
        detached_signature: Option<&[u8]>,
        known_keys: &[String],
    ) -> Result<VerificationResult, BackendError> {
        let keyring = self.keyring()?;
        keyring.import_all(known_keys)?;

        let content_path = keyring.write_file("content", content)?;
        let output = match detached_signature {
            Some(signature) => {
                let signature_path = keyring.write_file("content.sig", signature)?;
                keyring.run([
                    OsStr::new("--verify"),
                    signature_path.as_os_str(),
                    content_path.as_os_str(),
                ])?
            }
            None => keyring.run([OsStr::new("--verify"), content_path.as_os_str()])?,
        };

        output
            .status
            .verification()
            .ok_or_else(|| BackendError::Verification("File not signed".to_string()))
    }

    fn decrypt(&self, content: &[u8], known_keys: &[String]) -> Result<Vec<u8>, BackendError> {
        let keyring = self.keyring()?;
        keyring.import_all(known_keys)?;

        let content_path = keyring.write_file("content", content)?;
        let output = keyring.run([
            OsStr::new("--decrypt"),
            OsStr::new("--output"),
            OsStr::new("-"),
            content_path.as_os_str(),
        ])?;
        output.status.decryption_outcome()?;
        Ok(output.stdout)
    }

    fn receive_from_keyserver(&self, server: &str, key_id: &str) -> Result<Vec<u8>, BackendError> {
        let keyring = self.keyring()?;
        let output = keyring.run(["--keyserver", server, "--recv-keys", key_id])?;
        let imported = output.status.import_result();
        let fingerprint = imported.fingerprints.first().ok_or_else(|| {
            BackendError::KeyFetching(format!(
                "key {} not found on {}: {}",
                key_id,
                server,
                output.status.diagnostics()
            ))
        })?;

        let exported = keyring.run(["--armor", "--export", fingerprint.as_str()])?;
        if exported.stdout.is_empty() {
            return Err(BackendError::KeyFetching(format!(
                "key {} could not be exported after fetching",
                key_id
            )));
        }
        info!("Fetched key {} from {}", fingerprint, server);
        Ok(exported.stdout)
    }

    fn search_keyserver(&self, server: &str, query: &str) -> Result<Vec<KeyStub>, BackendError> {
        let keyring = self.keyring()?;
        let output = keyring.run(["--with-colons", "--keyserver", server, "--search-keys", query])?;
        let stubs = parse_search_listing(&String::from_utf8_lossy(&output.stdout));

        if stubs.is_empty() && !output.success {
            let diagnostics = output.status.diagnostics();
            let nothing_found = diagnostics.contains("not found")
                || output
                    .status
                    .lines()
                    .iter()
                    .any(|line| matches!(line, StatusLine::NoData(_)));
            if !nothing_found {
                return Err(BackendError::KeyFetching(format!(
                    "search on {} failed: {}",
                    server, diagnostics
                )));
            }
        }
        Ok(stubs)
    }
}
