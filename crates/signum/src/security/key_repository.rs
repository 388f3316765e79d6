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

//! Durable repository of OpenPGP keys.
//!
//! Keys enter the repository by importing key material, either supplied by
//! the caller or fetched from a keyserver. The backend introspects the
//! material so the stored record's metadata always comes from the key itself.
//! Every change that could affect stored signatures schedules a per-key
//! reconciliation task when a [`TaskQueue`] is attached.

use super::audit;
use crate::config::SignumConfig;
use crate::crypto::{run_blocking, BackendError, CryptoBackend, KeyStub};
use crate::dal::DAL;
use crate::error::ValidationError;
use crate::models::{Key, KeyType, NewKey};
use crate::tasks::{SignatureTask, TaskQueue};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from key repository operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key data")]
    InvalidKeyData,

    #[error("Key already exists: {0}")]
    KeyAlreadyExists(String),

    #[error("Key does not exist: {0}")]
    KeyDoesNotExist(String),

    #[error("Unable to import key: {0}")]
    KeyImport(String),

    #[error("Unable to fetch key: {0}")]
    KeyFetching(String),

    #[error("Unable to delete key {fingerprint}: {reason}")]
    KeyDelete { fingerprint: String, reason: String },

    #[error(transparent)]
    Backend(BackendError),

    #[error(transparent)]
    Database(ValidationError),
}

impl From<BackendError> for KeyError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::KeyImport(msg) => KeyError::KeyImport(msg),
            BackendError::KeyFetching(msg) => KeyError::KeyFetching(msg),
            other => KeyError::Backend(other),
        }
    }
}

impl From<ValidationError> for KeyError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::KeyAlreadyExists(fingerprint) => KeyError::KeyAlreadyExists(fingerprint),
            ValidationError::InvalidKeyData => KeyError::InvalidKeyData,
            other => KeyError::Database(other),
        }
    }
}

/// Repository of known keys.
#[derive(Clone)]
pub struct KeyRepository {
    dal: DAL,
    backend: Arc<dyn CryptoBackend>,
    config: SignumConfig,
    tasks: Option<TaskQueue>,
}

impl KeyRepository {
    pub fn new(dal: DAL, backend: Arc<dyn CryptoBackend>, config: SignumConfig) -> Self {
        let dal = dal.with_key_id_length(config.key_id_length());
        Self {
            dal,
            backend,
            config,
            tasks: None,
        }
    }

    /// Schedules per-key reconciliation on `queue` after imports and deletes.
    pub fn with_task_queue(mut self, queue: TaskQueue) -> Self {
        self.tasks = Some(queue);
        self
    }

    pub fn config(&self) -> &SignumConfig {
        &self.config
    }

    fn schedule(&self, task: SignatureTask) {
        if let Some(queue) = &self.tasks {
            queue.enqueue(task);
        }
    }

    /// Imports ASCII-armored key material and stores it.
    ///
    /// Fails with [`KeyError::InvalidKeyData`] when nothing was imported and
    /// [`KeyError::KeyAlreadyExists`] when the fingerprint is already stored.
    pub async fn import_key(&self, key_data: &[u8]) -> Result<Key, KeyError> {
        let armored = String::from_utf8(key_data.to_vec()).map_err(|_| {
            audit::log_key_import_failed("key data is not ASCII-armored text");
            KeyError::InvalidKeyData
        })?;

        let data = key_data.to_vec();
        let introspected = run_blocking(
            self.backend.clone(),
            self.config.backend_timeout(),
            move |backend| backend.import_and_introspect(&data),
        )
        .await;
        let (result, info) = match introspected {
            Ok((result, Some(info))) if result.count > 0 => (result, info),
            Ok(_) => {
                audit::log_key_import_failed("no keys found in key data");
                return Err(KeyError::InvalidKeyData);
            }
            Err(e) => {
                audit::log_key_import_failed(&e.to_string());
                return Err(e.into());
            }
        };

        let key_type = if result.secret || info.key_type == KeyType::Secret {
            KeyType::Secret
        } else {
            KeyType::Public
        };
        let new_key = NewKey {
            fingerprint: info.fingerprint.to_uppercase(),
            key_type,
            algorithm: info.algorithm,
            length: info.length,
            user_id: info.uids.first().cloned().unwrap_or_default(),
            creation_date: info.creation_date,
            expiration_date: info.expiration_date,
            key_data: armored,
        };

        let key = match self.dal.keys().create(new_key).await {
            Ok(key) => key,
            Err(e) => {
                audit::log_key_import_failed(&e.to_string());
                return Err(e.into());
            }
        };

        audit::log_key_imported(&key.fingerprint, key.key_type, &key.user_id);
        self.schedule(SignatureTask::verify_key_signatures(&key.fingerprint));
        Ok(key)
    }

    /// Fetches key material for `key_id` from the configured keyservers
    /// without storing it.
    ///
    /// Keyservers are tried in order and the first answer wins.
    pub async fn fetch_key_data(&self, key_id: &str) -> Result<Vec<u8>, KeyError> {
        let mut failures = Vec::new();
        for server in self.config.keyservers() {
            let server_owned = server.clone();
            let key_id_owned = key_id.to_string();
            let fetched = run_blocking(
                self.backend.clone(),
                self.config.backend_timeout(),
                move |backend| backend.receive_from_keyserver(&server_owned, &key_id_owned),
            )
            .await;
            match fetched {
                Ok(data) => {
                    audit::log_key_received(key_id, server);
                    return Ok(data);
                }
                Err(e) => {
                    warn!("Keyserver {} did not return key {}: {}", server, key_id, e);
                    failures.push(format!("{}: {}", server, e));
                }
            }
        }

        if failures.is_empty() {
            return Err(KeyError::KeyFetching("no keyservers configured".to_string()));
        }
        Err(KeyError::KeyFetching(format!(
            "no keyserver returned key {} ({})",
            key_id,
            failures.join("; ")
        )))
    }

    /// Fetches `key_id` from the keyservers and imports it.
    pub async fn receive_key(&self, key_id: &str) -> Result<Key, KeyError> {
        let data = self.fetch_key_data(key_id).await?;
        self.import_key(&data).await
    }

    /// Searches the keyservers. Nothing is stored.
    ///
    /// Results come from the first keyserver that answers.
    pub async fn search(&self, query: &str) -> Result<Vec<KeyStub>, KeyError> {
        let mut failures = Vec::new();
        for server in self.config.keyservers() {
            let server_owned = server.clone();
            let query_owned = query.to_string();
            let found = run_blocking(
                self.backend.clone(),
                self.config.backend_timeout(),
                move |backend| backend.search_keyserver(&server_owned, &query_owned),
            )
            .await;
            match found {
                Ok(stubs) => {
                    debug!("Keyserver {} returned {} keys for '{}'", server, stubs.len(), query);
                    return Ok(stubs);
                }
                Err(e) => {
                    warn!("Keyserver {} search failed: {}", server, e);
                    failures.push(format!("{}: {}", server, e));
                }
            }
        }

        if failures.is_empty() {
            return Err(KeyError::KeyFetching("no keyservers configured".to_string()));
        }
        Err(KeyError::KeyFetching(failures.join("; ")))
    }

    pub async fn public_keys(&self) -> Result<Vec<Key>, KeyError> {
        Ok(self.dal.keys().list(Some(KeyType::Public)).await?)
    }

    pub async fn private_keys(&self) -> Result<Vec<Key>, KeyError> {
        Ok(self.dal.keys().list(Some(KeyType::Secret)).await?)
    }

    pub async fn all(&self) -> Result<Vec<Key>, KeyError> {
        Ok(self.dal.keys().list(None).await?)
    }

    /// Looks a key up by fingerprint.
    pub async fn get(&self, fingerprint: &str) -> Result<Key, KeyError> {
        self.dal
            .keys()
            .get_by_fingerprint(fingerprint)
            .await?
            .ok_or_else(|| KeyError::KeyDoesNotExist(fingerprint.to_string()))
    }

    /// Looks a key up by key id (any fingerprint suffix).
    pub async fn get_by_key_id(&self, key_id: &str) -> Result<Key, KeyError> {
        self.dal
            .keys()
            .find_by_key_id(key_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KeyError::KeyDoesNotExist(key_id.to_string()))
    }

    /// True when a key with `fingerprint` is stored.
    pub async fn contains(&self, fingerprint: &str) -> Result<bool, KeyError> {
        Ok(self.dal.keys().exists(fingerprint).await?)
    }

    /// Key blocks of every stored key.
    pub async fn known_key_data(&self) -> Result<Vec<String>, KeyError> {
        Ok(self.dal.keys().all_key_data().await?)
    }

    /// Deletes `key`.
    ///
    /// Public and secret material for a fingerprint live in one record, so a
    /// secret key is always removed together with its public part. A failed
    /// delete is retried once before surfacing as [`KeyError::KeyDelete`].
    pub async fn delete(&self, key: &Key) -> Result<(), KeyError> {
        let deleted = match self.dal.keys().delete(&key.fingerprint).await {
            Ok(count) => count,
            Err(first) => {
                warn!("Deleting key {} failed, retrying: {}", key.fingerprint, first);
                self.dal
                    .keys()
                    .delete(&key.fingerprint)
                    .await
                    .map_err(|e| KeyError::KeyDelete {
                        fingerprint: key.fingerprint.clone(),
                        reason: e.to_string(),
                    })?
            }
        };

        if deleted == 0 {
            return Err(KeyError::KeyDoesNotExist(key.fingerprint.clone()));
        }

        audit::log_key_deleted(&key.fingerprint, key.key_type);
        self.schedule(SignatureTask::unverify_key_signatures(&key.fingerprint));
        Ok(())
    }
}
