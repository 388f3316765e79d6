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

//! Configuration for the signature subsystem.
//!
//! [`SignumConfig`] is built in code with [`SignumConfig::builder()`] or loaded
//! from a TOML file through [`ConfigLoader`].

mod loader;

pub use loader::{ConfigError, ConfigFile, ConfigLoader};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How many trailing fingerprint characters make up a key id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyIdLength {
    /// 8 hex characters
    Short,
    /// 16 hex characters
    #[default]
    Long,
}

impl KeyIdLength {
    pub fn chars(&self) -> usize {
        match self {
            KeyIdLength::Short => 8,
            KeyIdLength::Long => 16,
        }
    }
}

/// Configuration for the signature subsystem.
///
/// # Construction
///
/// ```rust,ignore
/// let config = SignumConfig::builder()
///     .keyservers(vec!["hkps://keys.openpgp.org".to_string()])
///     .key_id_length(KeyIdLength::Short)
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SignumConfig {
    gpg_path: PathBuf,
    keyservers: Vec<String>,
    key_id_length: KeyIdLength,
    backend_timeout: Duration,
    keyring_root: Option<PathBuf>,
    fetch_missing_keys: bool,
    max_unwrap_depth: usize,
    worker_count: usize,
    db_pool_size: u32,
}

impl SignumConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> SignumConfigBuilder {
        SignumConfigBuilder::default()
    }

    /// Path or name of the `gpg` executable.
    pub fn gpg_path(&self) -> &Path {
        &self.gpg_path
    }

    /// Keyservers queried in order for key receive and search.
    pub fn keyservers(&self) -> &[String] {
        &self.keyservers
    }

    pub fn key_id_length(&self) -> KeyIdLength {
        self.key_id_length
    }

    /// Upper bound on a single backend call.
    pub fn backend_timeout(&self) -> Duration {
        self.backend_timeout
    }

    /// Parent directory for ephemeral keyrings; the system temp dir when unset.
    pub fn keyring_root(&self) -> Option<&Path> {
        self.keyring_root.as_deref()
    }

    /// Whether verification fetches an unknown signer's key from a keyserver
    /// and retries once.
    pub fn fetch_missing_keys(&self) -> bool {
        self.fetch_missing_keys
    }

    /// Maximum number of nested embedded signatures peeled on open.
    pub fn max_unwrap_depth(&self) -> usize {
        self.max_unwrap_depth
    }

    /// Number of background task workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of database connections in the pool.
    pub fn db_pool_size(&self) -> u32 {
        self.db_pool_size
    }
}

/// Builder for [`SignumConfig`].
#[derive(Debug, Clone)]
pub struct SignumConfigBuilder {
    config: SignumConfig,
}

impl Default for SignumConfigBuilder {
    fn default() -> Self {
        Self {
            config: SignumConfig {
                gpg_path: PathBuf::from("gpg"),
                keyservers: vec!["hkps://keys.openpgp.org".to_string()],
                key_id_length: KeyIdLength::Long,
                backend_timeout: Duration::from_secs(120),
                keyring_root: None,
                fetch_missing_keys: false,
                max_unwrap_depth: 8,
                worker_count: 2,
                db_pool_size: 1,
            },
        }
    }
}

impl SignumConfigBuilder {
    /// Sets the `gpg` executable.
    pub fn gpg_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.gpg_path = value.into();
        self
    }

    /// Replaces the keyserver list.
    pub fn keyservers(mut self, value: Vec<String>) -> Self {
        self.config.keyservers = value;
        self
    }

    /// Sets the key id length.
    pub fn key_id_length(mut self, value: KeyIdLength) -> Self {
        self.config.key_id_length = value;
        self
    }

    /// Sets the per-call backend timeout.
    pub fn backend_timeout(mut self, value: Duration) -> Self {
        self.config.backend_timeout = value;
        self
    }

    /// Sets the parent directory for ephemeral keyrings.
    pub fn keyring_root(mut self, value: Option<PathBuf>) -> Self {
        self.config.keyring_root = value;
        self
    }

    /// Enables or disables keyserver fetch on unknown signers.
    pub fn fetch_missing_keys(mut self, value: bool) -> Self {
        self.config.fetch_missing_keys = value;
        self
    }

    /// Sets the embedded signature peel limit. Zero is raised to one.
    pub fn max_unwrap_depth(mut self, value: usize) -> Self {
        self.config.max_unwrap_depth = value.max(1);
        self
    }

    /// Sets the background worker count. Zero is raised to one.
    pub fn worker_count(mut self, value: usize) -> Self {
        self.config.worker_count = value.max(1);
        self
    }

    /// Sets the database pool size.
    pub fn db_pool_size(mut self, value: u32) -> Self {
        self.config.db_pool_size = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SignumConfig {
        self.config
    }
}

impl Default for SignumConfig {
    fn default() -> Self {
        SignumConfigBuilder::default().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SignumConfig::default();
        assert_eq!(config.gpg_path(), Path::new("gpg"));
        assert_eq!(config.key_id_length(), KeyIdLength::Long);
        assert_eq!(config.keyservers().len(), 1);
        assert!(!config.fetch_missing_keys());
        assert_eq!(config.max_unwrap_depth(), 8);
        assert_eq!(config.worker_count(), 2);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SignumConfig::builder()
            .gpg_path("/usr/local/bin/gpg2")
            .keyservers(vec![
                "hkps://one.example".to_string(),
                "hkps://two.example".to_string(),
            ])
            .key_id_length(KeyIdLength::Short)
            .backend_timeout(Duration::from_secs(5))
            .fetch_missing_keys(true)
            .worker_count(0)
            .max_unwrap_depth(0)
            .build();

        assert_eq!(config.gpg_path(), Path::new("/usr/local/bin/gpg2"));
        assert_eq!(config.keyservers()[1], "hkps://two.example");
        assert_eq!(config.key_id_length().chars(), 8);
        assert_eq!(config.backend_timeout(), Duration::from_secs(5));
        assert!(config.fetch_missing_keys());
        assert_eq!(config.worker_count(), 1);
        assert_eq!(config.max_unwrap_depth(), 1);
    }
}
