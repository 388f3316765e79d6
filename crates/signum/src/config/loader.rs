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

//! TOML configuration file discovery and loading.
//!
//! Values may reference environment variables as `${VAR}`, `${VAR:-default}`,
//! or `${VAR:?message}`; substitution happens before the TOML is parsed.
//!
//! ```toml
//! [database]
//! url = "${SIGNUM_DATABASE_URL:-signum.db}"
//!
//! [gpg]
//! path = "gpg"
//! keyservers = ["hkps://keys.openpgp.org"]
//! key_id_length = "long"
//! timeout_secs = 120
//!
//! [workers]
//! count = 4
//! ```

use super::{KeyIdLength, SignumConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

const KEYSERVER_SCHEMES: &[&str] = &["hkp", "hkps", "http", "https", "ldap"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found in any search location")]
    ConfigNotFound,

    #[error("Failed to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Environment variable substitution failed: {0}")]
    EnvSubstitutionError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// On-disk configuration layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub gpg: GpgSection,
    pub workers: WorkerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub pool_size: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "signum.db".to_string(),
            pool_size: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpgSection {
    pub path: PathBuf,
    pub keyservers: Vec<String>,
    pub key_id_length: KeyIdLength,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyring_root: Option<PathBuf>,
    pub fetch_missing_keys: bool,
    pub max_unwrap_depth: usize,
}

impl Default for GpgSection {
    fn default() -> Self {
        let defaults = SignumConfig::default();
        Self {
            path: defaults.gpg_path().to_path_buf(),
            keyservers: defaults.keyservers().to_vec(),
            key_id_length: defaults.key_id_length(),
            timeout_secs: defaults.backend_timeout().as_secs(),
            keyring_root: None,
            fetch_missing_keys: defaults.fetch_missing_keys(),
            max_unwrap_depth: defaults.max_unwrap_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub count: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            count: SignumConfig::default().worker_count(),
        }
    }
}

impl ConfigFile {
    /// Validates the file and converts it into a [`SignumConfig`].
    pub fn into_config(self) -> Result<SignumConfig, ConfigError> {
        for server in &self.gpg.keyservers {
            validate_keyserver(server)?;
        }
        if self.gpg.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "gpg.timeout_secs must be positive".to_string(),
            ));
        }

        Ok(SignumConfig::builder()
            .gpg_path(self.gpg.path)
            .keyservers(self.gpg.keyservers)
            .key_id_length(self.gpg.key_id_length)
            .backend_timeout(Duration::from_secs(self.gpg.timeout_secs))
            .keyring_root(self.gpg.keyring_root)
            .fetch_missing_keys(self.gpg.fetch_missing_keys)
            .max_unwrap_depth(self.gpg.max_unwrap_depth)
            .worker_count(self.workers.count)
            .db_pool_size(self.database.pool_size)
            .build())
    }
}

fn validate_keyserver(server: &str) -> Result<(), ConfigError> {
    let url = Url::parse(server)
        .map_err(|e| ConfigError::Invalid(format!("keyserver '{}': {}", server, e)))?;
    if !KEYSERVER_SCHEMES.contains(&url.scheme()) {
        return Err(ConfigError::Invalid(format!(
            "keyserver '{}' has unsupported scheme '{}'",
            server,
            url.scheme()
        )));
    }
    Ok(())
}

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from("./signum.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("signum").join("config.toml"));
        }

        search_paths.push(PathBuf::from("/etc/signum/config.toml"));

        Self { search_paths }
    }

    /// Create a config loader with custom search paths
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load configuration from the specified file, `SIGNUM_CONFIG`, or the
    /// first existing search path.
    pub fn load_config(&self, config_file: Option<&Path>) -> Result<ConfigFile, ConfigError> {
        let config_path = if let Some(path) = config_file {
            path.to_path_buf()
        } else if let Ok(env_config) = env::var("SIGNUM_CONFIG") {
            PathBuf::from(env_config)
        } else {
            self.find_config_file().ok_or(ConfigError::ConfigNotFound)?
        };

        self.load_config_from_file(&config_path)
    }

    /// Load configuration from a specific file
    pub fn load_config_from_file(&self, path: &Path) -> Result<ConfigFile, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let substituted = self.substitute_env_vars(&content)?;
        Ok(toml::from_str::<ConfigFile>(&substituted)?)
    }

    /// Find the first existing configuration file in search paths
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in ENV_VAR_PATTERN.captures_iter(content) {
            let full_match = &cap[0];
            let replacement = self.process_var_expression(&cap[1])?;
            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    /// Process a variable expression like "VAR", "VAR:-default", or "VAR:?error"
    fn process_var_expression(&self, expr: &str) -> Result<String, ConfigError> {
        if let Some((var_name, default_value)) = expr.split_once(":-") {
            Ok(env::var(var_name).unwrap_or_else(|_| default_value.to_string()))
        } else if let Some((var_name, error_msg)) = expr.split_once(":?") {
            env::var(var_name).map_err(|_| {
                ConfigError::EnvSubstitutionError(format!(
                    "Required environment variable '{}' is not set: {}",
                    var_name, error_msg
                ))
            })
        } else {
            env::var(expr).map_err(|_| {
                ConfigError::EnvSubstitutionError(format!(
                    "Required environment variable '{}' is not set",
                    expr
                ))
            })
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_env_substitution_with_default() {
        let loader = ConfigLoader::new();
        env::remove_var("SIGNUM_TEST_VAR_DEFAULT");

        let content = "url = \"${SIGNUM_TEST_VAR_DEFAULT:-signum.db}\"";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, "url = \"signum.db\"");
    }

    #[test]
    #[serial]
    fn test_env_substitution_with_existing_var() {
        let loader = ConfigLoader::new();
        env::set_var("SIGNUM_TEST_VAR", "/var/lib/signum.db");

        let content = "url = \"${SIGNUM_TEST_VAR:-signum.db}\"";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, "url = \"/var/lib/signum.db\"");

        env::remove_var("SIGNUM_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_env_substitution_required_var_missing() {
        let loader = ConfigLoader::new();
        env::remove_var("SIGNUM_REQUIRED_VAR");

        let result = loader.substitute_env_vars("url = \"${SIGNUM_REQUIRED_VAR:?set it}\"");
        assert!(matches!(result, Err(ConfigError::EnvSubstitutionError(msg)) if msg.contains("set it")));
    }

    #[test]
    #[serial]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "sqlite:///tmp/signum.db"

[gpg]
keyservers = ["hkps://one.example", "hkp://two.example:11371"]
key_id_length = "short"
timeout_secs = 30

[workers]
count = 3
"#
        )
        .unwrap();

        let loader = ConfigLoader::with_search_paths(vec![]);
        let file_config = loader.load_config(Some(file.path())).unwrap();
        assert_eq!(file_config.database.url, "sqlite:///tmp/signum.db");

        let config = file_config.into_config().unwrap();
        assert_eq!(config.keyservers().len(), 2);
        assert_eq!(config.key_id_length(), KeyIdLength::Short);
        assert_eq!(config.backend_timeout(), Duration::from_secs(30));
        assert_eq!(config.worker_count(), 3);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(config.database.url, "signum.db");
        assert_eq!(config.gpg.key_id_length, KeyIdLength::Long);
        assert!(config.into_config().is_ok());
    }

    #[test]
    fn test_rejects_bad_keyserver() {
        let mut config = ConfigFile::default();
        config.gpg.keyservers = vec!["ftp://keys.example".to_string()];
        assert!(matches!(config.into_config(), Err(ConfigError::Invalid(_))));

        let mut config = ConfigFile::default();
        config.gpg.keyservers = vec!["not a url".to_string()];
        assert!(config.into_config().is_err());
    }

    #[test]
    #[serial]
    fn test_config_not_found() {
        env::remove_var("SIGNUM_CONFIG");
        let loader = ConfigLoader::with_search_paths(vec![PathBuf::from("/nonexistent/signum.toml")]);
        assert!(matches!(
            loader.load_config(None),
            Err(ConfigError::ConfigNotFound)
        ));
    }
}
