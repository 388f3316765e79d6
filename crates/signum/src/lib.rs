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

//! # Signum
//!
//! Signum is the signature subsystem of a document management system. It keeps
//! a repository of OpenPGP keys, signs document files with embedded or
//! detached signatures, verifies them, and keeps stored signature metadata in
//! step with the keys that are currently known.
//!
//! The OpenPGP engine itself is an external collaborator reached through the
//! [`crypto::CryptoBackend`] trait. The shipped implementation,
//! [`crypto::GpgBackend`], drives the `gpg` binary and gives every operation its
//! own throwaway keyring so concurrent operations never share key material.
//!
//! ## Components
//!
//! - [`crypto`]: backend adapter, ephemeral keyrings, status and listing parsers
//! - [`security::KeyRepository`]: durable index of imported keys
//! - [`models::SignatureRecord`]: embedded and detached signature records
//! - [`security::SignatureEngine`]: sign, attach, verify, open, and the batch sweeps
//! - [`tasks`]: fire-and-forget background work with per-key deduplication
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use signum::prelude::*;
//!
//! let config = SignumConfig::builder().build();
//! let database = Database::new("signum.db", "", config.db_pool_size())?;
//! database.run_migrations().await?;
//! let dal = DAL::new(database);
//!
//! let backend: Arc<dyn CryptoBackend> = Arc::new(GpgBackend::new(&config));
//! let keys = KeyRepository::new(dal.clone(), backend.clone(), config.clone());
//! let documents = Arc::new(FsDocumentSource::new("documents")?);
//! let engine = SignatureEngine::new(dal, backend, keys.clone(), documents, config);
//!
//! let key = keys.import_key(armored.as_bytes()).await?;
//! let file = engine.documents().get(file_id).await?;
//! let signature = engine.sign_detached(file.as_ref(), &key, Some("passphrase")).await?;
//! ```

pub mod config;
pub mod crypto;
pub mod dal;
pub mod database;
pub mod document;
pub mod error;
pub mod models;
pub mod security;
pub mod tasks;

pub use config::{KeyIdLength, SignumConfig};
pub use dal::DAL;
pub use database::{Database, UniversalTimestamp, UniversalUuid};
pub use error::ValidationError;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::{KeyIdLength, SignumConfig};
    pub use crate::crypto::{BackendError, CryptoBackend, GpgBackend};
    pub use crate::dal::DAL;
    pub use crate::database::{Database, UniversalTimestamp, UniversalUuid};
    pub use crate::document::{DocumentFile, DocumentSource, FsDocumentSource};
    pub use crate::models::{Key, KeyType, SignatureKind, SignatureRecord};
    pub use crate::security::{KeyError, KeyRepository, SignatureEngine, SignatureError};
    pub use crate::tasks::{SignatureTask, TaskQueue, TaskWorkerPool};
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (or `info`) is used. Calling this
/// more than once is harmless, later calls are ignored.
pub fn init_logging(level: Option<tracing::Level>) {
    use tracing_subscriber::EnvFilter;

    let default_level = level.unwrap_or(tracing::Level::INFO);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string().to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
