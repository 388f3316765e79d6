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

//! Wiring shared by every command.

use anyhow::{Context as _, Result};
use signum::config::{ConfigError, ConfigLoader};
use signum::document::FsDocumentSource;
use signum::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Context {
    pub keys: KeyRepository,
    pub engine: SignatureEngine,
    pub documents: Arc<FsDocumentSource>,
    workers: TaskWorkerPool,
}

impl Context {
    /// Loads configuration, opens the database and starts the task workers.
    ///
    /// A missing configuration file is not an error; defaults are used.
    pub async fn build(
        config_file: Option<&Path>,
        database_url: Option<&str>,
        documents_dir: &Path,
    ) -> Result<Self> {
        let file = match ConfigLoader::new().load_config(config_file) {
            Ok(file) => file,
            Err(ConfigError::ConfigNotFound) if config_file.is_none() => {
                debug!("No configuration file found, using defaults");
                Default::default()
            }
            Err(e) => return Err(e).context("Failed to load configuration"),
        };
        let url = database_url
            .map(str::to_string)
            .unwrap_or_else(|| file.database.url.clone());
        let config = file.into_config()?;

        let database = Database::new(&url, "", config.db_pool_size())
            .with_context(|| format!("Failed to open database {}", url))?;
        database
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
        let dal = DAL::new(database);

        let documents = Arc::new(
            FsDocumentSource::new(documents_dir).with_context(|| {
                format!("Failed to open document directory {}", documents_dir.display())
            })?,
        );

        let backend: Arc<dyn CryptoBackend> = Arc::new(GpgBackend::new(&config));
        let (queue, receiver) = TaskQueue::new();
        let keys = KeyRepository::new(dal.clone(), backend.clone(), config.clone())
            .with_task_queue(queue.clone());
        let engine = SignatureEngine::new(
            dal,
            backend,
            keys.clone(),
            documents.clone(),
            config.clone(),
        );
        let workers =
            TaskWorkerPool::start(engine.clone(), queue, receiver, config.worker_count());

        info!("Using database {} and documents in {}", url, documents_dir.display());
        Ok(Self {
            keys,
            engine,
            documents,
            workers,
        })
    }

    /// Resolves a fingerprint or key id to a stored key.
    pub async fn key(&self, key: &str) -> Result<Key> {
        let found = if key.len() == 40 {
            self.keys.get(key).await
        } else {
            self.keys.get_by_key_id(key).await
        };
        found.with_context(|| format!("No key matching {}", key))
    }

    /// Waits for queued background tasks and stops the workers.
    pub async fn finish(self) {
        self.workers.shutdown().await;
    }
}
