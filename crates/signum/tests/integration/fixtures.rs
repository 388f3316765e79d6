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

//! Shared setup.

use signum::prelude::*;
use signum_testing::{FakeBackend, FakeKey, InMemoryDocumentSource};
use std::sync::Arc;

pub struct TestFixture {
    pub backend: Arc<FakeBackend>,
    pub documents: InMemoryDocumentSource,
    pub keys: KeyRepository,
    pub engine: SignatureEngine,
    pub config: SignumConfig,
    pub database: Database,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(SignumConfig::default()).await
    }

    pub async fn with_config(config: SignumConfig) -> Self {
        Self::build(config, None).await
    }

    /// Fixture whose key repository schedules reconciliation on `queue`.
    pub async fn with_queue(config: SignumConfig, queue: TaskQueue) -> Self {
        Self::build(config, Some(queue)).await
    }

    async fn build(config: SignumConfig, queue: Option<TaskQueue>) -> Self {
        signum_testing::init_test_logging();

        let database = Database::new(":memory:", "", config.db_pool_size())
            .expect("in-memory database");
        database.run_migrations().await.expect("migrations");
        let dal = DAL::new(database.clone());

        let backend = Arc::new(FakeBackend::new());
        let documents = InMemoryDocumentSource::new();

        let mut keys = KeyRepository::new(dal.clone(), backend.clone(), config.clone());
        if let Some(queue) = queue {
            keys = keys.with_task_queue(queue);
        }
        let engine = SignatureEngine::new(
            dal,
            backend.clone(),
            keys.clone(),
            Arc::new(documents.clone()),
            config.clone(),
        );

        Self {
            backend,
            documents,
            keys,
            engine,
            config,
            database,
        }
    }

    /// Imports the secret part of `key`.
    pub async fn import_secret(&self, key: &FakeKey) -> Key {
        self.keys
            .import_key(key.secret_block().as_bytes())
            .await
            .expect("secret key import")
    }

    /// Imports the public part of `key`.
    pub async fn import_public(&self, key: &FakeKey) -> Key {
        self.keys
            .import_key(key.public_block().as_bytes())
            .await
            .expect("public key import")
    }

    /// Content signed by `key` outside the repository.
    pub fn embedded_by(&self, key: &FakeKey, content: &[u8]) -> Vec<u8> {
        self.backend
            .sign(
                content,
                key.secret_block().as_bytes(),
                &signum::crypto::SignOptions::embedded(None),
            )
            .expect("fake signing")
    }

    /// Detached signature made by `key` outside the repository.
    pub fn detached_by(&self, key: &FakeKey, content: &[u8]) -> Vec<u8> {
        self.backend
            .sign(
                content,
                key.secret_block().as_bytes(),
                &signum::crypto::SignOptions::detached(None),
            )
            .expect("fake signing")
    }
}
