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

//! In-memory document files.

use async_trait::async_trait;
use parking_lot::RwLock;
use signum::database::UniversalUuid;
use signum::document::{DocumentError, DocumentFile, DocumentSource};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Store {
    files: HashMap<UniversalUuid, Vec<u8>>,
    parents: HashMap<UniversalUuid, UniversalUuid>,
    order: Vec<UniversalUuid>,
}

/// Document source keeping every revision in memory.
#[derive(Clone, Default)]
pub struct InMemoryDocumentSource {
    store: Arc<RwLock<Store>>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, content: Vec<u8>, parent: Option<UniversalUuid>) -> Arc<dyn DocumentFile> {
        let id = UniversalUuid::new_v4();
        let mut store = self.store.write();
        store.files.insert(id, content);
        store.order.push(id);
        if let Some(parent) = parent {
            store.parents.insert(id, parent);
        }
        Arc::new(InMemoryDocumentFile {
            id,
            source: self.clone(),
        })
    }

    pub fn add(&self, content: &[u8]) -> Arc<dyn DocumentFile> {
        self.insert(content.to_vec(), None)
    }

    /// Drops a revision, leaving any records that point at it dangling.
    pub fn remove(&self, id: UniversalUuid) -> bool {
        let mut store = self.store.write();
        store.order.retain(|existing| *existing != id);
        store.parents.remove(&id);
        store.files.remove(&id).is_some()
    }

    pub fn parent(&self, id: UniversalUuid) -> Option<UniversalUuid> {
        self.store.read().parents.get(&id).copied()
    }

    pub fn content(&self, id: UniversalUuid) -> Option<Vec<u8>> {
        self.store.read().files.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn get(&self, id: UniversalUuid) -> Result<Arc<dyn DocumentFile>, DocumentError> {
        if !self.store.read().files.contains_key(&id) {
            return Err(DocumentError::NotFound(id));
        }
        Ok(Arc::new(InMemoryDocumentFile {
            id,
            source: self.clone(),
        }))
    }

    async fn file_ids(&self) -> Result<Vec<UniversalUuid>, DocumentError> {
        Ok(self.store.read().order.clone())
    }

    async fn delete(&self, id: UniversalUuid) -> Result<(), DocumentError> {
        self.remove(id);
        Ok(())
    }
}

struct InMemoryDocumentFile {
    id: UniversalUuid,
    source: InMemoryDocumentSource,
}

#[async_trait]
impl DocumentFile for InMemoryDocumentFile {
    fn id(&self) -> UniversalUuid {
        self.id
    }

    async fn open(&self) -> Result<Vec<u8>, DocumentError> {
        self.source
            .content(self.id)
            .ok_or(DocumentError::NotFound(self.id))
    }

    async fn create_new_revision(
        &self,
        content: Vec<u8>,
    ) -> Result<Arc<dyn DocumentFile>, DocumentError> {
        Ok(self.source.insert(content, Some(self.id)))
    }
}
