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

//! Directory-backed document store.

use super::{DocumentError, DocumentFile, DocumentSource};
use crate::database::UniversalUuid;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const PARENT_SUFFIX: &str = "parent";

/// Stores each revision as `<root>/<uuid>`.
///
/// A revision created from another one gets a `<uuid>.parent` sidecar holding
/// the id of the revision it replaces.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: UniversalUuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Stores `content` as a new document file with no parent.
    pub async fn add(&self, content: &[u8]) -> Result<Arc<dyn DocumentFile>, DocumentError> {
        let id = UniversalUuid::new_v4();
        tokio::fs::write(self.path_for(id), content).await?;
        debug!("Stored document file {} ({} bytes)", id, content.len());
        Ok(Arc::new(FsDocumentFile {
            id,
            source: self.clone(),
        }))
    }

    /// The revision `id` replaced, if any.
    pub async fn parent(&self, id: UniversalUuid) -> Result<Option<UniversalUuid>, DocumentError> {
        let sidecar = self.root.join(format!("{}.{}", id, PARENT_SUFFIX));
        match tokio::fs::read_to_string(&sidecar).await {
            Ok(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| DocumentError::Storage(format!("bad parent sidecar for {}: {}", id, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn get(&self, id: UniversalUuid) -> Result<Arc<dyn DocumentFile>, DocumentError> {
        if !tokio::fs::try_exists(self.path_for(id)).await? {
            return Err(DocumentError::NotFound(id));
        }
        Ok(Arc::new(FsDocumentFile {
            id,
            source: self.clone(),
        }))
    }

    async fn file_ids(&self) -> Result<Vec<UniversalUuid>, DocumentError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<UniversalUuid>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: UniversalUuid) -> Result<(), DocumentError> {
        let sidecar = self.root.join(format!("{}.{}", id, PARENT_SUFFIX));
        for path in [self.path_for(id), sidecar] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Document file {} removed", id);
        Ok(())
    }
}

struct FsDocumentFile {
    id: UniversalUuid,
    source: FsDocumentSource,
}

#[async_trait]
impl DocumentFile for FsDocumentFile {
    fn id(&self) -> UniversalUuid {
        self.id
    }

    async fn open(&self) -> Result<Vec<u8>, DocumentError> {
        match tokio::fs::read(self.source.path_for(self.id)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DocumentError::NotFound(self.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_new_revision(
        &self,
        content: Vec<u8>,
    ) -> Result<Arc<dyn DocumentFile>, DocumentError> {
        let revision = self.source.add(&content).await?;
        let sidecar = self
            .source
            .root
            .join(format!("{}.{}", revision.id(), PARENT_SUFFIX));
        tokio::fs::write(sidecar, self.id.to_string()).await?;
        debug!("Document file {} replaced by revision {}", self.id, revision.id());
        Ok(revision)
    }
}
