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

//! Document file abstraction.
//!
//! Document storage belongs to the surrounding application. The signature
//! subsystem only needs to read a revision's bytes and, for embedded signing,
//! store a new revision. [`DocumentSource`] resolves file ids to revisions.

mod filesystem;

pub use filesystem::FsDocumentSource;

use crate::database::UniversalUuid;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document file not found: {0}")]
    NotFound(UniversalUuid),

    #[error("Document I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document storage error: {0}")]
    Storage(String),
}

/// One revision of a document file.
#[async_trait]
pub trait DocumentFile: Send + Sync {
    fn id(&self) -> UniversalUuid;

    /// Reads the full content of this revision.
    async fn open(&self) -> Result<Vec<u8>, DocumentError>;

    /// Stores `content` as a new revision that replaces this one.
    async fn create_new_revision(
        &self,
        content: Vec<u8>,
    ) -> Result<Arc<dyn DocumentFile>, DocumentError>;
}

/// Lookup of document file revisions by id.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get(&self, id: UniversalUuid) -> Result<Arc<dyn DocumentFile>, DocumentError>;

    /// Ids of every stored revision.
    async fn file_ids(&self) -> Result<Vec<UniversalUuid>, DocumentError>;

    /// Removes a revision. Removing a revision that is already gone is not an error.
    async fn delete(&self, id: UniversalUuid) -> Result<(), DocumentError>;
}
