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

//! Data Access Layer
//!
//! Typed accessors over the SQLite tables. Each accessor borrows the [`DAL`]
//! and runs its queries through the pool's `interact`, so callers stay async.

use crate::config::KeyIdLength;
use crate::database::Database;

pub mod key;
pub mod models;
pub mod signature_record;

pub use key::KeyDAL;
pub use signature_record::SignatureRecordDAL;

/// The main Data Access Layer struct.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
    key_id_length: KeyIdLength,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            key_id_length: KeyIdLength::default(),
        }
    }

    /// Sets the length of key ids derived when keys are loaded.
    pub fn with_key_id_length(mut self, key_id_length: KeyIdLength) -> Self {
        self.key_id_length = key_id_length;
        self
    }

    pub fn key_id_length(&self) -> KeyIdLength {
        self.key_id_length
    }

    pub fn keys(&self) -> KeyDAL<'_> {
        KeyDAL { dal: self }
    }

    pub fn signature_records(&self) -> SignatureRecordDAL<'_> {
        SignatureRecordDAL { dal: self }
    }
}
