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

//! Persistence-level errors shared by the data access layer.

use thiserror::Error;

/// Errors raised while reading or writing records.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Invalid key data")]
    InvalidKeyData,

    #[error("Key already exists: {0}")]
    KeyAlreadyExists(String),

    #[error("An embedded signature already exists for document file {0}")]
    EmbeddedSignatureExists(String),

    #[error("Invalid record in database: {0}")]
    InvalidRecord(String),
}

impl From<deadpool::managed::PoolError<deadpool_diesel::Error>> for ValidationError {
    fn from(err: deadpool::managed::PoolError<deadpool_diesel::Error>) -> Self {
        ValidationError::ConnectionPool(err.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for ValidationError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        ValidationError::ConnectionPool(err.to_string())
    }
}

impl ValidationError {
    /// True when the underlying database error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            ValidationError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}
