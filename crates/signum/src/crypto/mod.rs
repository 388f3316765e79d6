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

//! OpenPGP backend adapter.
//!
//! This module provides:
//! - The [`CryptoBackend`] capability trait and its value types
//! - [`GpgBackend`], which drives the `gpg` binary
//! - Ephemeral per-operation keyrings
//! - Parsers for GnuPG status lines and colon-delimited listings
//! - SHA256 content digests used to identify content in logs
//! - [`run_blocking`], the bridge from async callers to the blocking trait

mod backend;
pub mod colons;
mod gpg;
mod keyring;
pub mod status;

pub use backend::{
    BackendError, CryptoBackend, ImportResult, KeyInfo, KeyStub, SignOptions, VerificationResult,
    VerifyStatus,
};
pub use gpg::GpgBackend;
pub use keyring::EphemeralKeyring;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Computes the SHA256 hex digest of `content`.
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Runs a blocking backend call on tokio's blocking pool, bounded by `timeout`.
///
/// On timeout the call is abandoned and [`BackendError::Timeout`] returned; the
/// [`GpgBackend`] also kills its own child process at the same deadline.
pub async fn run_blocking<T, F>(
    backend: Arc<dyn CryptoBackend>,
    timeout: Duration,
    call: F,
) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce(&dyn CryptoBackend) -> Result<T, BackendError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(move || call(backend.as_ref()));
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(BackendError::Process(format!(
            "backend call did not complete: {}",
            join_error
        ))),
        Err(_) => Err(BackendError::Timeout(timeout)),
    }
}
