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

//! # signum-testing
//!
//! Test doubles for the signum crate.
//!
//! - [`FakeBackend`]: a deterministic [`signum::crypto::CryptoBackend`] that needs no OpenPGP
//!   engine. Keys, signatures and containers are plain text, so tests can
//!   build and inspect them directly.
//! - [`FakeKey`]: builds key blocks understood by [`FakeBackend`].
//! - [`InMemoryDocumentSource`]: document revisions held in memory.
//!
//! ```rust,ignore
//! use signum_testing::{FakeBackend, FakeKey};
//!
//! let backend = FakeBackend::new();
//! let alice = FakeKey::new("alice").with_passphrase("s3cret");
//! backend.publish(&alice);
//! ```

mod backend;
mod documents;
mod keys;

pub use backend::FakeBackend;
pub use documents::InMemoryDocumentSource;
pub use keys::FakeKey;

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the signum log subscriber once per test binary.
pub fn init_test_logging() {
    INIT.call_once(|| {
        signum::init_logging(None);
    });
}
