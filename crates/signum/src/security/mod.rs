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

//! Keys, signatures and their audit trail.
//!
//! - [`KeyRepository`]: import, fetch, search, list and delete keys
//! - [`SignatureEngine`]: sign, attach, verify and open documents
//! - [`reconciliation`]: sweeps that keep records in step with known keys
//! - [`audit`]: structured security events

pub mod audit;
mod key_repository;
pub mod reconciliation;
mod signature_engine;

pub use key_repository::{KeyError, KeyRepository};
pub use reconciliation::BatchReport;
pub use signature_engine::{SignatureEngine, SignatureError};
