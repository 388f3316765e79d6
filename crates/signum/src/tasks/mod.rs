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

//! Background task dispatch.
//!
//! Reconciliation work is fire-and-forget: callers push a [`SignatureTask`]
//! onto a [`TaskQueue`] and carry on, and a [`TaskWorkerPool`] executes it
//! against the signature engine. Identical tasks that are still waiting
//! collapse into one, so a burst of triggers for the same key runs once.

mod worker;

pub use worker::{execute, TaskWorkerPool};

use crate::database::UniversalUuid;
use crate::models::fingerprint_suffix;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum SignatureTask {
    VerifyMissingEmbeddedSignatures,
    RefreshSignatureInformation,
    /// Resolve unverified records signed by this key.
    VerifyKeySignatures { key_id: String },
    /// Re-check verified records signed by this key.
    UnverifyKeySignatures { key_id: String },
    VerifyDocumentFile { file_id: UniversalUuid },
}

/// Long key id form used for task identity: uppercase, at most 16 characters.
fn task_key_id(key_id: &str) -> String {
    fingerprint_suffix(key_id.trim(), 16).to_uppercase()
}

impl SignatureTask {
    pub fn verify_key_signatures(key_id: &str) -> Self {
        SignatureTask::VerifyKeySignatures {
            key_id: task_key_id(key_id),
        }
    }

    pub fn unverify_key_signatures(key_id: &str) -> Self {
        SignatureTask::UnverifyKeySignatures {
            key_id: task_key_id(key_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureTask::VerifyMissingEmbeddedSignatures => "verify_missing_embedded_signatures",
            SignatureTask::RefreshSignatureInformation => "refresh_signature_information",
            SignatureTask::VerifyKeySignatures { .. } => "verify_key_signatures",
            SignatureTask::UnverifyKeySignatures { .. } => "unverify_key_signatures",
            SignatureTask::VerifyDocumentFile { .. } => "verify_document_file",
        }
    }
}

impl fmt::Display for SignatureTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureTask::VerifyKeySignatures { key_id }
            | SignatureTask::UnverifyKeySignatures { key_id } => {
                write!(f, "{}({})", self.name(), key_id)
            }
            SignatureTask::VerifyDocumentFile { file_id } => write!(f, "{}({})", self.name(), file_id),
            _ => f.write_str(self.name()),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Message {
    Task { task: SignatureTask, attempt: u32 },
    Stop,
}

/// Receiving half of a [`TaskQueue`], consumed by [`TaskWorkerPool::start`].
pub struct TaskReceiver {
    pub(crate) inner: mpsc::UnboundedReceiver<Message>,
}

/// Cloneable handle for submitting tasks.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Message>,
    pending: Arc<Mutex<HashSet<SignatureTask>>>,
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TaskQueue {
    pub fn new() -> (Self, TaskReceiver) {
        let (sender, inner) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                pending: Arc::new(Mutex::new(HashSet::new())),
                closed: Arc::new(AtomicBool::new(false)),
            },
            TaskReceiver { inner },
        )
    }

    /// Submits `task`. Returns `false` when an identical task is already
    /// waiting or the queue has been closed.
    pub fn enqueue(&self, task: SignatureTask) -> bool {
        self.submit(task, 0)
    }

    pub(crate) fn submit(&self, task: SignatureTask, attempt: u32) -> bool {
        if self.is_closed() {
            warn!("Task queue closed, dropping {}", task);
            return false;
        }
        {
            let mut pending = self.pending.lock();
            if !pending.insert(task.clone()) {
                debug!("{} already pending", task);
                return false;
            }
        }
        debug!("Queued {} (attempt {})", task, attempt + 1);
        if self.sender.send(Message::Task { task: task.clone(), attempt }).is_err() {
            self.pending.lock().remove(&task);
            warn!("No workers are receiving, dropping {}", task);
            return false;
        }
        true
    }

    /// Marks `task` as started so a new trigger for it queues again.
    pub(crate) fn started(&self, task: &SignatureTask) {
        self.pending.lock().remove(task);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops accepting tasks and tells `workers` workers to exit once the
    /// tasks already queued have been taken.
    pub(crate) fn close(&self, workers: usize) {
        self.closed.store(true, Ordering::SeqCst);
        for _ in 0..workers {
            let _ = self.sender.send(Message::Stop);
        }
    }
}
