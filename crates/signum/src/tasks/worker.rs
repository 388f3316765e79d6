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

//! Worker pool executing queued signature tasks.

use super::{Message, SignatureTask, TaskQueue, TaskReceiver};
use crate::security::{BatchReport, SignatureEngine, SignatureError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Attempts allowed for a task whose failure is retryable.
const MAX_ATTEMPTS: u32 = 2;

/// A fixed set of tokio workers draining one [`TaskQueue`].
pub struct TaskWorkerPool {
    queue: TaskQueue,
    workers: Vec<JoinHandle<()>>,
}

impl TaskWorkerPool {
    /// Starts `worker_count` workers (at least one).
    pub fn start(
        engine: SignatureEngine,
        queue: TaskQueue,
        receiver: TaskReceiver,
        worker_count: usize,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = worker_count.max(1);

        let workers = (0..worker_count)
            .map(|index| {
                let engine = engine.clone();
                let queue = queue.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move { run_worker(index, engine, queue, receiver).await })
            })
            .collect();

        info!("Started {} signature task workers", worker_count);
        Self { queue, workers }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Stops accepting tasks, finishes the ones already queued and waits for
    /// every worker to exit.
    pub async fn shutdown(self) {
        self.queue.close(self.workers.len());
        for result in futures::future::join_all(self.workers).await {
            if let Err(e) = result {
                error!("Signature task worker panicked: {}", e);
            }
        }
        info!("Signature task workers stopped");
    }
}

async fn run_worker(
    index: usize,
    engine: SignatureEngine,
    queue: TaskQueue,
    receiver: Arc<Mutex<TaskReceiver>>,
) {
    loop {
        let message = receiver.lock().await.inner.recv().await;
        let (task, mut attempt) = match message {
            Some(Message::Task { task, attempt }) => (task, attempt),
            Some(Message::Stop) | None => break,
        };

        queue.started(&task);
        debug!("Worker {} running {}", index, task);
        loop {
            match execute(&engine, &task).await {
                Ok(report) => debug!("{} finished: {:?}", task, report),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    if !queue.is_closed() && queue.submit(task.clone(), attempt) {
                        warn!("{} failed, retrying: {}", task, e);
                    } else if queue.is_closed() {
                        // The queue no longer takes work; retry before this worker stops.
                        warn!("{} failed during shutdown, retrying now: {}", task, e);
                        continue;
                    }
                }
                Err(e) => error!("{} failed after {} attempt(s): {}", task, attempt + 1, e),
            }
            break;
        }
    }
    debug!("Worker {} exiting", index);
}

/// Runs one task against the engine.
pub async fn execute(
    engine: &SignatureEngine,
    task: &SignatureTask,
) -> Result<BatchReport, SignatureError> {
    match task {
        SignatureTask::VerifyMissingEmbeddedSignatures => {
            engine.verify_missing_embedded_signatures().await
        }
        SignatureTask::RefreshSignatureInformation => engine.refresh_signature_information().await,
        SignatureTask::VerifyKeySignatures { key_id } => engine.verify_key_signatures(key_id).await,
        SignatureTask::UnverifyKeySignatures { key_id } => {
            engine.unverify_key_signatures(key_id).await
        }
        SignatureTask::VerifyDocumentFile { file_id } => {
            let created = engine.verify_document_file(*file_id).await?;
            Ok(BatchReport {
                processed: 1,
                created: usize::from(created.is_some()),
                skipped: usize::from(created.is_none()),
                ..Default::default()
            })
        }
    }
}
