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

//! Background reconciliation through the task queue.

use crate::fixtures::TestFixture;
use signum::crypto::BackendError;
use signum::prelude::*;
use signum::tasks::execute;
use signum_testing::FakeKey;
use std::time::Duration;

#[tokio::test]
async fn test_importing_a_key_verifies_its_signatures_in_the_background() {
    let (queue, receiver) = TaskQueue::new();
    let fixture = TestFixture::with_queue(SignumConfig::default(), queue.clone()).await;
    let pool = TaskWorkerPool::start(fixture.engine.clone(), queue.clone(), receiver, 2);

    let bob = FakeKey::new("bob");
    let file = fixture.documents.add(b"purchase order");
    let record = fixture
        .engine
        .attach_detached(file.as_ref(), fixture.detached_by(&bob, b"purchase order"))
        .await
        .unwrap();
    assert!(!record.is_verified());

    fixture.import_public(&bob).await;
    pool.shutdown().await;

    let record = fixture.engine.get_signature(record.id).await.unwrap();
    assert!(record.is_verified());
    assert_eq!(
        record.details.public_key_fingerprint.as_deref(),
        Some(bob.fingerprint())
    );
}

#[tokio::test]
async fn test_deleting_a_key_unverifies_its_signatures_in_the_background() {
    let (queue, receiver) = TaskQueue::new();
    let fixture = TestFixture::with_queue(SignumConfig::default(), queue.clone()).await;
    let pool = TaskWorkerPool::start(fixture.engine.clone(), queue.clone(), receiver, 1);

    let alice = FakeKey::new("alice");
    let key = fixture.import_secret(&alice).await;
    let file = fixture.documents.add(b"purchase order");
    let record = fixture
        .engine
        .sign_detached(file.as_ref(), &key, None)
        .await
        .unwrap();
    assert!(record.is_verified());

    fixture.keys.delete(&key).await.unwrap();
    pool.shutdown().await;

    let record = fixture.engine.get_signature(record.id).await.unwrap();
    assert!(!record.is_verified());
    assert_eq!(record.details.key_id, alice.key_id());
}

#[tokio::test]
async fn test_identical_pending_tasks_are_collapsed() {
    let (queue, _receiver) = TaskQueue::new();
    let alice = FakeKey::new("alice");

    assert!(queue.enqueue(SignatureTask::verify_key_signatures(alice.fingerprint())));
    assert!(!queue.enqueue(SignatureTask::verify_key_signatures(alice.key_id())));
    assert!(queue.enqueue(SignatureTask::RefreshSignatureInformation));
    assert!(!queue.enqueue(SignatureTask::RefreshSignatureInformation));
    assert_eq!(queue.pending_len(), 2);
}

#[tokio::test]
async fn test_closed_queue_rejects_new_tasks() {
    let (queue, receiver) = TaskQueue::new();
    let fixture = TestFixture::with_queue(SignumConfig::default(), queue.clone()).await;
    let pool = TaskWorkerPool::start(fixture.engine.clone(), queue.clone(), receiver, 3);

    pool.shutdown().await;

    assert!(queue.is_closed());
    assert!(!queue.enqueue(SignatureTask::VerifyMissingEmbeddedSignatures));
    // Key changes still succeed; only the follow-up work is dropped.
    fixture.import_public(&FakeKey::new("bob")).await;
    assert_eq!(queue.pending_len(), 0);
}

#[tokio::test]
async fn test_retryable_failure_during_shutdown_is_retried_before_workers_stop() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    fixture.import_public(&alice).await;
    let signed = fixture.documents.add(&fixture.embedded_by(&alice, b"memo"));

    let (queue, receiver) = TaskQueue::new();
    let pool = TaskWorkerPool::start(fixture.engine.clone(), queue.clone(), receiver, 1);
    fixture
        .backend
        .inject_failure(BackendError::Timeout(Duration::from_secs(120)));
    assert!(queue.enqueue(SignatureTask::VerifyDocumentFile {
        file_id: signed.id(),
    }));

    // The queue is closed before the worker first runs the task.
    pool.shutdown().await;

    let records = fixture.engine.signature_records(signed.id()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_verified());
}

#[tokio::test]
async fn test_execute_runs_a_single_task() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    fixture.import_public(&alice).await;
    let signed = fixture.documents.add(&fixture.embedded_by(&alice, b"memo"));

    let report = execute(
        &fixture.engine,
        &SignatureTask::VerifyDocumentFile {
            file_id: signed.id(),
        },
    )
    .await
    .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(fixture.engine.signature_records(signed.id()).await.unwrap().len(), 1);
}
