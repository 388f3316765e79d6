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

//! Signing, verification and the embedded read path.

use crate::fixtures::TestFixture;
use signum::crypto::{BackendError, VerifyStatus};
use signum::prelude::*;
use signum_testing::FakeKey;
use std::time::Duration;

#[tokio::test]
async fn test_detached_signing_records_the_signer() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let key = fixture.import_secret(&alice).await;
    let file = fixture.documents.add(b"quarterly report");

    let record = fixture
        .engine
        .sign_detached(file.as_ref(), &key, None)
        .await
        .unwrap();

    assert!(record.is_detached());
    assert_eq!(record.document_file_id, file.id());
    assert_eq!(record.details.key_id, alice.key_id());
    assert_eq!(
        record.details.public_key_fingerprint.as_deref(),
        Some(alice.fingerprint())
    );
    assert!(record.details.signature_id.is_some());
    assert!(record.details.date_time.is_some());

    // The document itself is untouched.
    assert_eq!(fixture.documents.len(), 1);
    assert_eq!(file.open().await.unwrap(), b"quarterly report");
}

#[tokio::test]
async fn test_missing_passphrase_is_reported_and_nothing_is_stored() {
    let fixture = TestFixture::new().await;
    let key = fixture
        .import_secret(&FakeKey::new("alice").with_passphrase("correct horse"))
        .await;
    let file = fixture.documents.add(b"contract");

    let result = fixture.engine.sign_detached(file.as_ref(), &key, None).await;

    assert!(matches!(result, Err(SignatureError::NeedPassphrase)));
    assert!(fixture
        .engine
        .signature_records(file.id())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_wrong_passphrase_is_distinct_from_missing_one() {
    let fixture = TestFixture::new().await;
    let key = fixture
        .import_secret(&FakeKey::new("alice").with_passphrase("correct horse"))
        .await;
    let file = fixture.documents.add(b"contract");

    let wrong = fixture
        .engine
        .sign_embedded(file.as_ref(), &key, Some("battery staple"))
        .await;
    assert!(matches!(wrong, Err(SignatureError::Passphrase)));
    assert_eq!(fixture.documents.len(), 1);

    let right = fixture
        .engine
        .sign_detached(file.as_ref(), &key, Some("correct horse"))
        .await;
    assert!(right.is_ok());
}

#[tokio::test]
async fn test_signing_with_a_public_key_fails() {
    let fixture = TestFixture::new().await;
    let key = fixture.import_public(&FakeKey::new("alice")).await;
    let file = fixture.documents.add(b"contract");

    let result = fixture.engine.sign_detached(file.as_ref(), &key, None).await;

    assert!(matches!(result, Err(SignatureError::Signing(_))));
}

#[tokio::test]
async fn test_embedded_signing_creates_a_new_revision() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let key = fixture.import_secret(&alice).await;
    let original = fixture.documents.add(b"minutes of the meeting");

    let record = fixture
        .engine
        .sign_embedded(original.as_ref(), &key, None)
        .await
        .unwrap();

    assert!(record.is_embedded());
    assert_ne!(record.document_file_id, original.id());
    assert_eq!(
        fixture.documents.parent(record.document_file_id),
        Some(original.id())
    );
    assert_eq!(
        record.details.public_key_fingerprint.as_deref(),
        Some(alice.fingerprint())
    );
    assert!(record.details.signature_id.is_some());

    let revision = fixture
        .engine
        .documents()
        .get(record.document_file_id)
        .await
        .unwrap();
    assert_ne!(revision.open().await.unwrap(), b"minutes of the meeting");
    assert_eq!(
        fixture.engine.open_plaintext(revision.as_ref()).await.unwrap(),
        b"minutes of the meeting"
    );
    assert_eq!(
        fixture.engine.open_plaintext(original.as_ref()).await.unwrap(),
        b"minutes of the meeting"
    );
}

#[tokio::test]
async fn test_nested_embedded_signatures_are_peeled() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let key = fixture.import_secret(&alice).await;
    let inner = fixture.embedded_by(&alice, b"layered");
    let file = fixture.documents.add(&inner);

    let record = fixture
        .engine
        .sign_embedded(file.as_ref(), &key, None)
        .await
        .unwrap();
    let revision = fixture
        .engine
        .documents()
        .get(record.document_file_id)
        .await
        .unwrap();

    assert_eq!(
        fixture.engine.open_plaintext(revision.as_ref()).await.unwrap(),
        b"layered"
    );
}

#[tokio::test]
async fn test_unwrap_depth_limits_peeling() {
    let config = SignumConfig::builder().max_unwrap_depth(1).build();
    let fixture = TestFixture::with_config(config).await;
    let alice = FakeKey::new("alice");
    let key = fixture.import_secret(&alice).await;
    let inner = fixture.embedded_by(&alice, b"layered");
    let file = fixture.documents.add(&inner);

    let record = fixture
        .engine
        .sign_embedded(file.as_ref(), &key, None)
        .await
        .unwrap();
    let revision = fixture
        .engine
        .documents()
        .get(record.document_file_id)
        .await
        .unwrap();

    assert_eq!(
        fixture.engine.open_plaintext(revision.as_ref()).await.unwrap(),
        inner
    );
}

#[tokio::test]
async fn test_verifying_unsigned_content_is_a_verification_error() {
    let fixture = TestFixture::new().await;
    let file = fixture.documents.add(b"plain text");

    let result = fixture.engine.verify(file.as_ref(), None).await;

    assert!(matches!(result, Err(SignatureError::Verification(_))));
}

#[tokio::test]
async fn test_verify_reports_unknown_signers() {
    let fixture = TestFixture::new().await;
    let mallory = FakeKey::new("mallory");
    let file = fixture.documents.add(&fixture.embedded_by(&mallory, b"note"));

    let result = fixture.engine.verify(file.as_ref(), None).await.unwrap();

    assert_eq!(result.status, VerifyStatus::NoPublicKey);
    assert_eq!(result.key_id, mallory.key_id());
    assert!(result.signature_id.is_none());
}

#[tokio::test]
async fn test_verify_fetches_unknown_signers_when_enabled() {
    let config = SignumConfig::builder().fetch_missing_keys(true).build();
    let fixture = TestFixture::with_config(config).await;
    let bob = FakeKey::new("bob");
    fixture.backend.publish(&bob);
    let file = fixture.documents.add(&fixture.embedded_by(&bob, b"note"));

    let result = fixture.engine.verify(file.as_ref(), None).await.unwrap();

    assert!(result.is_valid());
    assert_eq!(result.pubkey_fingerprint.as_deref(), Some(bob.fingerprint()));
    // Fetched keys are used for the check only.
    assert!(!fixture.keys.contains(bob.fingerprint()).await.unwrap());
}

#[tokio::test]
async fn test_attached_signature_from_unknown_signer_keeps_only_the_key_id() {
    let fixture = TestFixture::new().await;
    let bob = FakeKey::new("bob");
    let file = fixture.documents.add(b"invoice");

    let record = fixture
        .engine
        .attach_detached(file.as_ref(), fixture.detached_by(&bob, b"invoice"))
        .await
        .unwrap();

    assert_eq!(record.details.key_id, bob.key_id());
    assert!(record.details.signature_id.is_none());
    assert!(record.details.public_key_fingerprint.is_none());
    assert!(record.details.date_time.is_some());
}

#[tokio::test]
async fn test_attached_signature_over_other_content_is_stored_unverified() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    fixture.import_public(&alice).await;
    let file = fixture.documents.add(b"invoice v2");

    let record = fixture
        .engine
        .attach_detached(file.as_ref(), fixture.detached_by(&alice, b"invoice v1"))
        .await
        .unwrap();

    assert_eq!(record.details.key_id, alice.key_id());
    assert!(record.details.public_key_fingerprint.is_none());
    assert!(record.details.signature_id.is_none());
}

#[tokio::test]
async fn test_record_creation_completes_on_a_single_connection_pool() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let key = fixture.import_secret(&alice).await;
    let file = fixture.documents.add(b"invoice");
    let signature = fixture.detached_by(&alice, b"invoice");

    let attached = tokio::time::timeout(
        Duration::from_secs(5),
        fixture.engine.attach_detached(file.as_ref(), signature),
    )
    .await
    .expect("attach_detached returned")
    .unwrap();
    assert_eq!(attached.document_file_id, file.id());

    let signed = tokio::time::timeout(
        Duration::from_secs(5),
        fixture.engine.sign_detached(file.as_ref(), &key, None),
    )
    .await
    .expect("sign_detached returned")
    .unwrap();
    assert!(signed.is_detached());

    let embedded = tokio::time::timeout(
        Duration::from_secs(5),
        fixture.engine.sign_embedded(file.as_ref(), &key, None),
    )
    .await
    .expect("sign_embedded returned")
    .unwrap();
    assert!(embedded.is_embedded());

    assert_eq!(fixture.engine.signature_records(file.id()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_embedded_record_insert_removes_the_signed_revision() {
    let fixture = TestFixture::new().await;
    let key = fixture.import_secret(&FakeKey::new("alice")).await;
    let file = fixture.documents.add(b"memo");

    let conn = fixture.database.get_connection().await.unwrap();
    conn.interact(|conn| {
        use diesel::RunQueryDsl;
        diesel::sql_query("DROP TABLE signature_records").execute(conn)
    })
    .await
    .unwrap()
    .unwrap();
    drop(conn);

    let result = fixture.engine.sign_embedded(file.as_ref(), &key, None).await;

    assert!(matches!(result, Err(SignatureError::Database(_))));
    assert_eq!(fixture.documents.len(), 1);
    assert_eq!(fixture.documents.content(file.id()).unwrap(), b"memo");
}

#[tokio::test]
async fn test_transient_backend_failure_during_attach_stores_nothing() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let file = fixture.documents.add(b"invoice");
    let signature = fixture.detached_by(&alice, b"invoice");
    fixture
        .backend
        .inject_failure(BackendError::Timeout(Duration::from_secs(120)));

    let result = fixture.engine.attach_detached(file.as_ref(), signature).await;

    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert!(fixture
        .engine
        .signature_records(file.id())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_detached_blob_round_trips_through_the_record() {
    let fixture = TestFixture::new().await;
    let key = fixture.import_secret(&FakeKey::new("alice")).await;
    let file = fixture.documents.add(b"invoice");
    let record = fixture
        .engine
        .sign_detached(file.as_ref(), &key, None)
        .await
        .unwrap();

    let blob = fixture.engine.detached_signature_blob(record.id).await.unwrap();
    assert_eq!(Some(blob.as_slice()), record.signature_file());

    let result = fixture.engine.verify(file.as_ref(), Some(&blob)).await.unwrap();
    assert!(result.is_valid());
}

#[tokio::test]
async fn test_delete_detached_rejects_embedded_records() {
    let fixture = TestFixture::new().await;
    let key = fixture.import_secret(&FakeKey::new("alice")).await;
    let file = fixture.documents.add(b"invoice");

    let embedded = fixture
        .engine
        .sign_embedded(file.as_ref(), &key, None)
        .await
        .unwrap();
    let detached = fixture
        .engine
        .sign_detached(file.as_ref(), &key, None)
        .await
        .unwrap();

    assert!(matches!(
        fixture.engine.delete_detached(embedded.id).await,
        Err(SignatureError::WrongKind(_))
    ));
    assert!(matches!(
        fixture.engine.detached_signature_blob(embedded.id).await,
        Err(SignatureError::WrongKind(_))
    ));

    fixture.engine.delete_detached(detached.id).await.unwrap();
    assert!(matches!(
        fixture.engine.get_signature(detached.id).await,
        Err(SignatureError::SignatureDoesNotExist(_))
    ));
}

#[tokio::test]
async fn test_refresh_follows_key_import_and_delete() {
    let fixture = TestFixture::new().await;
    let bob = FakeKey::new("bob");
    let file = fixture.documents.add(b"invoice");
    let record = fixture
        .engine
        .attach_detached(file.as_ref(), fixture.detached_by(&bob, b"invoice"))
        .await
        .unwrap();
    assert!(record.details.public_key_fingerprint.is_none());

    let key = fixture.import_public(&bob).await;
    assert!(fixture.engine.refresh_record(&record).await.unwrap());
    let verified = fixture.engine.get_signature(record.id).await.unwrap();
    assert_eq!(
        verified.details.public_key_fingerprint.as_deref(),
        Some(bob.fingerprint())
    );
    assert!(verified.details.signature_id.is_some());

    // Nothing changed since the last refresh.
    assert!(!fixture.engine.refresh_record(&verified).await.unwrap());

    fixture.keys.delete(&key).await.unwrap();
    assert!(fixture.engine.refresh_record(&verified).await.unwrap());
    let unverified = fixture.engine.get_signature(record.id).await.unwrap();
    assert!(unverified.details.public_key_fingerprint.is_none());
    assert!(unverified.details.signature_id.is_none());
    assert_eq!(unverified.details.key_id, bob.key_id());
}

#[tokio::test]
async fn test_verify_document_file_creates_one_embedded_record() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    fixture.import_public(&alice).await;
    let signed = fixture.documents.add(&fixture.embedded_by(&alice, b"memo"));
    let plain = fixture.documents.add(b"memo");

    let created = fixture.engine.verify_document_file(signed.id()).await.unwrap();
    assert!(created.is_some_and(|r| r.is_embedded()));
    assert!(fixture
        .engine
        .verify_document_file(signed.id())
        .await
        .unwrap()
        .is_none());
    assert!(fixture
        .engine
        .verify_document_file(plain.id())
        .await
        .unwrap()
        .is_none());
    assert_eq!(fixture.engine.signature_records(signed.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_signing_keeps_signers_apart() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let bob = FakeKey::new("bob");
    let alice_key = fixture.import_secret(&alice).await;
    let bob_key = fixture.import_secret(&bob).await;
    let first = fixture.documents.add(b"first");
    let second = fixture.documents.add(b"second");

    let (a, b) = tokio::join!(
        fixture.engine.sign_detached(first.as_ref(), &alice_key, None),
        fixture.engine.sign_detached(second.as_ref(), &bob_key, None),
    );

    assert_eq!(
        a.unwrap().details.public_key_fingerprint.as_deref(),
        Some(alice.fingerprint())
    );
    assert_eq!(
        b.unwrap().details.public_key_fingerprint.as_deref(),
        Some(bob.fingerprint())
    );
}
