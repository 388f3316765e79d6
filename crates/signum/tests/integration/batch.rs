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

//! Reconciliation sweeps.

use crate::fixtures::TestFixture;
use signum::prelude::*;
use signum::security::BatchReport;
use signum_testing::FakeKey;

#[tokio::test]
async fn test_missing_embedded_records_are_created_for_signed_files_only() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    fixture.import_public(&alice).await;

    for n in 0..3 {
        fixture.documents.add(format!("plain {}", n).as_bytes());
    }
    let signed: Vec<UniversalUuid> = (0..2)
        .map(|n| {
            let content = fixture.embedded_by(&alice, format!("signed {}", n).as_bytes());
            fixture.documents.add(&content).id()
        })
        .collect();

    let report = fixture.engine.verify_missing_embedded_signatures().await.unwrap();

    assert_eq!(
        report,
        BatchReport {
            processed: 5,
            created: 2,
            skipped: 3,
            ..Default::default()
        }
    );
    for id in signed {
        let records = fixture.engine.signature_records(id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].details.public_key_fingerprint.as_deref(),
            Some(alice.fingerprint())
        );
    }

    // A second sweep finds nothing new.
    let again = fixture.engine.verify_missing_embedded_signatures().await.unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.skipped, 5);
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let fixture = TestFixture::new().await;
    let key = fixture.import_secret(&FakeKey::new("alice")).await;
    for n in 0..3 {
        let file = fixture.documents.add(format!("doc {}", n).as_bytes());
        fixture
            .engine
            .sign_detached(file.as_ref(), &key, None)
            .await
            .unwrap();
    }

    let first = fixture.engine.refresh_signature_information().await.unwrap();
    let second = fixture.engine.refresh_signature_information().await.unwrap();

    assert_eq!(first.processed, 3);
    assert_eq!(first.updated, 0);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_refresh_counts_missing_files_and_carries_on() {
    let fixture = TestFixture::new().await;
    let bob = FakeKey::new("bob");
    let kept = fixture.documents.add(b"kept");
    let lost = fixture.documents.add(b"lost");
    for file in [&kept, &lost] {
        let content = file.open().await.unwrap();
        fixture
            .engine
            .attach_detached(file.as_ref(), fixture.detached_by(&bob, &content))
            .await
            .unwrap();
    }
    fixture.import_public(&bob).await;
    assert!(fixture.documents.remove(lost.id()));

    let report = fixture.engine.refresh_signature_information().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 1);
    let records = fixture.engine.signature_records(kept.id()).await.unwrap();
    assert!(records[0].is_verified());
}

#[tokio::test]
async fn test_key_sweeps_only_touch_matching_records() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let bob = FakeKey::new("bob");
    let file = fixture.documents.add(b"shared");
    for signer in [&alice, &bob] {
        fixture
            .engine
            .attach_detached(file.as_ref(), fixture.detached_by(signer, b"shared"))
            .await
            .unwrap();
    }

    let alice_key = fixture.import_public(&alice).await;
    let report = fixture
        .engine
        .verify_key_signatures(alice.fingerprint())
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.updated, 1);

    let records = fixture.engine.signature_records(file.id()).await.unwrap();
    let verified: Vec<_> = records.iter().filter(|r| r.is_verified()).collect();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].details.key_id, alice.key_id());

    // Nothing verified for bob, so there is nothing to unverify.
    let report = fixture
        .engine
        .unverify_key_signatures(bob.fingerprint())
        .await
        .unwrap();
    assert_eq!(report.processed, 0);

    fixture.keys.delete(&alice_key).await.unwrap();
    let report = fixture
        .engine
        .unverify_key_signatures(alice.key_id())
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    let records = fixture.engine.signature_records(file.id()).await.unwrap();
    assert!(records.iter().all(|r| !r.is_verified()));
}
