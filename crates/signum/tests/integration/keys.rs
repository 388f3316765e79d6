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

//! Key repository behaviour.

use crate::fixtures::TestFixture;
use signum::crypto::BackendError;
use signum::prelude::*;
use signum_testing::FakeKey;

#[tokio::test]
async fn test_import_stores_metadata_from_the_key() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");

    let key = fixture.import_secret(&alice).await;

    assert_eq!(key.fingerprint, alice.fingerprint());
    assert_eq!(key.key_id, alice.key_id());
    assert_eq!(key.key_type, KeyType::Secret);
    assert_eq!(key.user_id, alice.uid());
    assert!(key.key_data.contains(alice.fingerprint()));
    assert!(fixture.keys.contains(alice.fingerprint()).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_import_is_rejected() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    fixture.import_public(&alice).await;

    let second = fixture.keys.import_key(alice.secret_block().as_bytes()).await;

    assert!(matches!(second, Err(KeyError::KeyAlreadyExists(fpr)) if fpr == alice.fingerprint()));
    assert_eq!(fixture.keys.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_garbage_key_data_is_rejected() {
    let fixture = TestFixture::new().await;

    let result = fixture.keys.import_key(b"this is not a key").await;
    assert!(matches!(result, Err(KeyError::InvalidKeyData)));

    let result = fixture.keys.import_key(&[0xff, 0xfe, 0x00]).await;
    assert!(matches!(result, Err(KeyError::InvalidKeyData)));

    assert!(fixture.keys.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backend_import_failure_is_a_key_import_error() {
    let fixture = TestFixture::new().await;
    fixture
        .backend
        .inject_failure(BackendError::KeyImport("unsupported packet".to_string()));

    let result = fixture
        .keys
        .import_key(FakeKey::new("alice").public_block().as_bytes())
        .await;

    assert!(matches!(result, Err(KeyError::KeyImport(msg)) if msg == "unsupported packet"));
    assert!(fixture.keys.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_short_key_ids_follow_configuration() {
    let config = SignumConfig::builder()
        .key_id_length(KeyIdLength::Short)
        .build();
    let fixture = TestFixture::with_config(config).await;
    let alice = FakeKey::new("alice");

    let key = fixture.import_public(&alice).await;

    assert_eq!(key.key_id.len(), 8);
    assert!(alice.fingerprint().ends_with(&key.key_id));
    let found = fixture.keys.get_by_key_id(&key.key_id).await.unwrap();
    assert_eq!(found.fingerprint, key.fingerprint);
}

#[tokio::test]
async fn test_listing_separates_public_and_secret_keys() {
    let fixture = TestFixture::new().await;
    fixture.import_secret(&FakeKey::new("alice")).await;
    fixture.import_public(&FakeKey::new("bob")).await;
    fixture.import_public(&FakeKey::new("carol")).await;

    assert_eq!(fixture.keys.private_keys().await.unwrap().len(), 1);
    assert_eq!(fixture.keys.public_keys().await.unwrap().len(), 2);
    assert_eq!(fixture.keys.all().await.unwrap().len(), 3);
    assert_eq!(fixture.keys.known_key_data().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_delete_removes_the_key_once() {
    let fixture = TestFixture::new().await;
    let alice = FakeKey::new("alice");
    let key = fixture.import_secret(&alice).await;

    fixture.keys.delete(&key).await.unwrap();

    assert!(!fixture.keys.contains(alice.fingerprint()).await.unwrap());
    assert!(matches!(
        fixture.keys.get(alice.fingerprint()).await,
        Err(KeyError::KeyDoesNotExist(_))
    ));
    assert!(matches!(
        fixture.keys.delete(&key).await,
        Err(KeyError::KeyDoesNotExist(_))
    ));
}

#[tokio::test]
async fn test_receive_falls_through_to_the_next_keyserver() {
    let config = SignumConfig::builder()
        .keyservers(vec![
            "hkps://down.example".to_string(),
            "hkps://up.example".to_string(),
        ])
        .build();
    let fixture = TestFixture::with_config(config).await;
    let alice = FakeKey::new("alice");
    fixture.backend.publish(&alice);
    fixture.backend.set_unreachable("hkps://down.example");

    let key = fixture.keys.receive_key(alice.key_id()).await.unwrap();

    assert_eq!(key.fingerprint, alice.fingerprint());
    assert_eq!(key.key_type, KeyType::Public);
}

#[tokio::test]
async fn test_receive_fails_when_no_keyserver_has_the_key() {
    let config = SignumConfig::builder()
        .keyservers(vec![
            "hkps://down.example".to_string(),
            "hkps://empty.example".to_string(),
        ])
        .build();
    let fixture = TestFixture::with_config(config).await;
    fixture.backend.set_unreachable("hkps://down.example");

    let result = fixture.keys.receive_key("0123456789ABCDEF").await;

    assert!(matches!(result, Err(KeyError::KeyFetching(_))));
    assert!(fixture.keys.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_returns_stubs_without_storing() {
    let fixture = TestFixture::new().await;
    fixture.backend.publish(&FakeKey::new("alice"));
    fixture.backend.publish(&FakeKey::new("bob"));

    let stubs = fixture.keys.search("ALICE").await.unwrap();

    assert_eq!(stubs.len(), 1);
    assert_eq!(stubs[0].user_id(), "alice <alice@example.com>");
    assert!(fixture.keys.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_with_no_reachable_keyserver_fails() {
    let fixture = TestFixture::new().await;
    fixture.backend.set_unreachable("hkps://keys.openpgp.org");

    let result = fixture.keys.search("alice").await;

    assert!(matches!(result, Err(KeyError::KeyFetching(_))));
}
