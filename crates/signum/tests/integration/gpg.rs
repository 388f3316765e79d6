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

//! End-to-end checks against a real `gpg`.
//!
//! Each test returns early when `gpg` is not installed.

use signum::prelude::*;
use signum_testing::InMemoryDocumentSource;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn gpg_available() -> bool {
    Command::new("gpg")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Generates an ed25519 signing key and returns the armored secret key.
fn generate_key(uid: &str, passphrase: &str) -> String {
    let home = TempDir::new().expect("temp dir");
    let gpg = |args: &[&str]| {
        let output = Command::new("gpg")
            .arg("--homedir")
            .arg(home.path())
            .args(["--batch", "--pinentry-mode", "loopback", "--passphrase", passphrase])
            .args(args)
            .output()
            .expect("gpg runs");
        assert!(
            output.status.success(),
            "gpg {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        output.stdout
    };

    gpg(&["--quick-gen-key", uid, "ed25519", "sign", "never"]);
    let secret = gpg(&["--armor", "--export-secret-keys"]);
    let _ = Command::new("gpgconf")
        .arg("--homedir")
        .arg(home.path())
        .args(["--kill", "all"])
        .output();
    String::from_utf8(secret).expect("armored output")
}

struct GpgFixture {
    documents: InMemoryDocumentSource,
    keys: KeyRepository,
    engine: SignatureEngine,
}

async fn fixture() -> GpgFixture {
    signum_testing::init_test_logging();
    let config = SignumConfig::default();
    let database = Database::new(":memory:", "", 1).expect("in-memory database");
    database.run_migrations().await.expect("migrations");
    let dal = DAL::new(database);

    let backend: Arc<dyn CryptoBackend> = Arc::new(GpgBackend::new(&config));
    let documents = InMemoryDocumentSource::new();
    let keys = KeyRepository::new(dal.clone(), backend.clone(), config.clone());
    let engine = SignatureEngine::new(
        dal,
        backend,
        keys.clone(),
        Arc::new(documents.clone()),
        config,
    );
    GpgFixture {
        documents,
        keys,
        engine,
    }
}

#[tokio::test]
async fn test_gpg_detached_and_embedded_signatures() {
    if !gpg_available() {
        eprintln!("gpg not installed, skipping");
        return;
    }
    let fixture = fixture().await;
    let armored = generate_key("Signum Test <signum@example.com>", "");

    let key = fixture.keys.import_key(armored.as_bytes()).await.unwrap();
    assert_eq!(key.key_type, KeyType::Secret);
    assert_eq!(key.fingerprint.len(), 40);
    assert_eq!(key.user_id, "Signum Test <signum@example.com>");

    let file = fixture.documents.add(b"signed by gpg\n");
    let detached = fixture
        .engine
        .sign_detached(file.as_ref(), &key, None)
        .await
        .unwrap();
    assert_eq!(
        detached.details.public_key_fingerprint.as_deref(),
        Some(key.fingerprint.as_str())
    );
    assert!(detached.details.signature_id.is_some());

    let embedded = fixture
        .engine
        .sign_embedded(file.as_ref(), &key, None)
        .await
        .unwrap();
    let revision = fixture
        .engine
        .documents()
        .get(embedded.document_file_id)
        .await
        .unwrap();
    assert_eq!(
        fixture.engine.open_plaintext(revision.as_ref()).await.unwrap(),
        b"signed by gpg\n"
    );

    let result = fixture.engine.verify(revision.as_ref(), None).await.unwrap();
    assert!(result.is_valid());
    assert_eq!(result.signature_id, embedded.details.signature_id);
}

#[tokio::test]
async fn test_gpg_unsigned_content_does_not_verify() {
    if !gpg_available() {
        eprintln!("gpg not installed, skipping");
        return;
    }
    let fixture = fixture().await;
    let file = fixture.documents.add(b"nothing to see here");

    let result = fixture.engine.verify(file.as_ref(), None).await;

    assert!(matches!(result, Err(SignatureError::Verification(_))));
}

#[tokio::test]
async fn test_gpg_armored_block_without_keys_is_invalid_key_data() {
    if !gpg_available() {
        eprintln!("gpg not installed, skipping");
        return;
    }
    let fixture = fixture().await;
    let empty_block = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n=twTO\n-----END PGP PUBLIC KEY BLOCK-----\n";

    let result = fixture.keys.import_key(empty_block.as_bytes()).await;

    assert!(matches!(result, Err(KeyError::InvalidKeyData)));
    assert!(fixture.keys.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gpg_passphrase_errors() {
    if !gpg_available() {
        eprintln!("gpg not installed, skipping");
        return;
    }
    let fixture = fixture().await;
    let armored = generate_key("Protected <protected@example.com>", "open sesame");
    let key = fixture.keys.import_key(armored.as_bytes()).await.unwrap();
    let file = fixture.documents.add(b"locked");

    let missing = fixture.engine.sign_detached(file.as_ref(), &key, None).await;
    assert!(matches!(missing, Err(SignatureError::NeedPassphrase)), "{:?}", missing);

    let wrong = fixture
        .engine
        .sign_detached(file.as_ref(), &key, Some("open barley"))
        .await;
    assert!(matches!(wrong, Err(SignatureError::Passphrase)), "{:?}", wrong);

    let right = fixture
        .engine
        .sign_detached(file.as_ref(), &key, Some("open sesame"))
        .await;
    assert!(right.is_ok(), "{:?}", right);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gpg_concurrent_signing_uses_separate_keyrings() {
    if !gpg_available() {
        eprintln!("gpg not installed, skipping");
        return;
    }
    let fixture = fixture().await;
    let first_key = fixture
        .keys
        .import_key(generate_key("First <first@example.com>", "").as_bytes())
        .await
        .unwrap();
    let second_key = fixture
        .keys
        .import_key(generate_key("Second <second@example.com>", "").as_bytes())
        .await
        .unwrap();
    let first = fixture.documents.add(b"first document");
    let second = fixture.documents.add(b"second document");

    let (a, b) = tokio::join!(
        fixture.engine.sign_detached(first.as_ref(), &first_key, None),
        fixture.engine.sign_detached(second.as_ref(), &second_key, None),
    );

    assert_eq!(
        a.unwrap().details.public_key_fingerprint,
        Some(first_key.fingerprint.clone())
    );
    assert_eq!(
        b.unwrap().details.public_key_fingerprint,
        Some(second_key.fingerprint.clone())
    );
}
