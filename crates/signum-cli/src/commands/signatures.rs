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

//! Signing, verification and reconciliation commands.

use super::context::Context;
use anyhow::{Context as _, Result};
use signum::prelude::*;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub async fn sign(
    context: &Context,
    file_id: UniversalUuid,
    key: &str,
    embedded: bool,
    passphrase: Option<&str>,
) -> Result<()> {
    let key = context.key(key).await?;
    let file = context.engine.documents().get(file_id).await?;
    let record = if embedded {
        context.engine.sign_embedded(file.as_ref(), &key, passphrase).await?
    } else {
        context.engine.sign_detached(file.as_ref(), &key, passphrase).await?
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn attach(context: &Context, file_id: UniversalUuid, signature: &Path) -> Result<()> {
    let blob = tokio::fs::read(signature)
        .await
        .with_context(|| format!("Failed to read {}", signature.display()))?;
    let file = context.engine.documents().get(file_id).await?;
    let record = context.engine.attach_detached(file.as_ref(), blob).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn verify(
    context: &Context,
    file_id: UniversalUuid,
    signature: Option<&str>,
) -> Result<()> {
    let file = context.engine.documents().get(file_id).await?;
    let blob = match signature {
        None => None,
        Some(value) => match value.parse::<UniversalUuid>() {
            Ok(id) => Some(context.engine.detached_signature_blob(id).await?),
            Err(_) => Some(
                tokio::fs::read(value)
                    .await
                    .with_context(|| format!("Failed to read {}", value))?,
            ),
        },
    };

    let result = context.engine.verify(file.as_ref(), blob.as_deref()).await?;
    println!("status:      {:?}", result.status);
    println!("key id:      {}", result.key_id);
    if let Some(date_time) = result.date_time {
        println!("signed at:   {}", date_time.to_rfc3339());
    }
    if let Some(username) = &result.username {
        println!("signer:      {}", username);
    }
    if let Some(fingerprint) = &result.pubkey_fingerprint {
        println!("fingerprint: {}", fingerprint);
    }
    Ok(())
}

pub async fn open(context: &Context, file_id: UniversalUuid, output: Option<&Path>) -> Result<()> {
    let file = context.engine.documents().get(file_id).await?;
    let content = context.engine.open_plaintext(file.as_ref()).await?;
    match output {
        Some(path) => tokio::fs::write(path, &content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&content).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

pub async fn list(context: &Context, file_id: UniversalUuid) -> Result<()> {
    let records = context.engine.signature_records(file_id).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub async fn delete(context: &Context, id: UniversalUuid) -> Result<()> {
    context.engine.delete_detached(id).await?;
    println!("Deleted signature {}", id);
    Ok(())
}

pub async fn refresh(context: &Context) -> Result<()> {
    let report = context.engine.refresh_signature_information().await?;
    info!("Refresh finished");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn verify_missing(context: &Context) -> Result<()> {
    let report = context.engine.verify_missing_embedded_signatures().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
