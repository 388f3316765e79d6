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

//! `keys` commands.

use super::context::Context;
use anyhow::{Context as _, Result};
use std::path::Path;

pub async fn import(context: &Context, path: &Path) -> Result<()> {
    let key_data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let key = context.keys.import_key(&key_data).await?;
    println!("Imported {} key {}", key.key_type, key);
    Ok(())
}

pub async fn receive(context: &Context, key_id: &str) -> Result<()> {
    let key = context.keys.receive_key(key_id).await?;
    println!("Received key {}", key);
    Ok(())
}

pub async fn search(context: &Context, query: &str) -> Result<()> {
    let stubs = context.keys.search(query).await?;
    if stubs.is_empty() {
        println!("No keys found for '{}'", query);
    }
    for stub in stubs {
        let created = stub
            .creation_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        println!("{}  {}  {}", stub.key_id(), created, stub.user_id());
    }
    Ok(())
}

pub async fn list(context: &Context, secret: bool, public: bool) -> Result<()> {
    let keys = if secret {
        context.keys.private_keys().await?
    } else if public {
        context.keys.public_keys().await?
    } else {
        context.keys.all().await?
    };
    println!("{}", serde_json::to_string_pretty(&keys)?);
    Ok(())
}

pub async fn delete(context: &Context, key: &str) -> Result<()> {
    let key = context.key(key).await?;
    context.keys.delete(&key).await?;
    println!("Deleted key {}", key);
    Ok(())
}
