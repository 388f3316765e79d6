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

//! Signum CLI - command-line interface for the Signum signature subsystem.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod commands;

use commands::context::Context;

/// Signum - sign and verify documents with OpenPGP keys
#[derive(Parser)]
#[command(name = "signum")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (can also be set via SIGNUM_DATABASE_URL environment variable)
    #[arg(long, env = "SIGNUM_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Configuration file (defaults to SIGNUM_CONFIG or the standard search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding document file revisions
    #[arg(long, env = "SIGNUM_DOCUMENTS", default_value = "documents", global = true)]
    documents: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the key repository
    Keys {
        #[command(subcommand)]
        command: KeysCommands,
    },
    /// Manage document files
    Documents {
        #[command(subcommand)]
        command: DocumentsCommands,
    },
    /// Sign a document file with a secret key from the repository
    Sign {
        file_id: Uuid,

        /// Fingerprint or key id of the signing key
        #[arg(long)]
        key: String,

        /// Wrap the file in a signed container stored as a new revision
        #[arg(long)]
        embedded: bool,

        /// Passphrase of the signing key
        #[arg(long, env = "SIGNUM_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
    /// Attach an existing detached signature to a document file
    Attach { file_id: Uuid, signature: PathBuf },
    /// Verify a document file's embedded signature, or a detached one
    Verify {
        file_id: Uuid,

        /// Detached signature file; the stored signature record id is also accepted
        #[arg(long)]
        signature: Option<String>,
    },
    /// Write the readable content of a document file
    Open {
        file_id: Uuid,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List the signature records of a document file
    Signatures { file_id: Uuid },
    /// Delete a detached signature record
    DeleteSignature { id: Uuid },
    /// Re-verify every stored signature record
    Refresh,
    /// Create records for signed document files that have none
    VerifyMissing,
}

#[derive(Subcommand)]
enum KeysCommands {
    /// Import an ASCII-armored key file
    Import { path: PathBuf },
    /// Fetch a key from the configured keyservers and import it
    Receive { key_id: String },
    /// Search the configured keyservers
    Search { query: String },
    /// List stored keys
    List {
        /// Only keys with secret material
        #[arg(long, conflicts_with = "public")]
        secret: bool,

        /// Only public keys
        #[arg(long)]
        public: bool,
    },
    /// Delete a key by fingerprint or key id
    Delete { key: String },
}

#[derive(Subcommand)]
enum DocumentsCommands {
    /// Store a file as a new document file and print its id
    Add { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let context = Context::build(
        cli.config.as_deref(),
        cli.database_url.as_deref(),
        &cli.documents,
    )
    .await?;

    let outcome = match cli.command {
        Commands::Keys { command } => match command {
            KeysCommands::Import { path } => commands::keys::import(&context, &path).await,
            KeysCommands::Receive { key_id } => commands::keys::receive(&context, &key_id).await,
            KeysCommands::Search { query } => commands::keys::search(&context, &query).await,
            KeysCommands::List { secret, public } => {
                commands::keys::list(&context, secret, public).await
            }
            KeysCommands::Delete { key } => commands::keys::delete(&context, &key).await,
        },
        Commands::Documents { command } => match command {
            DocumentsCommands::Add { path } => commands::documents::add(&context, &path).await,
        },
        Commands::Sign {
            file_id,
            key,
            embedded,
            passphrase,
        } => {
            commands::signatures::sign(&context, file_id.into(), &key, embedded, passphrase.as_deref())
                .await
        }
        Commands::Attach { file_id, signature } => {
            commands::signatures::attach(&context, file_id.into(), &signature).await
        }
        Commands::Verify { file_id, signature } => {
            commands::signatures::verify(&context, file_id.into(), signature.as_deref()).await
        }
        Commands::Open { file_id, output } => {
            commands::signatures::open(&context, file_id.into(), output.as_deref()).await
        }
        Commands::Signatures { file_id } => {
            commands::signatures::list(&context, file_id.into()).await
        }
        Commands::DeleteSignature { id } => {
            commands::signatures::delete(&context, id.into()).await
        }
        Commands::Refresh => commands::signatures::refresh(&context).await,
        Commands::VerifyMissing => commands::signatures::verify_missing(&context).await,
    };

    // Background work queued by key changes still runs before exit.
    context.finish().await;
    outcome
}
