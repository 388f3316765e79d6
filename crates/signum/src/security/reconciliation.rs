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

//! Batch reconciliation sweeps.
//!
//! Sweeps bring stored signature records back in line with the key
//! repository. They are idempotent and can be stopped between items; a
//! failing item is counted and logged, and the sweep moves on.

use super::audit;
use super::signature_engine::{SignatureEngine, SignatureError};
use crate::models::SignatureRecord;
use serde::Serialize;
use tracing::warn;

/// Per-sweep counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Items looked at
    pub processed: usize,
    /// Records created
    pub created: usize,
    /// Records whose derived fields changed
    pub updated: usize,
    /// Items needing no change
    pub skipped: usize,
    /// Items that raised an error
    pub failed: usize,
}

impl SignatureEngine {
    /// Creates embedded records for every signed revision that has none.
    ///
    /// Unsigned revisions yield no record.
    pub async fn verify_missing_embedded_signatures(&self) -> Result<BatchReport, SignatureError> {
        let file_ids = self.documents().file_ids().await?;
        let recorded = self.dal.signature_records().files_with_embedded().await?;

        let mut report = BatchReport::default();
        for file_id in file_ids {
            report.processed += 1;
            if recorded.contains(&file_id) {
                report.skipped += 1;
                continue;
            }
            match self.verify_document_file(file_id).await {
                Ok(Some(_)) => report.created += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!("Checking document file {} for a signature failed: {}", file_id, e);
                    report.failed += 1;
                }
            }
        }

        audit::log_batch_completed("verify_missing_embedded_signatures", &report);
        Ok(report)
    }

    /// Re-runs the verification side-effect for every record.
    pub async fn refresh_signature_information(&self) -> Result<BatchReport, SignatureError> {
        let records = self.dal.signature_records().list_all().await?;
        let report = self.refresh_records(&records).await;
        audit::log_batch_completed("refresh_signature_information", &report);
        Ok(report)
    }

    /// Refreshes unverified records whose signer has `key_id`.
    ///
    /// Run after a key is imported.
    pub async fn verify_key_signatures(&self, key_id: &str) -> Result<BatchReport, SignatureError> {
        let records = self
            .dal
            .signature_records()
            .list_by_key_id(key_id, false)
            .await?;
        let report = self.refresh_records(&records).await;
        audit::log_batch_completed("verify_key_signatures", &report);
        Ok(report)
    }

    /// Refreshes verified records whose signer has `key_id`.
    ///
    /// Run after a key is deleted.
    pub async fn unverify_key_signatures(&self, key_id: &str) -> Result<BatchReport, SignatureError> {
        let records = self
            .dal
            .signature_records()
            .list_by_key_id(key_id, true)
            .await?;
        let report = self.refresh_records(&records).await;
        audit::log_batch_completed("unverify_key_signatures", &report);
        Ok(report)
    }

    async fn refresh_records(&self, records: &[SignatureRecord]) -> BatchReport {
        let mut report = BatchReport::default();
        for record in records {
            report.processed += 1;
            match self.refresh_record(record).await {
                Ok(true) => report.updated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!("Refreshing signature record {} failed: {}", record.id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}
