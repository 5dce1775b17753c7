// ABOUTME: Posts mapped attendance batches to the API
// ABOUTME: Reports the outcome and tells the caller how far the checkpoint may move

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::api::ApiClient;
use crate::audit::AuditSink;
use crate::error::SyncError;
use crate::mapper::map_batch;
use crate::source::RawEvent;

/// Result of a [`Uploader::send`] call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty batch, nothing was sent.
    Skipped,
    /// The API accepted the batch; the checkpoint may advance to `advance_to`.
    Delivered {
        records_updated: Option<u64>,
        advance_to: NaiveDateTime,
    },
}

pub struct Uploader {
    base_address: String,
    audit: Arc<dyn AuditSink>,
}

impl Uploader {
    pub fn new(base_address: impl Into<String>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            base_address: base_address.into(),
            audit,
        }
    }

    /// Map `batch` and post it in one request, authenticated with `token`.
    ///
    /// `batch` must be in ascending source-id order; on acceptance the last
    /// row's timestamp is returned as the new watermark.
    pub async fn send(&self, batch: &[RawEvent], token: &str) -> Result<SendOutcome, SyncError> {
        let Some(last) = batch.last() else {
            self.audit.info("Attendance batch is empty, nothing sent to api.");
            return Ok(SendOutcome::Skipped);
        };

        let records = map_batch(batch);
        let response = match ApiClient::new(&self.base_address) {
            Ok(api) => api
                .post_attendances(token, &records)
                .await
                .map_err(|e| SyncError::Upload(format!("{:#}", e))),
            Err(e) => Err(e),
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.audit.error(&format!("Error occurs while sending attendance logs: {}", e));
                return Err(e);
            }
        };

        if !response.success {
            let message = response.error_message();
            self.audit.error(&message);
            return Err(SyncError::Rejected {
                operation: "upload",
                message,
            });
        }

        let records_updated = response.records_updated_count();
        self.audit.info(&format!(
            "Data sent successfully on {}. records_updated: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            response.records_updated.as_deref().unwrap_or("unknown")
        ));

        Ok(SendOutcome::Delivered {
            records_updated,
            advance_to: last.log_timestamp,
        })
    }
}
