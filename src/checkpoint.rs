// ABOUTME: Watermark of the last delivered attendance log timestamp
// ABOUTME: Drives the incremental query and can be persisted to a JSON state file

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// The single mutable watermark.
///
/// `last_delivered` only moves forward, and only to the timestamp of the last
/// row of a batch the API accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    last_delivered: Option<NaiveDateTime>,
    first_run_done: bool,
}

/// On-disk form of the checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    last_delivered: Option<NaiveDateTime>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// A checkpoint resumed from an earlier run. The first-run gate is already
    /// closed so the broad backlog query is not repeated.
    pub fn resumed(last_delivered: NaiveDateTime) -> Self {
        Self {
            last_delivered: Some(last_delivered),
            first_run_done: true,
        }
    }

    pub fn last_delivered(&self) -> Option<NaiveDateTime> {
        self.last_delivered
    }

    pub fn first_run_done(&self) -> bool {
        self.first_run_done
    }

    /// Lower timestamp bound for the next query.
    ///
    /// The very first call returns `None` whatever the watermark and closes
    /// the first-run gate, whether or not the fetch that follows succeeds.
    /// Later calls return the watermark, which is still `None` until a batch
    /// has been delivered.
    pub fn take_lower_bound(&mut self) -> Option<NaiveDateTime> {
        if !self.first_run_done {
            self.first_run_done = true;
            return None;
        }
        self.last_delivered
    }

    /// Move the watermark to `delivered` unless it is already at or past it.
    /// Returns whether the watermark moved.
    pub fn advance(&mut self, delivered: NaiveDateTime) -> bool {
        match self.last_delivered {
            Some(current) if current >= delivered => false,
            _ => {
                self.last_delivered = Some(delivered);
                true
            }
        }
    }

    /// Load a checkpoint from a JSON state file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read checkpoint from {:?}", path))?;
        let file: CheckpointFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse checkpoint from {:?}", path))?;
        Ok(match file.last_delivered {
            Some(ts) => Self::resumed(ts),
            None => Self::new(),
        })
    }

    /// Load from `path` when it exists, otherwise start fresh.
    pub async fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        match Self::load(path).await {
            Ok(checkpoint) => {
                tracing::info!(
                    "Resuming from checkpoint {:?} stored in {:?}",
                    checkpoint.last_delivered,
                    path
                );
                checkpoint
            }
            Err(e) => {
                tracing::warn!("{:#}. Starting with an empty checkpoint.", e);
                Self::new()
            }
        }
    }

    /// Save the watermark to a JSON state file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let file = CheckpointFile {
            version: 1,
            last_delivered: self.last_delivered,
            updated_at: chrono::Utc::now(),
        };
        let contents =
            serde_json::to_string_pretty(&file).context("Failed to serialize checkpoint")?;
        fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write checkpoint to {:?}", path))?;
        Ok(())
    }
}
