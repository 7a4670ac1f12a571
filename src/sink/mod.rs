//! Two-stage persistence for new job records.
//!
//! Stage one appends to the local CSV log and must succeed. Stage two mirrors
//! the same rows to a remote spreadsheet on a best-effort basis: its failures
//! are reported in the outcome but never undo the local append.

mod csv_log;
pub mod mirror;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::core::JobRecord;
use crate::error::SinkError;

pub use csv_log::{CsvLog, LogSummary};
pub use mirror::{RemoteMirror, create_mirror};

/// What happened to a batch handed to [`Sink::save`].
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// There was nothing to save; no file was touched.
    Nothing,
    /// Rows are in the local log; see `mirror` for the remote copy.
    Persisted { written: usize, mirror: MirrorOutcome },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOutcome {
    Mirrored { batches: usize },
    Disabled,
    /// Some batches may have been sent before the failure.
    Failed { batches_sent: usize, error: String },
}

impl SaveOutcome {
    pub fn written(&self) -> usize {
        match self {
            SaveOutcome::Nothing => 0,
            SaveOutcome::Persisted { written, .. } => *written,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        matches!(
            self,
            SaveOutcome::Persisted {
                mirror: MirrorOutcome::Mirrored { .. },
                ..
            }
        )
    }
}

pub struct Sink {
    log: CsvLog,
    mirror: Option<Arc<dyn RemoteMirror>>,
    batch_size: usize,
    pacing: Duration,
}

impl Sink {
    pub fn new(
        log: CsvLog,
        mirror: Option<Arc<dyn RemoteMirror>>,
        batch_size: usize,
        pacing: Duration,
    ) -> Self {
        Self {
            log,
            mirror,
            batch_size: batch_size.max(1),
            pacing,
        }
    }

    pub fn log(&self) -> &CsvLog {
        &self.log
    }

    /// Append `records` to the log, then mirror them. A failed append is
    /// returned as an error and nothing is mirrored.
    pub async fn save(&self, records: Vec<JobRecord>) -> Result<SaveOutcome, SinkError> {
        if records.is_empty() {
            return Ok(SaveOutcome::Nothing);
        }

        let rows: Vec<_> = records.iter().map(JobRecord::to_row).collect();

        let written = match self.log.append(records).await {
            Ok(written) => written,
            Err(e) => {
                error!(path = %self.log.path().display(), error = %e, "Failed to append to job log");
                return Err(e);
            }
        };
        info!(written, path = %self.log.path().display(), "Saved new print jobs");

        let mirror = match &self.mirror {
            Some(mirror) => self.mirror_rows(mirror.as_ref(), rows).await,
            None => MirrorOutcome::Disabled,
        };

        Ok(SaveOutcome::Persisted { written, mirror })
    }

    async fn mirror_rows(
        &self,
        mirror: &dyn RemoteMirror,
        rows: Vec<Vec<serde_json::Value>>,
    ) -> MirrorOutcome {
        let batches: Vec<_> = rows.chunks(self.batch_size).map(<[_]>::to_vec).collect();
        let total = batches.len();

        for (sent, batch) in batches.into_iter().enumerate() {
            if sent > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            if let Err(e) = mirror.append_rows(batch).await {
                error!(batches_sent = sent, total, error = %e, "Failed to mirror print jobs");
                return MirrorOutcome::Failed {
                    batches_sent: sent,
                    error: e.to_string(),
                };
            }
        }

        info!(batches = total, "Mirrored print jobs");
        MirrorOutcome::Mirrored { batches: total }
    }
}
