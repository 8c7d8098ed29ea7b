//! Exportable classification records.
//!
//! Each classification becomes one JSON record; a run's records are exported
//! together when the controller exits.

use crate::core::classifier::ClassificationResult;
use crate::core::transmitter::TransmitSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of this producer.
pub const PRODUCER_NAME: &str = "dvs-gcn-host";

/// One classified sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub id: Uuid,
    /// Software that produced the record
    pub producer: String,
    /// Run this record belongs to
    pub run_id: Uuid,
    /// When classification completed (RFC3339)
    pub classified_at: DateTime<Utc>,
    /// Event resource that was replayed
    pub resource: String,
    pub true_class: u8,
    pub predicted_class: u8,
    pub correct: bool,
    /// Raw scores, index 0 first
    pub scores: Vec<i32>,
    pub elapsed_ms: u64,
    pub events_sent: usize,
    pub stopped_early: bool,
}

/// Builds records that share one run identifier.
pub struct RecordBuilder {
    run_id: Uuid,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn build(
        &self,
        resource: &str,
        result: &ClassificationResult,
        transmit: &TransmitSummary,
    ) -> ClassificationRecord {
        ClassificationRecord {
            id: Uuid::new_v4(),
            producer: format!("{PRODUCER_NAME}/{}", crate::VERSION),
            run_id: self.run_id,
            classified_at: Utc::now(),
            resource: resource.to_string(),
            true_class: result.true_class,
            predicted_class: result.predicted_class,
            correct: result.is_correct(),
            scores: result.scores.to_vec(),
            elapsed_ms: result.elapsed.as_millis() as u64,
            events_sent: transmit.sent,
            stopped_early: transmit.stopped_early,
        }
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `records` as pretty JSON to `run_<timestamp>.json` under `dir`.
pub fn export_records(
    dir: &Path,
    records: &[ClassificationRecord],
) -> Result<PathBuf, std::io::Error> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join(format!("run_{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
    let json = serde_json::to_string_pretty(records).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;

    Ok(path)
}
