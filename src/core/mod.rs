//! Core pipeline for the classification host.
//!
//! This module contains:
//! - Parsing of event and weight files
//! - Timed event replay to the accelerator
//! - Accumulation of result chunks into a feature vector
//! - Linear classification and exportable records

pub mod accumulator;
pub mod classifier;
pub mod parser;
pub mod preview;
pub mod report;
pub mod transmitter;

// Re-export commonly used types
pub use accumulator::{
    AccumulatorMsg, AccumulatorWorker, FeatureVector, ResultAccumulator, SessionStart,
};
pub use classifier::{classify, ClassificationResult, Scores, WeightMatrix};
pub use parser::{parse_events, parse_weights};
pub use report::{export_records, ClassificationRecord, RecordBuilder, PRODUCER_NAME};
pub use transmitter::{EventTransmitter, Pacer, ThreadPacer, TransmitSummary, DEFAULT_TIME_BUDGET};
