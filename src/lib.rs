//! DVS GCN Host - event replay and classification for an event-based GCN accelerator.
//!
//! This library drives one classification per recorded sample: it replays the
//! sample's address-events to the accelerator at their recorded timing, collects
//! the 4096-feature result vector the accelerator delivers in four chunks, and
//! classifies it with a linear layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          DVS GCN Host                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────────┐       │
//! │  │   Storage   │──▶│   Parser    │──▶│ Event Transmitter │──▶ HW │
//! │  │ (mw, mCS)   │   │ (rows)      │   │ (paced packets)   │       │
//! │  └─────────────┘   └─────────────┘   └───────────────────┘       │
//! │                                                                   │
//! │  HW ──▶ ┌─────────────┐  queue  ┌─────────────┐   ┌────────────┐ │
//! │ (irq)   │ Completion  │────────▶│ Accumulator │──▶│ Classifier │ │
//! │         │  Handler    │         │  (thread)   │   │  (argmax)  │ │
//! │         └─────────────┘         └─────────────┘   └────────────┘ │
//! │                                         │                         │
//! │                                         ▼                         │
//! │                                 ┌──────────────┐                  │
//! │                                 │   Session    │                  │
//! │                                 │  Controller  │                  │
//! │                                 └──────────────┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dvs_gcn_host::{create_shared_stats, session, Config, SampleSelector, SimConfig};
//!
//! let config = Config::default();
//! let (mut controller, _accelerator) =
//!     session::simulated_controller(config, SimConfig::default(), create_shared_stats())
//!         .expect("accelerator already running");
//!
//! let selector = SampleSelector::new(3, 0).expect("digits");
//! let outcome = controller.run_sample(selector).expect("classification");
//! println!("predicted {}", outcome.result.predicted_class);
//! ```

pub mod channel;
pub mod config;
pub mod core;
pub mod error;
pub mod session;
pub mod stats;
pub mod storage;

// Re-export key types at crate root for convenience
pub use channel::{
    CompletionHandler, Event, EventChannel, EventPacket, RawChunk, ResultChannel, SimConfig,
    SimulatedAccelerator,
};
pub use config::{Config, ConfigError};
pub use self::core::{
    classify, AccumulatorWorker, ClassificationRecord, ClassificationResult, EventTransmitter,
    FeatureVector, ResultAccumulator, WeightMatrix,
};
pub use error::{ChannelError, ParseError, SessionError, StorageError};
pub use session::{SampleSelector, SessionController, SessionOutcome};
pub use stats::{create_shared_stats, RunStats, SharedRunStats, StatsSnapshot};
pub use storage::{DirStorage, Storage};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_present() {
        assert!(!VERSION.is_empty());
        assert!(crate::core::PRODUCER_NAME.starts_with("dvs"));
    }
}
