//! Session controller: one classification per selected sample.
//!
//! For each selector pair the controller loads the sample and weights, arms
//! the accumulator, replays the events and then waits, up to the session
//! deadline, for the accumulator to publish the classification.

use crate::channel::irq::CompletionHandler;
use crate::channel::sim::{SimConfig, SimError, SimEventPort, SimulatedAccelerator};
use crate::channel::EventChannel;
use crate::config::Config;
use crate::core::accumulator::{AccumulatorMsg, AccumulatorWorker, SessionStart};
use crate::core::classifier::{ClassificationResult, WeightMatrix};
use crate::core::parser::{parse_events, parse_weights};
use crate::core::report::{ClassificationRecord, RecordBuilder};
use crate::core::transmitter::{EventTransmitter, Pacer, ThreadPacer, TransmitSummary};
use crate::error::{Result, SessionError};
use crate::stats::SharedRunStats;
use crate::storage::{event_resource_name, DirStorage, Storage};
use crossbeam_channel::RecvTimeoutError;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const SEPARATOR: &str = "--------------------------------------------------------------";

/// A validated (true class, sample) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSelector {
    pub true_class: u8,
    pub sample: u8,
}

impl SampleSelector {
    /// Both values must be in `0..=9`.
    pub fn new(true_class: u8, sample: u8) -> Option<Self> {
        (true_class <= 9 && sample <= 9).then_some(Self { true_class, sample })
    }

    /// Build from two typed characters. Anything but `'0'..='9'` is `None`.
    pub fn from_chars(class: char, sample: char) -> Option<Self> {
        let true_class = class.to_digit(10)?;
        let sample = sample.to_digit(10)?;
        Self::new(true_class as u8, sample as u8)
    }

    /// Name of the event resource for this selection.
    pub fn resource_name(&self) -> String {
        event_resource_name(self.true_class, self.sample)
    }
}

/// Everything produced by one successful cycle.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub resource: String,
    pub transmit: TransmitSummary,
    pub result: ClassificationResult,
}

/// Drives the parse, transmit, accumulate and classify pipeline.
pub struct SessionController<S: Storage, C: EventChannel, P: Pacer> {
    storage: S,
    transmitter: EventTransmitter<C, P>,
    worker: AccumulatorWorker,
    config: Config,
    stats: SharedRunStats,
    records: Vec<ClassificationRecord>,
    record_builder: RecordBuilder,
    next_session: u64,
}

impl<S: Storage, C: EventChannel, P: Pacer> SessionController<S, C, P> {
    pub fn new(
        storage: S,
        transmitter: EventTransmitter<C, P>,
        worker: AccumulatorWorker,
        config: Config,
        stats: SharedRunStats,
    ) -> Self {
        Self {
            storage,
            transmitter,
            worker,
            config,
            stats,
            records: Vec::new(),
            record_builder: RecordBuilder::new(),
            next_session: 0,
        }
    }

    /// Run one full classification cycle for `selector`.
    pub fn run_sample(&mut self, selector: SampleSelector) -> Result<SessionOutcome> {
        self.stats.record_sample_started();

        match self.run_pipeline(selector) {
            Ok(outcome) => {
                self.stats.record_classified(outcome.result.is_correct());
                self.records.push(self.record_builder.build(
                    &outcome.resource,
                    &outcome.result,
                    &outcome.transmit,
                ));
                Ok(outcome)
            }
            Err(e) => {
                match e {
                    SessionError::ProtocolStall { .. } => self.stats.record_stall(),
                    _ => self.stats.record_failure(),
                }
                Err(e)
            }
        }
    }

    fn run_pipeline(&mut self, selector: SampleSelector) -> Result<SessionOutcome> {
        let resource = selector.resource_name();
        info!(resource = %resource, true_class = selector.true_class, "starting sample");

        let buf = self.storage.read(&resource, self.config.max_event_bytes)?;
        let events = parse_events(&buf, self.config.event_capacity)?;
        debug!(events = events.len(), "events parsed");

        let weights = Arc::new(self.load_weights()?);

        // Results left over from an abandoned session
        while let Ok(stale) = self.worker.results().try_recv() {
            warn!(session = stale.session, "discarding stale result");
        }

        self.next_session += 1;
        let session = self.next_session;

        self.worker
            .sender()
            .send(AccumulatorMsg::Begin(SessionStart {
                session,
                true_class: selector.true_class,
                weights,
                started_at: Instant::now(),
            }))
            .map_err(|_| SessionError::AccumulatorDown)?;

        let sender = self.worker.sender();
        let mut marker_lost = false;
        let transmit = self.transmitter.transmit_with(&events, || {
            marker_lost = sender
                .send(AccumulatorMsg::StreamStarted { session })
                .is_err();
        })?;
        self.stats.record_events_transmitted(transmit.sent as u64);

        if marker_lost {
            return Err(SessionError::AccumulatorDown);
        }
        if transmit.sent == 0 {
            warn!(resource = %resource, "no events within the time budget");
            return Err(SessionError::NothingTransmitted {
                budget: self.transmitter.time_budget(),
            });
        }

        let result = self.await_result(session)?;

        Ok(SessionOutcome {
            resource,
            transmit,
            result,
        })
    }

    fn load_weights(&self) -> Result<WeightMatrix> {
        let buf = self
            .storage
            .read(&self.config.weights_file, self.config.max_weight_bytes)?;
        Ok(parse_weights(&buf)?)
    }

    fn await_result(&self, session: u64) -> Result<ClassificationResult> {
        let deadline = Instant::now() + self.config.session_deadline;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.worker.results().recv_timeout(remaining) {
                Ok(result) if result.session == session => return Ok(result),
                Ok(stale) => warn!(session = stale.session, "ignoring result of earlier session"),
                Err(RecvTimeoutError::Timeout) => {
                    let chunks_received = self.worker.chunks_received();
                    error!(session, chunks_received, "no complete feature vector before deadline");
                    return Err(SessionError::ProtocolStall {
                        chunks_received,
                        deadline: self.config.session_deadline,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err(SessionError::AccumulatorDown),
            }
        }
    }

    /// Prompt for selector pairs until an invalid one, end of input or `running` clears.
    pub fn run_interactive<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        out: &mut W,
        running: &AtomicBool,
    ) -> io::Result<()> {
        while running.load(Ordering::SeqCst) {
            writeln!(out, "{SEPARATOR}")?;
            write!(out, "Input digit (0-9), otherwise quit: ")?;
            out.flush()?;
            let class = read_selector_char(input)?;

            writeln!(out)?;
            writeln!(out, "{SEPARATOR}")?;
            write!(out, "Input file number (0-9): ")?;
            out.flush()?;
            let sample = read_selector_char(input)?;
            writeln!(out)?;

            let selector = match (class, sample) {
                (Some(c), Some(s)) => SampleSelector::from_chars(c, s),
                _ => None,
            };
            let Some(selector) = selector else {
                writeln!(out, "Exit!")?;
                break;
            };

            match self.run_sample(selector) {
                Ok(outcome) => write_report(out, &outcome.result)?,
                Err(e) => {
                    error!(error = %e, fatal = e.is_fatal(), "sample aborted");
                    writeln!(out, "Sample {} aborted: {e}", selector.resource_name())?;
                }
            }

            thread::sleep(self.config.settle_delay);
        }
        Ok(())
    }

    /// Records of every successful classification so far.
    pub fn records(&self) -> &[ClassificationRecord] {
        &self.records
    }

    pub fn take_records(&mut self) -> Vec<ClassificationRecord> {
        std::mem::take(&mut self.records)
    }
}

/// Write a classification report, scores from index 9 down to 0.
pub fn write_report<W: Write>(out: &mut W, result: &ClassificationResult) -> io::Result<()> {
    let scores: Vec<String> = result.reported_scores().map(|s| s.to_string()).collect();

    writeln!(out, "Elapsed time: {} ms", result.elapsed.as_millis())?;
    writeln!(out, "Output result: {}", scores.join(", "))?;
    writeln!(
        out,
        "True class: {}, predicted class: {}",
        result.true_class, result.predicted_class
    )
}

/// Next non-whitespace character, or `None` at end of input.
fn read_selector_char<R: BufRead>(input: &mut R) -> io::Result<Option<char>> {
    loop {
        let (found, used) = {
            let buf = input.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            match buf.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(pos) => (Some(buf[pos] as char), pos + 1),
                None => (None, buf.len()),
            }
        };
        input.consume(used);
        if found.is_some() {
            return Ok(found);
        }
    }
}

/// A controller wired to the software accelerator.
pub type SimulatedController = SessionController<DirStorage, SimEventPort, ThreadPacer>;

/// Assemble the full pipeline against a [`SimulatedAccelerator`].
///
/// The accelerator must be kept alive as long as the controller is used.
pub fn simulated_controller(
    config: Config,
    sim_config: SimConfig,
    stats: SharedRunStats,
) -> std::result::Result<(SimulatedController, SimulatedAccelerator), SimError> {
    let worker = AccumulatorWorker::start(config.chunk_queue_depth, stats.clone());
    let (mut sim, event_port, result_port) = SimulatedAccelerator::new(sim_config);

    let mut handler = CompletionHandler::new(result_port, worker.sender(), stats.clone());
    sim.start(move || {
        if let Err(e) = handler.on_completion() {
            error!(error = %e, "completion handler failed");
        }
    })?;

    let transmitter = EventTransmitter::new(event_port, ThreadPacer::new(config.time_unit))
        .with_time_budget(config.time_budget);
    let storage = DirStorage::new(config.data_dir.clone());

    let controller = SessionController::new(storage, transmitter, worker, config, stats);
    Ok((controller, sim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_selector_validation() {
        assert_eq!(
            SampleSelector::from_chars('3', '7'),
            Some(SampleSelector {
                true_class: 3,
                sample: 7
            })
        );
        assert_eq!(SampleSelector::from_chars('q', '1'), None);
        assert_eq!(SampleSelector::from_chars('1', ':'), None);
        assert_eq!(SampleSelector::from_chars('٣', '1'), None);
        assert_eq!(SampleSelector::new(10, 0), None);
        assert_eq!(SampleSelector::new(0, 0).unwrap().resource_name(), "m00.txt");
    }

    #[test]
    fn test_read_selector_chars() {
        let mut input = Cursor::new("  4\n\n 2 x");
        assert_eq!(read_selector_char(&mut input).unwrap(), Some('4'));
        assert_eq!(read_selector_char(&mut input).unwrap(), Some('2'));
        assert_eq!(read_selector_char(&mut input).unwrap(), Some('x'));
        assert_eq!(read_selector_char(&mut input).unwrap(), None);
    }

    #[test]
    fn test_report_format() {
        let result = ClassificationResult {
            session: 1,
            scores: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
            predicted_class: 0,
            true_class: 2,
            elapsed: Duration::from_millis(42),
        };
        let mut out = Vec::new();
        write_report(&mut out, &result).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Elapsed time: 42 ms"));
        assert!(text.contains("Output result: 9, 8, 7, 6, 5, 4, 3, 2, 1, 0"));
        assert!(text.contains("True class: 2, predicted class: 0"));
    }
}
