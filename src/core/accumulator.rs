//! Chunked accumulation of accelerator output into a feature vector.
//!
//! Completion notifications hand raw chunks over a bounded queue to a single
//! worker thread. The worker is the only owner of the feature vector and its
//! chunk counter, so no two chunks are ever applied concurrently and a chunk is
//! never partially applied. When the fourth chunk of a session lands, the worker
//! classifies synchronously and publishes the result.

use crate::channel::types::{
    feature_index, RawChunk, CHUNKS_PER_VECTOR, CHUNK_WORDS, FEATURE_DIM,
};
use crate::core::classifier::{classify, ClassificationResult, WeightMatrix};
use crate::stats::SharedRunStats;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Dequantized accelerator output for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureVector {
    values: Vec<i32>,
}

impl FeatureVector {
    /// Create a zeroed vector.
    pub fn new() -> Self {
        Self {
            values: vec![0; FEATURE_DIM],
        }
    }

    /// Wrap existing values. Returns `None` unless there are exactly `FEATURE_DIM`.
    pub fn from_values(values: Vec<i32>) -> Option<Self> {
        (values.len() == FEATURE_DIM).then_some(Self { values })
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Dequantize `chunk` and scatter it to the positions owned by `chunk_index`.
    ///
    /// Placement depends only on the local word index and `chunk_index`.
    pub fn write_chunk(&mut self, chunk_index: usize, chunk: &RawChunk) {
        for local in 0..CHUNK_WORDS {
            self.values[feature_index(local, chunk_index)] = chunk.value(local);
        }
    }

    pub fn clear(&mut self) {
        self.values.fill(0);
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the accumulator needs to classify one sample.
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub session: u64,
    pub true_class: u8,
    pub weights: Arc<WeightMatrix>,
    /// When transmission to the accelerator began
    pub started_at: Instant,
}

/// Messages consumed by the accumulator worker.
#[derive(Debug)]
pub enum AccumulatorMsg {
    /// Start a new session, discarding any partial state.
    Begin(SessionStart),
    /// The session's first packet has been written to the event channel.
    StreamStarted { session: u64 },
    /// One chunk delivered by a completion notification.
    Chunk(RawChunk),
    Shutdown,
}

/// The accumulation state machine.
#[derive(Debug)]
pub struct ResultAccumulator {
    features: FeatureVector,
    /// Chunks applied in the current session (0..CHUNKS_PER_VECTOR)
    chunks_received: usize,
    session: Option<SessionStart>,
    /// Set once the session's event stream has started
    streaming: bool,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self {
            features: FeatureVector::new(),
            chunks_received: 0,
            session: None,
            streaming: false,
        }
    }

    /// Start accumulating for a new session.
    pub fn begin(&mut self, start: SessionStart) {
        if self.chunks_received > 0 {
            warn!(
                chunks = self.chunks_received,
                "discarding partial feature vector from previous session"
            );
        }
        debug!(session = start.session, "accumulator armed");
        self.features.clear();
        self.chunks_received = 0;
        self.session = Some(start);
        self.streaming = false;
    }

    /// Accept chunks for `session` from now on.
    ///
    /// Chunks dequeued between [`begin`](Self::begin) and this call cannot
    /// belong to the new session, whose first event had not been sent yet.
    pub fn stream_started(&mut self, session: u64) {
        match self.session.as_ref() {
            Some(active) if active.session == session => self.streaming = true,
            _ => warn!(session, "stream marker for inactive session ignored"),
        }
    }

    /// Apply one chunk. Returns the classification once the vector is complete.
    ///
    /// The chunk's ordinal within the session is the number of chunks already applied.
    pub fn apply_chunk(&mut self, chunk: &RawChunk) -> Option<ClassificationResult> {
        if chunk.words.len() != CHUNK_WORDS {
            warn!(len = chunk.words.len(), "ignoring malformed chunk");
            return None;
        }

        let Some(session) = self.session.as_ref() else {
            warn!("chunk arrived with no active session, discarded");
            return None;
        };

        if !self.streaming {
            warn!(
                session = session.session,
                "chunk arrived before the event stream started, discarded as stale"
            );
            return None;
        }

        self.features.write_chunk(self.chunks_received, chunk);
        self.chunks_received += 1;
        debug!(
            session = session.session,
            chunk = self.chunks_received,
            "feature chunk received"
        );

        if self.chunks_received < CHUNKS_PER_VECTOR {
            return None;
        }

        let result = classify(
            session.session,
            &self.features,
            &session.weights,
            session.true_class,
            session.started_at.elapsed(),
        );

        self.chunks_received = 0;
        self.features.clear();
        self.session = None;
        self.streaming = false;

        Some(result)
    }

    pub fn chunks_received(&self) -> usize {
        self.chunks_received
    }

    /// The session currently being accumulated, if any.
    pub fn active_session(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.session)
    }
}

impl Default for ResultAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Dedicated thread that owns a [`ResultAccumulator`].
pub struct AccumulatorWorker {
    sender: Sender<AccumulatorMsg>,
    results: Receiver<ClassificationResult>,
    progress: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AccumulatorWorker {
    /// Spawn the worker with a chunk queue of `queue_depth` messages.
    pub fn start(queue_depth: usize, stats: SharedRunStats) -> Self {
        let (sender, receiver) = bounded::<AccumulatorMsg>(queue_depth);
        let (result_tx, results) = bounded::<ClassificationResult>(16);
        let progress = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let thread_progress = progress.clone();
        let thread_running = running.clone();
        let handle = thread::spawn(move || {
            run_worker(receiver, result_tx, thread_progress, stats);
            thread_running.store(false, Ordering::SeqCst);
        });

        Self {
            sender,
            results,
            progress,
            running,
            thread_handle: Some(handle),
        }
    }

    /// Sender used by the controller and the completion handler.
    pub fn sender(&self) -> Sender<AccumulatorMsg> {
        self.sender.clone()
    }

    /// Receiver for completed classifications.
    pub fn results(&self) -> &Receiver<ClassificationResult> {
        &self.results
    }

    /// Chunks applied so far in the current session.
    pub fn chunks_received(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the worker and wait for it to exit.
    pub fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.sender.send(AccumulatorMsg::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for AccumulatorWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    receiver: Receiver<AccumulatorMsg>,
    results: Sender<ClassificationResult>,
    progress: Arc<AtomicUsize>,
    stats: SharedRunStats,
) {
    let mut accumulator = ResultAccumulator::new();

    for msg in receiver.iter() {
        match msg {
            AccumulatorMsg::Begin(start) => accumulator.begin(start),
            AccumulatorMsg::StreamStarted { session } => accumulator.stream_started(session),
            AccumulatorMsg::Chunk(chunk) => {
                stats.record_chunk_received();
                if let Some(result) = accumulator.apply_chunk(&chunk) {
                    info!(
                        session = result.session,
                        predicted = result.predicted_class,
                        elapsed_ms = result.elapsed.as_millis() as u64,
                        "feature vector complete"
                    );
                    match results.try_send(result) {
                        Ok(()) => {}
                        Err(TrySendError::Full(result)) => {
                            error!(session = result.session, "result queue full, result dropped");
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
            }
            AccumulatorMsg::Shutdown => break,
        }
        progress.store(accumulator.chunks_received(), Ordering::SeqCst);
    }

    debug!("accumulator worker exiting");
}
