//! Software stand-in for the accelerator.
//!
//! Consumes event packets from the event channel on a background thread. Once
//! the stream has been quiet for `idle_flush`, it turns the events it saw into a
//! deterministic feature map (an event-count histogram over a 64x64 grid) and
//! delivers it as four interleaved chunks, raising one completion notification
//! per chunk exactly like the hardware does.

use crate::channel::types::{
    feature_index, Event, EventPacket, CHUNKS_PER_VECTOR, CHUNK_WORDS, FEATURE_DIM, ZERO_POINT,
};
use crate::channel::{EventChannel, ResultChannel};
use crate::error::ChannelError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const GRID_SIDE: u32 = 64;
const CELL_SIZE: u32 = 4;

/// Behaviour of the simulated accelerator.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Quiet period after the last word before results are produced
    pub idle_flush: Duration,
    /// Delay between successive completion notifications
    pub chunk_interval: Duration,
    /// Chunks delivered per feature vector; fewer than 4 simulates a stall
    pub chunks_delivered: usize,
    /// Depth of the event FIFO in words
    pub fifo_words: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            idle_flush: Duration::from_millis(200),
            chunk_interval: Duration::from_millis(1),
            chunks_delivered: CHUNKS_PER_VECTOR,
            fifo_words: 16_384,
        }
    }
}

/// Errors from controlling the simulator.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulated accelerator is already running")]
    AlreadyRunning,
}

/// Event channel endpoint of the simulator.
#[derive(Debug, Clone)]
pub struct SimEventPort {
    sender: Sender<u32>,
}

impl EventChannel for SimEventPort {
    fn write_word(&mut self, word: u32) -> Result<(), ChannelError> {
        self.sender
            .send(word)
            .map_err(|_| ChannelError::Disconnected)
    }
}

/// Result channel endpoint of the simulator.
#[derive(Debug, Clone)]
pub struct SimResultPort {
    memory: Arc<Mutex<Vec<u32>>>,
}

impl ResultChannel for SimResultPort {
    fn read_word(&mut self, offset: usize) -> Result<u32, ChannelError> {
        let memory = self.memory.lock().map_err(|_| ChannelError::Read {
            offset,
            reason: "result memory poisoned".to_string(),
        })?;
        memory.get(offset).copied().ok_or_else(|| ChannelError::Read {
            offset,
            reason: "offset outside result window".to_string(),
        })
    }
}

/// Event-count histogram the simulator reports as its feature vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFeatureMap {
    counts: Vec<u32>,
    events: usize,
}

impl SimFeatureMap {
    /// Largest count representable in one raw output word.
    pub const MAX_COUNT: u32 = 255 - ZERO_POINT as u32;

    pub fn new() -> Self {
        Self {
            counts: vec![0; FEATURE_DIM],
            events: 0,
        }
    }

    pub fn from_events(events: &[Event]) -> Self {
        let mut map = Self::new();
        for event in events {
            map.add(event);
        }
        map
    }

    pub fn add(&mut self, event: &Event) {
        let gx = (event.x / CELL_SIZE).min(GRID_SIDE - 1);
        let gy = (event.y / CELL_SIZE).min(GRID_SIDE - 1);
        let cell = (gx * GRID_SIDE + gy) as usize;
        self.counts[cell] = (self.counts[cell] + 1).min(Self::MAX_COUNT);
        self.events += 1;
    }

    pub fn event_count(&self) -> usize {
        self.events
    }

    /// Dequantized features, as the host should reconstruct them.
    pub fn features(&self) -> Vec<i32> {
        self.counts.iter().map(|&c| c as i32).collect()
    }

    /// Raw words of chunk `ordinal` in output memory order.
    pub fn chunk(&self, ordinal: usize) -> Vec<u32> {
        (0..CHUNK_WORDS)
            .map(|local| ZERO_POINT as u32 + self.counts[feature_index(local, ordinal)])
            .collect()
    }
}

impl Default for SimFeatureMap {
    fn default() -> Self {
        Self::new()
    }
}

/// A simulated accelerator running on a background thread.
pub struct SimulatedAccelerator {
    config: SimConfig,
    receiver: Option<Receiver<u32>>,
    memory: Arc<Mutex<Vec<u32>>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SimulatedAccelerator {
    /// Create the simulator and its two channel endpoints.
    pub fn new(config: SimConfig) -> (Self, SimEventPort, SimResultPort) {
        let (sender, receiver) = bounded(config.fifo_words);
        let memory = Arc::new(Mutex::new(vec![0; CHUNK_WORDS]));

        let sim = Self {
            config,
            receiver: Some(receiver),
            memory: memory.clone(),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        };

        (sim, SimEventPort { sender }, SimResultPort { memory })
    }

    /// Start consuming events. `on_completion` is raised once per chunk.
    pub fn start<F>(&mut self, on_completion: F) -> Result<(), SimError>
    where
        F: FnMut() + Send + 'static,
    {
        let receiver = self.receiver.take().ok_or(SimError::AlreadyRunning)?;

        self.running.store(true, Ordering::SeqCst);

        let memory = self.memory.clone();
        let running = self.running.clone();
        let config = self.config.clone();

        let handle = thread::spawn(move || {
            run_accelerator(receiver, memory, running.clone(), config, on_completion);
            running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop the simulator.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SimulatedAccelerator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_accelerator<F: FnMut()>(
    receiver: Receiver<u32>,
    memory: Arc<Mutex<Vec<u32>>>,
    running: Arc<AtomicBool>,
    config: SimConfig,
    mut on_completion: F,
) {
    let mut map = SimFeatureMap::new();
    let mut pending_word_a: Option<u32> = None;

    info!("simulated accelerator started");

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(config.idle_flush) {
            Ok(word) => match pending_word_a.take() {
                None => pending_word_a = Some(word),
                Some(word_a) => {
                    let decoded = EventPacket {
                        word_a,
                        word_b: word,
                    }
                    .decode();
                    if decoded.valid {
                        map.add(&decoded.event);
                    } else {
                        warn!(word_a, "event packet without valid bit ignored");
                    }
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if pending_word_a.take().is_some() {
                    warn!("dangling half packet discarded");
                }
                if map.event_count() == 0 {
                    continue;
                }

                debug!(events = map.event_count(), "event stream idle, emitting features");
                for ordinal in 0..config.chunks_delivered.min(CHUNKS_PER_VECTOR) {
                    match memory.lock() {
                        Ok(mut window) => window.copy_from_slice(&map.chunk(ordinal)),
                        Err(_) => {
                            warn!("result memory poisoned, stopping");
                            return;
                        }
                    }
                    on_completion();
                    thread::sleep(config.chunk_interval);
                }
                map = SimFeatureMap::new();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("simulated accelerator exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn fast_config() -> SimConfig {
        SimConfig {
            idle_flush: Duration::from_millis(30),
            chunk_interval: Duration::ZERO,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_feature_map_counts_cells() {
        let events = vec![
            Event::new(0, 0, 0, 1),
            Event::new(3, 3, 1, 0),
            Event::new(4, 0, 2, 1),
            Event::new(255, 255, 3, 1),
        ];
        let features = SimFeatureMap::from_events(&events).features();

        assert_eq!(features[0], 2);
        assert_eq!(features[64], 1);
        assert_eq!(features[63 * 64 + 63], 1);
        assert_eq!(features.iter().sum::<i32>(), 4);
    }

    #[test]
    fn test_feature_map_saturates() {
        let events = vec![Event::new(0, 0, 0, 1); 100];
        let map = SimFeatureMap::from_events(&events);
        assert_eq!(map.features()[0], SimFeatureMap::MAX_COUNT as i32);
        assert_eq!(map.chunk(0)[0], 255);
    }

    #[test]
    fn test_result_port_bounds() {
        let (_sim, _events, mut results) = SimulatedAccelerator::new(fast_config());
        assert_eq!(results.read_word(0).unwrap(), 0);
        assert!(results.read_word(CHUNK_WORDS).is_err());
    }

    #[test]
    fn test_emits_chunks_after_idle() {
        let (mut sim, mut events, mut results) = SimulatedAccelerator::new(fast_config());
        let (tx, rx) = unbounded();

        sim.start(move || {
            let words: Vec<u32> = (0..CHUNK_WORDS)
                .map(|offset| results.read_word(offset).unwrap())
                .collect();
            tx.send(words).unwrap();
        })
        .unwrap();
        assert!(matches!(sim.start(|| {}), Err(SimError::AlreadyRunning)));

        let sample = [Event::new(8, 4, 0, 1), Event::new(8, 4, 10, 0)];
        for event in &sample {
            events.write_packet(&EventPacket::encode(event)).unwrap();
        }

        let expected = SimFeatureMap::from_events(&sample);
        for ordinal in 0..CHUNKS_PER_VECTOR {
            let words = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(words, expected.chunk(ordinal));
        }

        sim.stop();
        assert!(!sim.is_running());
    }
}
