//! Paced replay of recorded events to the accelerator.
//!
//! Events are written in file order. After each event the transmitter waits
//! for the gap to the next timestamp, so the accelerator sees roughly the
//! original timing. Pacing is best effort, not a hard real-time guarantee.

use crate::channel::types::{Event, EventPacket};
use crate::channel::EventChannel;
use crate::error::ChannelError;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Default cutoff: events stamped later than this are not sent.
pub const DEFAULT_TIME_BUDGET: u32 = 200_000;

/// Blocks the transmitting thread between events.
pub trait Pacer {
    /// Wait for `units` recording time units.
    fn pause(&mut self, units: u32);
}

/// Sleeps the current thread, `unit` per time unit.
#[derive(Debug, Clone, Copy)]
pub struct ThreadPacer {
    unit: Duration,
}

impl ThreadPacer {
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }
}

impl Pacer for ThreadPacer {
    fn pause(&mut self, units: u32) {
        if units == 0 || self.unit.is_zero() {
            return;
        }
        thread::sleep(self.unit.saturating_mul(units));
    }
}

/// Outcome of one transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitSummary {
    /// Packets written
    pub sent: usize,
    /// Whether the time budget cut the sequence short
    pub stopped_early: bool,
    /// Timestamp of the last packet written
    pub last_timestamp: Option<u32>,
}

/// Writes events to the hardware event channel at their recorded pace.
pub struct EventTransmitter<C: EventChannel, P: Pacer> {
    channel: C,
    pacer: P,
    time_budget: u32,
}

impl<C: EventChannel, P: Pacer> EventTransmitter<C, P> {
    pub fn new(channel: C, pacer: P) -> Self {
        Self {
            channel,
            pacer,
            time_budget: DEFAULT_TIME_BUDGET,
        }
    }

    /// Stop before any event whose timestamp exceeds `budget`.
    pub fn with_time_budget(mut self, budget: u32) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn time_budget(&self) -> u32 {
        self.time_budget
    }

    /// Transmit `events` in order.
    ///
    /// A channel failure aborts the whole sequence: the accelerator's stream
    /// state cannot be resynchronized, so nothing is retried.
    pub fn transmit(&mut self, events: &[Event]) -> Result<TransmitSummary, ChannelError> {
        self.transmit_with(events, || {})
    }

    /// Like [`transmit`](Self::transmit), calling `on_first_sent` once the
    /// first packet has been written. Not called if nothing is sent.
    pub fn transmit_with<F: FnOnce()>(
        &mut self,
        events: &[Event],
        on_first_sent: F,
    ) -> Result<TransmitSummary, ChannelError> {
        let mut on_first_sent = Some(on_first_sent);
        let mut summary = TransmitSummary {
            sent: 0,
            stopped_early: false,
            last_timestamp: None,
        };

        for (i, event) in events.iter().enumerate() {
            if event.timestamp > self.time_budget {
                debug!(
                    index = i,
                    timestamp = event.timestamp,
                    "time budget reached, stopping"
                );
                summary.stopped_early = true;
                break;
            }

            // Out-of-order timestamps do not wait
            let wait = events
                .get(i + 1)
                .map(|next| next.timestamp.saturating_sub(event.timestamp))
                .unwrap_or(0);

            self.channel.write_packet(&EventPacket::encode(event))?;
            summary.sent += 1;
            summary.last_timestamp = Some(event.timestamp);
            if let Some(notify) = on_first_sent.take() {
                notify();
            }

            self.pacer.pause(wait);
        }

        info!(
            sent = summary.sent,
            total = events.len(),
            stopped_early = summary.stopped_early,
            "event transmission finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, PartialEq, Eq)]
    enum Step {
        Word(u32),
        Wait(u32),
        FirstSent,
    }

    /// Writes and pauses recorded on one timeline.
    type Timeline = Arc<Mutex<Vec<Step>>>;

    struct RecordingChannel(Timeline);

    impl EventChannel for RecordingChannel {
        fn write_word(&mut self, word: u32) -> Result<(), ChannelError> {
            self.0.lock().unwrap().push(Step::Word(word));
            Ok(())
        }
    }

    struct RecordingPacer(Timeline);

    impl Pacer for RecordingPacer {
        fn pause(&mut self, units: u32) {
            self.0.lock().unwrap().push(Step::Wait(units));
        }
    }

    struct FailAfter(usize);

    impl EventChannel for FailAfter {
        fn write_word(&mut self, _word: u32) -> Result<(), ChannelError> {
            if self.0 == 0 {
                return Err(ChannelError::Write {
                    reason: "bus fault".to_string(),
                });
            }
            self.0 -= 1;
            Ok(())
        }
    }

    struct NoPause;

    impl Pacer for NoPause {
        fn pause(&mut self, _units: u32) {}
    }

    fn run(events: &[Event], budget: u32) -> (TransmitSummary, Vec<Step>) {
        let timeline = Timeline::default();
        let summary = EventTransmitter::new(
            RecordingChannel(timeline.clone()),
            RecordingPacer(timeline.clone()),
        )
        .with_time_budget(budget)
        .transmit(events)
        .unwrap();
        let steps = std::mem::take(&mut *timeline.lock().unwrap());
        (summary, steps)
    }

    #[test]
    fn test_two_event_sequence() {
        let events = [Event::new(1, 0, 0, 0), Event::new(1, 0, 50, 1)];
        let (summary, steps) = run(&events, DEFAULT_TIME_BUDGET);

        assert_eq!(
            steps,
            vec![
                Step::Word(1025),
                Step::Word(0),
                Step::Wait(50),
                Step::Word(1027),
                Step::Word(50),
                Step::Wait(0),
            ]
        );
        assert_eq!(summary.sent, 2);
        assert!(!summary.stopped_early);
        assert_eq!(summary.last_timestamp, Some(50));
    }

    #[test]
    fn test_cutoff_before_sending() {
        let events = [
            Event::new(1, 1, 199_990, 0),
            Event::new(2, 2, 200_000, 1),
            Event::new(3, 3, 200_001, 0),
            Event::new(4, 4, 200_050, 1),
        ];
        let (summary, steps) = run(&events, DEFAULT_TIME_BUDGET);

        assert_eq!(summary.sent, 2);
        assert!(summary.stopped_early);
        assert_eq!(summary.last_timestamp, Some(200_000));
        let words: Vec<&Step> = steps.iter().filter(|s| matches!(s, Step::Word(_))).collect();
        assert_eq!(words.len(), 4);
        assert!(!steps.contains(&Step::Word(200_001)));
    }

    #[test]
    fn test_decreasing_timestamps_do_not_wait() {
        let events = [Event::new(0, 0, 100, 0), Event::new(0, 0, 40, 0)];
        let (_, steps) = run(&events, DEFAULT_TIME_BUDGET);
        assert_eq!(steps[2], Step::Wait(0));
    }

    #[test]
    fn test_channel_failure_aborts() {
        let events = [Event::new(0, 0, 0, 0), Event::new(0, 0, 1, 0)];
        let mut transmitter = EventTransmitter::new(FailAfter(3), NoPause);
        assert!(matches!(
            transmitter.transmit(&events),
            Err(ChannelError::Write { .. })
        ));
    }

    #[test]
    fn test_first_sent_follows_first_packet() {
        let timeline = Timeline::default();
        let marker = timeline.clone();
        let events = [Event::new(1, 0, 0, 0), Event::new(1, 0, 5, 0)];

        EventTransmitter::new(
            RecordingChannel(timeline.clone()),
            RecordingPacer(timeline.clone()),
        )
        .transmit_with(&events, move || marker.lock().unwrap().push(Step::FirstSent))
        .unwrap();

        let steps = timeline.lock().unwrap();
        assert_eq!(steps[2], Step::FirstSent);
        assert_eq!(steps[3], Step::Wait(5));
        assert_eq!(steps.iter().filter(|s| **s == Step::FirstSent).count(), 1);
    }

    #[test]
    fn test_first_sent_skipped_when_nothing_sent() {
        let mut called = false;
        let events = [Event::new(0, 0, 250_000, 0)];
        let summary = EventTransmitter::new(FailAfter(0), NoPause)
            .transmit_with(&events, || called = true)
            .unwrap();

        assert_eq!(summary.sent, 0);
        assert!(summary.stopped_early);
        assert!(!called);
    }

    #[test]
    fn test_empty_sequence() {
        let (summary, steps) = run(&[], DEFAULT_TIME_BUDGET);
        assert_eq!(summary.sent, 0);
        assert!(steps.is_empty());
    }
}
