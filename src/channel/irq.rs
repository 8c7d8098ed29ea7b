//! Completion-notification handling.
//!
//! The handler runs in whatever context raises the notification, which may
//! preempt the transmitter. It only copies one chunk out of the result channel
//! and queues it for the accumulator worker; it never touches the feature
//! vector itself.

use crate::channel::types::{RawChunk, CHUNK_WORDS};
use crate::channel::ResultChannel;
use crate::core::accumulator::AccumulatorMsg;
use crate::error::ChannelError;
use crate::stats::SharedRunStats;
use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, error};

/// Services completion notifications for one result channel.
pub struct CompletionHandler<R: ResultChannel> {
    results: R,
    sender: Sender<AccumulatorMsg>,
    stats: SharedRunStats,
    notifications: u64,
}

impl<R: ResultChannel> CompletionHandler<R> {
    pub fn new(results: R, sender: Sender<AccumulatorMsg>, stats: SharedRunStats) -> Self {
        Self {
            results,
            sender,
            stats,
            notifications: 0,
        }
    }

    /// Read one chunk and hand it to the accumulator.
    ///
    /// Never blocks. A full queue is counted as an overrun and reported, so a
    /// lost chunk surfaces as a stall rather than a silent hang.
    pub fn on_completion(&mut self) -> Result<(), ChannelError> {
        self.notifications += 1;

        let mut words = Vec::with_capacity(CHUNK_WORDS);
        for offset in 0..CHUNK_WORDS {
            words.push(self.results.read_word(offset)?);
        }

        match self.sender.try_send(AccumulatorMsg::Chunk(RawChunk::new(words))) {
            Ok(()) => {
                debug!(notification = self.notifications, "chunk queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.record_overrun();
                error!(
                    notification = self.notifications,
                    "completion queue full, chunk dropped"
                );
                Err(ChannelError::Overrun)
            }
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::Disconnected),
        }
    }

    /// Notifications serviced so far.
    pub fn notifications(&self) -> u64 {
        self.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::create_shared_stats;
    use crossbeam_channel::bounded;

    struct CountingResults;

    impl ResultChannel for CountingResults {
        fn read_word(&mut self, offset: usize) -> Result<u32, ChannelError> {
            Ok(offset as u32)
        }
    }

    struct FailingResults;

    impl ResultChannel for FailingResults {
        fn read_word(&mut self, offset: usize) -> Result<u32, ChannelError> {
            Err(ChannelError::Read {
                offset,
                reason: "bus error".to_string(),
            })
        }
    }

    #[test]
    fn test_reads_sequential_offsets() {
        let (tx, rx) = bounded(4);
        let mut handler = CompletionHandler::new(CountingResults, tx, create_shared_stats());

        handler.on_completion().unwrap();

        match rx.try_recv().unwrap() {
            AccumulatorMsg::Chunk(chunk) => {
                assert_eq!(chunk.words.len(), CHUNK_WORDS);
                assert_eq!(chunk.words[0], 0);
                assert_eq!(chunk.words[1023], 1023);
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(handler.notifications(), 1);
    }

    #[test]
    fn test_full_queue_counts_overrun() {
        let stats = create_shared_stats();
        let (tx, _rx) = bounded(1);
        let mut handler = CompletionHandler::new(CountingResults, tx, stats.clone());

        handler.on_completion().unwrap();
        assert!(matches!(handler.on_completion(), Err(ChannelError::Overrun)));
        assert_eq!(stats.snapshot().notification_overruns, 1);
    }

    #[test]
    fn test_read_failure_propagates() {
        let (tx, rx) = bounded(4);
        let mut handler = CompletionHandler::new(FailingResults, tx, create_shared_stats());

        assert!(matches!(
            handler.on_completion(),
            Err(ChannelError::Read { offset: 0, .. })
        ));
        assert!(rx.try_recv().is_err());
    }
}
