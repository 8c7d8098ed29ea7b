//! Hardware channels to the accelerator.
//!
//! The accelerator is reached through two memory-mapped windows: a write-only
//! event channel and a read-only result channel. A completion notification
//! signals that one chunk is ready in the result channel.

pub mod irq;
pub mod sim;
pub mod types;

use crate::error::ChannelError;

// Re-export commonly used types
pub use irq::CompletionHandler;
pub use sim::{
    SimConfig, SimError, SimEventPort, SimFeatureMap, SimResultPort, SimulatedAccelerator,
};
pub use types::{
    feature_index, DecodedPacket, Event, EventPacket, RawChunk, CHUNKS_PER_VECTOR, CHUNK_WORDS,
    FEATURE_DIM, OUTPUT_DIM, ZERO_POINT,
};

/// Write side of the hardware event channel.
///
/// There is no acknowledgment. Words are distinguished by write order only.
pub trait EventChannel: Send {
    /// Write one 32-bit word.
    fn write_word(&mut self, word: u32) -> Result<(), ChannelError>;

    /// Write both words of a packet, word A first.
    fn write_packet(&mut self, packet: &EventPacket) -> Result<(), ChannelError> {
        for word in packet.words() {
            self.write_word(word)?;
        }
        Ok(())
    }
}

/// Read side of the hardware result channel.
pub trait ResultChannel: Send {
    /// Read the 32-bit word at `offset` (in words) from the channel base.
    fn read_word(&mut self, offset: usize) -> Result<u32, ChannelError>;
}

impl<T: EventChannel + ?Sized> EventChannel for Box<T> {
    fn write_word(&mut self, word: u32) -> Result<(), ChannelError> {
        (**self).write_word(word)
    }
}

impl<T: ResultChannel + ?Sized> ResultChannel for Box<T> {
    fn read_word(&mut self, offset: usize) -> Result<u32, ChannelError> {
        (**self).read_word(offset)
    }
}
