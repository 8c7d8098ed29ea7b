//! Wire types shared with the accelerator.
//!
//! The event channel takes two 32-bit words per event and tells them apart by
//! position only. The result channel delivers fixed-size chunks of raw,
//! zero-point-quantized output samples.

use serde::{Deserialize, Serialize};

/// Number of raw words delivered per completion notification.
pub const CHUNK_WORDS: usize = 1024;

/// Number of chunks that make up one feature vector.
pub const CHUNKS_PER_VECTOR: usize = 4;

/// Length of a complete feature vector.
pub const FEATURE_DIM: usize = CHUNK_WORDS * CHUNKS_PER_VECTOR;

/// Number of output classes.
pub const OUTPUT_DIM: usize = 10;

/// Dequantization offset subtracted from every raw output sample.
pub const ZERO_POINT: i32 = 213;

const VALID_WEIGHT: u32 = 1;
const POLARITY_WEIGHT: u32 = 2;
const Y_WEIGHT: u32 = 4;
const X_WEIGHT: u32 = 1024;

/// One sensor event as recorded in a sample file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub x: u32,
    pub y: u32,
    /// Timestamp in recording time units
    pub timestamp: u32,
    /// 0 (off) or 1 (on)
    pub polarity: u32,
}

impl Event {
    pub fn new(x: u32, y: u32, timestamp: u32, polarity: u32) -> Self {
        Self {
            x,
            y,
            timestamp,
            polarity,
        }
    }
}

/// The two words written to the event channel for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPacket {
    /// valid | polarity | y | x, packed by fixed bit weights
    pub word_a: u32,
    /// Raw timestamp
    pub word_b: u32,
}

impl EventPacket {
    /// Encode an event. Arithmetic wraps at 32 bits, exactly like the
    /// accelerator's reference firmware.
    pub fn encode(event: &Event) -> Self {
        let word_a = VALID_WEIGHT
            .wrapping_add(POLARITY_WEIGHT.wrapping_mul(event.polarity))
            .wrapping_add(Y_WEIGHT.wrapping_mul(event.y))
            .wrapping_add(X_WEIGHT.wrapping_mul(event.x));

        Self {
            word_a,
            word_b: event.timestamp,
        }
    }

    /// Decode a packet back into its fields.
    ///
    /// Exact for `y < 256`, `polarity` in `{0, 1}` and `x < 2^22`.
    pub fn decode(&self) -> DecodedPacket {
        DecodedPacket {
            valid: self.word_a & 1 == 1,
            event: Event {
                x: self.word_a / X_WEIGHT,
                y: (self.word_a / Y_WEIGHT) & 0xFF,
                timestamp: self.word_b,
                polarity: (self.word_a / POLARITY_WEIGHT) & 1,
            },
        }
    }

    /// Words in the order they must be written.
    pub fn words(&self) -> [u32; 2] {
        [self.word_a, self.word_b]
    }
}

/// Result of decoding an [`EventPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPacket {
    pub valid: bool,
    pub event: Event,
}

/// One chunk of raw output words, as read from the result channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub words: Vec<u32>,
}

impl RawChunk {
    pub fn new(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Dequantized value of the word at `index`.
    pub fn value(&self, index: usize) -> i32 {
        (self.words[index] as i32).wrapping_sub(ZERO_POINT)
    }
}

/// Position in the feature vector of local word `local` of chunk `chunk_index`.
///
/// Mirrors the accelerator's 4-lane output memory layout.
pub fn feature_index(local: usize, chunk_index: usize) -> usize {
    ((local / 64) % 4) * 1024 + (local / 256) * 256 + local % 64 + chunk_index * 64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_encode_known_words() {
        let packet = EventPacket::encode(&Event::new(1, 0, 0, 0));
        assert_eq!(packet.words(), [1025, 0]);

        let packet = EventPacket::encode(&Event::new(1, 0, 50, 1));
        assert_eq!(packet.words(), [1027, 50]);

        let packet = EventPacket::encode(&Event::new(127, 63, 9000, 1));
        assert_eq!(packet.word_a, 1 + 2 + 4 * 63 + 1024 * 127);
    }

    #[test]
    fn test_decode_recovers_fields() {
        for x in 0..256 {
            for y in 0..64 {
                for polarity in 0..2 {
                    let event = Event::new(x, y, x * y, polarity);
                    let decoded = EventPacket::encode(&event).decode();
                    assert!(decoded.valid);
                    assert_eq!(decoded.event, event);
                }
            }
        }

        // y beyond the six-bit sensor range still fits its field
        for &(x, y, polarity) in &[(255, 255, 1), (17, 200, 0)] {
            let event = Event::new(x, y, 1234, polarity);
            assert_eq!(EventPacket::encode(&event).decode().event, event);
        }
    }

    #[test]
    fn test_raw_chunk_dequantizes() {
        let chunk = RawChunk::new(vec![213, 0, 255]);
        assert_eq!(chunk.value(0), 0);
        assert_eq!(chunk.value(1), -213);
        assert_eq!(chunk.value(2), 42);
    }

    #[test]
    fn test_feature_index_covers_vector_once() {
        let mut seen = HashSet::new();
        for chunk in 0..CHUNKS_PER_VECTOR {
            for local in 0..CHUNK_WORDS {
                let index = feature_index(local, chunk);
                assert!(index < FEATURE_DIM);
                assert!(seen.insert(index), "index {index} written twice");
            }
        }
        assert_eq!(seen.len(), FEATURE_DIM);
    }

    #[test]
    fn test_feature_index_layout() {
        assert_eq!(feature_index(0, 0), 0);
        assert_eq!(feature_index(63, 0), 63);
        assert_eq!(feature_index(64, 0), 1024);
        assert_eq!(feature_index(256, 0), 256);
        assert_eq!(feature_index(0, 3), 192);
    }
}
