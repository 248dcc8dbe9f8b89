//! Channel extraction for validated frames

use crate::protocol::{BYTES_PER_CHANNEL, NUM_CHANNELS, NUM_STATUS_BYTES, RawFrame};

/// ADS1299 reference voltage
pub const VREF: f64 = 4.5;

/// Fixed programmable gain of every channel
pub const GAIN: f64 = 24.0;

/// Microvolts represented by one code step
pub fn microvolts_per_count() -> f64 {
    (2.0 * VREF / GAIN) / (1u32 << 24) as f64 * 1_000_000.0
}

/// Convert a raw 24-bit code to microvolts
pub fn to_microvolts(raw: i32) -> f64 {
    raw as f64 * microvolts_per_count()
}

/// Raw channel codes of one acquisition, sign-extended to `i32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSample {
    pub channels: [i32; NUM_CHANNELS],
}

impl DecodedSample {
    pub fn new(channels: [i32; NUM_CHANNELS]) -> Self {
        Self { channels }
    }

    /// Channel values in microvolts, the form the outlet publishes
    pub fn microvolts(&self) -> [f32; NUM_CHANNELS] {
        self.channels.map(|raw| to_microvolts(raw) as f32)
    }

    /// The 24 channel bytes exactly as the device sent them
    pub fn channel_bytes(&self) -> [u8; NUM_CHANNELS * BYTES_PER_CHANNEL] {
        let mut out = [0u8; NUM_CHANNELS * BYTES_PER_CHANNEL];
        for (chunk, raw) in out.chunks_exact_mut(BYTES_PER_CHANNEL).zip(self.channels) {
            chunk.copy_from_slice(&raw.to_be_bytes()[1..]);
        }
        out
    }
}

/// Extract the eight channels from a frame that already passed validation
pub fn decode(frame: &RawFrame) -> DecodedSample {
    let channel_data = &frame.ads_block()[NUM_STATUS_BYTES..];
    let mut channels = [0i32; NUM_CHANNELS];

    for (value, bytes) in channels
        .iter_mut()
        .zip(channel_data.chunks_exact(BYTES_PER_CHANNEL))
    {
        *value = i24_from_be([bytes[0], bytes[1], bytes[2]]);
    }

    DecodedSample { channels }
}

/// Big-endian two's-complement 24-bit integer
fn i24_from_be(bytes: [u8; 3]) -> i32 {
    // Place the value in the top three bytes and shift back to sign-extend
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8
}
