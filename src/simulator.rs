//! Synthetic board used by `cerelog-dummy-board` and the tests
//!
//! Channels carry sine waves at linearly spaced frequencies with a slowly
//! varying amplitude. The sample header holds a 4-byte big-endian counter.

use std::f64::consts::PI;

use anyhow::{Context, Result, bail};

use crate::decoder::microvolts_per_count;
use crate::protocol::{
    BYTES_PER_CHANNEL, HANDSHAKE_SIZE, HandshakeControlPacket, NUM_CHANNELS, NUM_STATUS_BYTES,
    PAYLOAD_SIZE, RawFrame, SAMPLE_HEADER_SIZE,
};

/// ADS1299 status word: sync nibble `1100`, no lead-off bits
const STATUS: [u8; NUM_STATUS_BYTES] = [0xC0, 0x00, 0x00];

const MAX_CODE: f64 = 8_388_607.0;
const MIN_CODE: f64 = -8_388_608.0;

#[derive(Debug, Clone)]
pub struct SyntheticBoard {
    sample_rate: f64,
    frequencies: [f64; NUM_CHANNELS],
    amplitude_uv: f64,
    counter: u32,
}

impl SyntheticBoard {
    /// `freq_range` is the (lowest, highest) channel frequency in Hz
    pub fn new(sample_rate: f64, freq_range: (f64, f64), amplitude_uv: f64) -> Self {
        let (min_freq, max_freq) = freq_range;
        let step = (max_freq - min_freq) / (NUM_CHANNELS - 1) as f64;
        let frequencies = std::array::from_fn(|i| min_freq + step * i as f64);

        Self {
            sample_rate,
            frequencies,
            amplitude_uv,
            counter: 0,
        }
    }

    pub fn frequencies(&self) -> &[f64; NUM_CHANNELS] {
        &self.frequencies
    }

    /// Samples produced so far
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Raw codes of the next sample, without advancing
    pub fn peek_channels(&self) -> [i32; NUM_CHANNELS] {
        let t = self.counter as f64 / self.sample_rate;
        let per_count = microvolts_per_count();

        self.frequencies.map(|freq| {
            let amplitude = self.amplitude_uv * (0.5 + 0.3 * (2.0 * PI * 0.1 * freq * t).sin());
            let uv = amplitude * (2.0 * PI * freq * t).sin();
            (uv / per_count).round().clamp(MIN_CODE, MAX_CODE) as i32
        })
    }

    pub fn next_frame(&mut self) -> RawFrame {
        let frame = frame_for(self.counter, &self.peek_channels());
        self.counter = self.counter.wrapping_add(1);
        frame
    }
}

/// Frame carrying `channels` with `counter` in the sample header
pub fn frame_for(counter: u32, channels: &[i32; NUM_CHANNELS]) -> RawFrame {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[..4].copy_from_slice(&counter.to_be_bytes());

    let ads = &mut payload[SAMPLE_HEADER_SIZE..];
    ads[..NUM_STATUS_BYTES].copy_from_slice(&STATUS);
    for (chunk, raw) in ads[NUM_STATUS_BYTES..]
        .chunks_exact_mut(BYTES_PER_CHANNEL)
        .zip(channels)
    {
        chunk.copy_from_slice(&raw.to_be_bytes()[1..]);
    }

    RawFrame::from_payload(payload)
}

/// `len` random bytes for corrupting the stream between frames
pub fn garbage(len: usize) -> Vec<u8> {
    (0..len).map(|_| fastrand::u8(..)).collect()
}

/// Accumulates host bytes until a valid handshake packet shows up
#[derive(Debug, Default)]
pub struct HandshakeListener {
    buffer: Vec<u8>,
}

impl HandshakeListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Option<HandshakeControlPacket> {
        self.buffer.extend_from_slice(bytes);
        if let Some(packet) = HandshakeControlPacket::scan(&self.buffer) {
            self.buffer.clear();
            return Some(packet);
        }

        // Keep only what could still be the start of a packet
        let keep = self.buffer.len().min(HANDSHAKE_SIZE - 1);
        self.buffer.drain(..self.buffer.len() - keep);
        None
    }
}

/// Parse a `min,max` channel frequency range in Hz
pub fn parse_freq_range(range: &str) -> Result<(f64, f64)> {
    let (min, max) = range
        .split_once(',')
        .context("Frequency range must look like 'min,max'")?;
    let min: f64 = min
        .trim()
        .parse()
        .with_context(|| format!("Invalid minimum frequency '{}'", min.trim()))?;
    let max: f64 = max
        .trim()
        .parse()
        .with_context(|| format!("Invalid maximum frequency '{}'", max.trim()))?;

    if !(min >= 0.0 && min < max) {
        bail!("Frequency range needs 0 <= min < max, got {} and {}", min, max);
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::framing::FrameAssembler;
    use crate::protocol::FIRMWARE_BAUD_RATE_INDEX;

    #[test]
    fn test_frames_decode_to_generated_channels() {
        let mut board = SyntheticBoard::new(250.0, (1.0, 10.0), 100.0);
        for _ in 0..50 {
            let expected = board.peek_channels();
            let counter = board.counter();
            let frame = board.next_frame();

            assert_eq!(decode(&frame).channels, expected);
            assert_eq!(&frame.sample_header()[..4], &counter.to_be_bytes());
        }
    }

    #[test]
    fn test_parse_freq_range() {
        assert_eq!(parse_freq_range("1,10").unwrap(), (1.0, 10.0));
        assert_eq!(parse_freq_range(" 0.5 , 40 ").unwrap(), (0.5, 40.0));

        assert!(parse_freq_range("10").is_err());
        assert!(parse_freq_range("1,2,3").is_err());
        assert!(parse_freq_range("a,10").is_err());
        assert!(parse_freq_range("10,1").is_err());
        assert!(parse_freq_range("5,5").is_err());
        assert!(parse_freq_range("-1,5").is_err());
    }

    #[test]
    fn test_linearly_spaced_frequencies() {
        let board = SyntheticBoard::new(250.0, (2.0, 16.0), 50.0);
        assert_eq!(board.frequencies()[0], 2.0);
        assert_eq!(board.frequencies()[1], 4.0);
        assert_eq!(board.frequencies()[7], 16.0);
    }

    #[test]
    fn test_stream_with_garbage_between_frames() {
        let mut board = SyntheticBoard::new(250.0, (1.0, 10.0), 100.0);
        let mut expected = Vec::new();
        let mut stream = Vec::new();

        for _ in 0..100 {
            // Markers inside the noise may eat a frame, never invent one
            stream.extend(garbage(fastrand::usize(0..5)).into_iter().filter(|&b| b != 0xAB));
            let frame = board.next_frame();
            expected.push(decode(&frame));
            stream.extend_from_slice(&frame.to_bytes());
        }

        let mut assembler = FrameAssembler::new();
        let decoded: Vec<_> = stream
            .chunks(13)
            .flat_map(|chunk| assembler.feed(chunk).collect::<Vec<_>>())
            .map(|frame| decode(&frame))
            .collect();

        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_handshake_listener_split_across_reads() {
        let packet = HandshakeControlPacket::new(1_700_000_000, FIRMWARE_BAUD_RATE_INDEX);
        let bytes = packet.encode();
        let mut listener = HandshakeListener::new();

        assert_eq!(listener.feed(&[0x00, 0x13, 0xAA]), None);
        assert_eq!(listener.feed(&bytes[..6]), None);
        assert_eq!(listener.feed(&bytes[6..]), Some(packet));
    }

    #[test]
    fn test_handshake_listener_rejects_bad_checksum() {
        let mut bytes = HandshakeControlPacket::new(42, FIRMWARE_BAUD_RATE_INDEX).encode();
        bytes[9] ^= 0xFF;
        assert_eq!(HandshakeListener::new().feed(&bytes), None);
    }
}
