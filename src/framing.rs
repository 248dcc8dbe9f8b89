//! Frame reassembly for the device byte stream
//!
//! The serial link delivers bytes in arbitrary chunks. [`FrameAssembler`]
//! accumulates them and yields validated [`RawFrame`]s, resynchronising after
//! corruption by stepping exactly one byte past any start marker whose window
//! fails validation. A start marker inside payload data therefore never
//! desynchronises the stream for longer than one scan per byte of drift.

use tracing::{debug, warn};

use crate::protocol::{FRAME_SIZE, FRAME_START_MARKER, RawFrame, has_frame_markers};

/// Consumed bytes are only moved out of the buffer once this many pile up
const COMPACT_THRESHOLD: usize = 4096;

/// Counters describing how the byte stream has been consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingStats {
    /// Frames emitted
    pub frames: u64,
    /// Windows with both markers whose checksum disagreed
    pub checksum_failures: u64,
    /// Start markers whose window did not end with the end marker
    pub marker_misses: u64,
    /// Bytes skipped while searching for a frame boundary
    pub bytes_discarded: u64,
    /// All bytes removed from the buffer, frames included
    pub bytes_consumed: u64,
}

/// Stateful scanner turning an unbounded byte stream into frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    // Everything before `cursor` has been consumed
    cursor: usize,
    stats: FramingStats,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(COMPACT_THRESHOLD),
            cursor: 0,
            stats: FramingStats::default(),
        }
    }

    /// Append freshly read bytes and iterate over every frame now complete.
    ///
    /// The returned iterator is lazy; frames left unread stay buffered and
    /// are produced by the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.extend(bytes);
        Frames { assembler: self }
    }

    /// Append bytes without scanning
    pub fn extend(&mut self, bytes: &[u8]) {
        self.compact();
        self.buffer.extend_from_slice(bytes);
    }

    /// Scan the buffered bytes for the next valid frame
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            let pending = &self.buffer[self.cursor..];

            let Some(offset) = find_start_marker(pending) else {
                // The last byte may be the first half of a marker
                let keep = pending.len().min(1);
                self.discard(pending.len() - keep);
                return None;
            };
            self.discard(offset);

            if self.buffered() < FRAME_SIZE {
                return None;
            }

            let window = &self.buffer[self.cursor..self.cursor + FRAME_SIZE];
            if has_frame_markers(window) {
                if let Some(frame) = RawFrame::parse(window) {
                    self.cursor += FRAME_SIZE;
                    self.stats.frames += 1;
                    self.stats.bytes_consumed += FRAME_SIZE as u64;
                    return Some(frame);
                }
                self.stats.checksum_failures += 1;
                warn!(
                    "Checksum mismatch ({} so far), resynchronising",
                    self.stats.checksum_failures
                );
            } else {
                self.stats.marker_misses += 1;
                debug!("Start marker without matching end marker, resynchronising");
            }

            self.discard(1);
        }
    }

    /// Bytes held but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn stats(&self) -> FramingStats {
        self.stats
    }

    fn discard(&mut self, count: usize) {
        self.cursor += count;
        self.stats.bytes_discarded += count as u64;
        self.stats.bytes_consumed += count as u64;
    }

    fn compact(&mut self) {
        if self.cursor == self.buffer.len() {
            self.buffer.clear();
            self.cursor = 0;
        } else if self.cursor >= COMPACT_THRESHOLD {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

/// Lazy iterator over the frames currently available in a [`FrameAssembler`]
pub struct Frames<'a> {
    assembler: &'a mut FrameAssembler,
}

impl Iterator for Frames<'_> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        self.assembler.next_frame()
    }
}

fn find_start_marker(bytes: &[u8]) -> Option<usize> {
    bytes.windows(FRAME_START_MARKER.len()).position(|w| w == FRAME_START_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PAYLOAD_SIZE;

    fn frame(seed: u8) -> RawFrame {
        let mut payload = [0u8; PAYLOAD_SIZE];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = seed.wrapping_mul(31).wrapping_add(i as u8);
        }
        RawFrame::from_payload(payload)
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut assembler = FrameAssembler::new();
        let mut stream = Vec::new();
        for seed in 0..5 {
            stream.extend_from_slice(&frame(seed).to_bytes());
        }

        let frames: Vec<_> = assembler.feed(&stream).collect();
        assert_eq!(frames, (0..5).map(frame).collect::<Vec<_>>());
        assert_eq!(assembler.buffered(), 0);
        assert_eq!(assembler.stats().bytes_discarded, 0);
    }

    #[test]
    fn test_byte_at_a_time_feed() {
        let mut assembler = FrameAssembler::new();
        let bytes = frame(3).to_bytes();
        let mut emitted = Vec::new();

        for b in bytes {
            emitted.extend(assembler.feed(&[b]));
        }

        assert_eq!(emitted, vec![frame(3)]);
    }

    #[test]
    fn test_marker_split_across_reads() {
        let mut assembler = FrameAssembler::new();
        let bytes = frame(9).to_bytes();
        let mut first = vec![0x11, 0x22, 0x33];
        first.push(bytes[0]);

        assert_eq!(assembler.feed(&first).count(), 0);
        // Only the trailing 0xAB survives the scan
        assert_eq!(assembler.buffered(), 1);

        let frames: Vec<_> = assembler.feed(&bytes[1..]).collect();
        assert_eq!(frames, vec![frame(9)]);
    }

    #[test]
    fn test_checksum_failure_advances_one_byte() {
        let mut assembler = FrameAssembler::new();
        let mut corrupt = frame(1).to_bytes();
        corrupt[20] ^= 0xFF;
        let mut stream = corrupt.to_vec();
        stream.extend_from_slice(&frame(2).to_bytes());

        let frames: Vec<_> = assembler.feed(&stream).collect();
        assert_eq!(frames, vec![frame(2)]);
        assert_eq!(assembler.stats().checksum_failures, 1);
        assert_eq!(assembler.stats().bytes_discarded, 37);
    }

    #[test]
    fn test_truncated_frame_followed_by_valid_frame() {
        let mut assembler = FrameAssembler::new();
        let truncated = &frame(4).to_bytes()[..20];
        let mut stream = truncated.to_vec();
        stream.extend_from_slice(&frame(5).to_bytes());

        let frames: Vec<_> = assembler.feed(&stream).collect();
        assert_eq!(frames, vec![frame(5)]);
        assert!(assembler.stats().marker_misses >= 1);
    }

    #[test]
    fn test_incomplete_frame_waits_for_more_bytes() {
        let mut assembler = FrameAssembler::new();
        let bytes = frame(6).to_bytes();

        assert_eq!(assembler.feed(&bytes[..30]).count(), 0);
        assert_eq!(assembler.buffered(), 30);
        assert_eq!(assembler.feed(&bytes[30..]).count(), 1);
    }

    #[test]
    fn test_lazy_iterator_is_restartable() {
        let mut assembler = FrameAssembler::new();
        let mut stream = frame(1).to_bytes().to_vec();
        stream.extend_from_slice(&frame(2).to_bytes());

        let first = assembler.feed(&stream).next();
        assert_eq!(first, Some(frame(1)));

        // The second frame is still buffered for the next call
        let rest: Vec<_> = assembler.feed(&[]).collect();
        assert_eq!(rest, vec![frame(2)]);
    }

    #[test]
    fn test_long_garbage_run_is_compacted() {
        let mut assembler = FrameAssembler::new();
        let garbage = vec![0x55u8; 3 * COMPACT_THRESHOLD];

        assert_eq!(assembler.feed(&garbage).count(), 0);
        assert_eq!(assembler.buffered(), 1);

        let frames: Vec<_> = assembler.feed(&frame(7).to_bytes()).collect();
        assert_eq!(frames, vec![frame(7)]);
        assert_eq!(assembler.buffered(), 0);
    }
}
