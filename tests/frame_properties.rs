use cerelog_bridge::framing::FrameAssembler;
use cerelog_bridge::protocol::{FRAME_SIZE, FRAME_START_MARKER, PAYLOAD_SIZE, RawFrame, checksum};
use proptest::prelude::*;

fn payload() -> impl Strategy<Value = [u8; PAYLOAD_SIZE]> {
    prop::array::uniform32(any::<u8>())
}

/// Arbitrary bytes that contain no start marker, even across a boundary
/// with a following frame
fn markerless_bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>().prop_filter("no 0xAB", |b| *b != FRAME_START_MARKER[0]), 0..max)
}

fn feed_in_chunks(assembler: &mut FrameAssembler, bytes: &[u8], chunk: usize) -> Vec<RawFrame> {
    bytes
        .chunks(chunk.max(1))
        .flat_map(|c| assembler.feed(c).collect::<Vec<_>>())
        .collect()
}

proptest! {
    #[test]
    fn prop_valid_frame_round_trips(payload in payload(), chunk in 1usize..64) {
        let frame = RawFrame::from_payload(payload);
        prop_assert_eq!(frame.checksum(), checksum(&payload));

        let mut assembler = FrameAssembler::new();
        let frames = feed_in_chunks(&mut assembler, &frame.to_bytes(), chunk);

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(frames[0].payload(), &payload);
    }

    #[test]
    fn prop_leading_garbage_costs_exactly_its_length(
        garbage in markerless_bytes(500),
        payload in payload(),
        chunk in 1usize..100,
    ) {
        let mut stream = garbage.clone();
        stream.extend_from_slice(&RawFrame::from_payload(payload).to_bytes());

        let mut assembler = FrameAssembler::new();
        let frames = feed_in_chunks(&mut assembler, &stream, chunk);
        let stats = assembler.stats();

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(frames[0].payload(), &payload);
        prop_assert_eq!(stats.bytes_consumed, (garbage.len() + FRAME_SIZE) as u64);
        prop_assert_eq!(stats.bytes_discarded, garbage.len() as u64);
        prop_assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn prop_spurious_marker_never_emits(
        before in markerless_bytes(40),
        after in markerless_bytes(40),
        payload in payload(),
        chunk in 1usize..50,
    ) {
        // A start marker in unframed data, followed by one genuine frame
        let mut stream = before;
        stream.extend_from_slice(&FRAME_START_MARKER);
        stream.extend_from_slice(&after);
        stream.extend_from_slice(&RawFrame::from_payload(payload).to_bytes());

        let mut assembler = FrameAssembler::new();
        let frames = feed_in_chunks(&mut assembler, &stream, chunk);

        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(frames[0].payload(), &payload);
    }

    #[test]
    fn prop_bad_checksum_is_never_emitted(payload in payload(), delta in 1u8..=255) {
        let mut bytes = RawFrame::from_payload(payload).to_bytes();
        bytes[FRAME_SIZE - 3] = bytes[FRAME_SIZE - 3].wrapping_add(delta);

        let mut assembler = FrameAssembler::new();
        prop_assert_eq!(assembler.feed(&bytes).count(), 0);
        prop_assert!(assembler.stats().checksum_failures >= 1);
    }
}
