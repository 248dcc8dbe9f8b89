//! Cerelog device wire format
//!
//! The board speaks exactly two packet types on its serial link:
//!
//! - [`RawFrame`]: the 37-byte data packet streamed continuously once the
//!   board runs at its operating speed
//! - [`HandshakeControlPacket`]: the 12-byte packet the host sends once to
//!   switch the board from 9600 to 115200 baud
//!
//! ```text
//! RawFrame
//! ┌──────────┬─────────────────────────────────────────┬──────────┬──────────┐
//! │ AB CD    │ payload (32)                            │ checksum │ DC BA    │
//! │          │ header(5) │ status(3) │ 8 × channel(3)  │ Σ mod256 │          │
//! └──────────┴─────────────────────────────────────────┴──────────┴──────────┘
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

/// Baud rate the board boots at
pub const INITIAL_BAUD_RATE: u32 = 9600;

/// Baud rate the board streams at after the handshake
pub const FINAL_BAUD_RATE: u32 = 115_200;

/// Firmware index selecting [`FINAL_BAUD_RATE`] in the handshake payload
pub const FIRMWARE_BAUD_RATE_INDEX: u8 = 0x04;

/// Nominal sampling rate of the acquisition chip
pub const SAMPLING_RATE_HZ: f64 = 250.0;

pub const FRAME_START_MARKER: [u8; 2] = [0xAB, 0xCD];
pub const FRAME_END_MARKER: [u8; 2] = [0xDC, 0xBA];
pub const FRAME_SIZE: usize = 37;
pub const PAYLOAD_SIZE: usize = 32;

const PAYLOAD_OFFSET: usize = 2;
const CHECKSUM_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_SIZE;

/// Bytes of device counter/timestamp at the start of the payload
pub const SAMPLE_HEADER_SIZE: usize = 5;

/// ADS1299 block: 3 status bytes followed by 8 channels of 3 bytes
pub const NUM_CHANNELS: usize = 8;
pub const NUM_STATUS_BYTES: usize = 3;
pub const BYTES_PER_CHANNEL: usize = 3;
pub const ADS_BLOCK_SIZE: usize = NUM_STATUS_BYTES + NUM_CHANNELS * BYTES_PER_CHANNEL;

pub const HANDSHAKE_START_MARKER: [u8; 2] = [0xAA, 0xBB];
pub const HANDSHAKE_END_MARKER: [u8; 2] = [0xCC, 0xDD];
pub const HANDSHAKE_SIZE: usize = 12;

const HANDSHAKE_PAYLOAD_SIZE: usize = 7;
const HANDSHAKE_CHECKSUM_OFFSET: usize = 2 + HANDSHAKE_PAYLOAD_SIZE;
pub const HANDSHAKE_MSG_TYPE: u8 = 0x02;
pub const HANDSHAKE_CONFIG_TYPE: u8 = 0x01;

/// Sum of all bytes, modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// One marker-delimited, checksum-validated device packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    payload: [u8; PAYLOAD_SIZE],
    checksum: u8,
}

impl RawFrame {
    /// Build a well-formed frame around `payload`
    pub fn from_payload(payload: [u8; PAYLOAD_SIZE]) -> Self {
        Self {
            payload,
            checksum: checksum(&payload),
        }
    }

    /// Validate a candidate window taken from the byte stream.
    ///
    /// Returns `None` when the markers or the checksum disagree.
    pub fn parse(window: &[u8]) -> Option<Self> {
        if !has_frame_markers(window) {
            return None;
        }
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&window[PAYLOAD_OFFSET..CHECKSUM_OFFSET]);
        let received = window[CHECKSUM_OFFSET];

        (checksum(&payload) == received).then_some(Self {
            payload,
            checksum: received,
        })
    }

    pub fn payload(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.payload
    }

    /// Device counter/timestamp bytes, opaque to the bridge
    pub fn sample_header(&self) -> &[u8] {
        &self.payload[..SAMPLE_HEADER_SIZE]
    }

    /// The 27-byte ADS1299 region (status + channels)
    pub fn ads_block(&self) -> &[u8] {
        &self.payload[SAMPLE_HEADER_SIZE..]
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Serialize back to the 37-byte wire form
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[..PAYLOAD_OFFSET].copy_from_slice(&FRAME_START_MARKER);
        bytes[PAYLOAD_OFFSET..CHECKSUM_OFFSET].copy_from_slice(&self.payload);
        bytes[CHECKSUM_OFFSET] = self.checksum;
        bytes[CHECKSUM_OFFSET + 1..].copy_from_slice(&FRAME_END_MARKER);
        bytes
    }
}

/// True when the window starts and ends with the data frame markers
pub fn has_frame_markers(window: &[u8]) -> bool {
    window.len() == FRAME_SIZE
        && window.starts_with(&FRAME_START_MARKER)
        && window.ends_with(&FRAME_END_MARKER)
}

/// Host-to-board packet that switches the board to its operating speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeControlPacket {
    pub timestamp: u32,
    pub baud_index: u8,
}

impl HandshakeControlPacket {
    pub fn new(timestamp: u32, baud_index: u8) -> Self {
        Self {
            timestamp,
            baud_index,
        }
    }

    /// Packet carrying the current Unix time and the operating-speed index
    pub fn now() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        Self::new(timestamp, FIRMWARE_BAUD_RATE_INDEX)
    }

    /// Message type, timestamp, config type and baud index: the checksummed part
    fn checksum_payload(&self) -> [u8; HANDSHAKE_PAYLOAD_SIZE] {
        let ts = self.timestamp.to_be_bytes();
        [
            HANDSHAKE_MSG_TYPE,
            ts[0],
            ts[1],
            ts[2],
            ts[3],
            HANDSHAKE_CONFIG_TYPE,
            self.baud_index,
        ]
    }

    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let payload = self.checksum_payload();
        let mut out = [0u8; HANDSHAKE_SIZE];
        out[..2].copy_from_slice(&HANDSHAKE_START_MARKER);
        out[2..HANDSHAKE_CHECKSUM_OFFSET].copy_from_slice(&payload);
        out[HANDSHAKE_CHECKSUM_OFFSET] = checksum(&payload);
        out[HANDSHAKE_CHECKSUM_OFFSET + 1..].copy_from_slice(&HANDSHAKE_END_MARKER);
        out
    }

    /// Decode and verify a 12-byte handshake packet
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HANDSHAKE_SIZE
            || !bytes.starts_with(&HANDSHAKE_START_MARKER)
            || !bytes.ends_with(&HANDSHAKE_END_MARKER)
        {
            return None;
        }
        let payload = &bytes[2..HANDSHAKE_CHECKSUM_OFFSET];
        if payload[0] != HANDSHAKE_MSG_TYPE
            || payload[5] != HANDSHAKE_CONFIG_TYPE
            || checksum(payload) != bytes[HANDSHAKE_CHECKSUM_OFFSET]
        {
            return None;
        }
        let timestamp = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
        Some(Self::new(timestamp, payload[6]))
    }

    /// Find the first valid handshake packet anywhere in `bytes`
    pub fn scan(bytes: &[u8]) -> Option<Self> {
        bytes.windows(HANDSHAKE_SIZE).find_map(Self::parse)
    }
}
