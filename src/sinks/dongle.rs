//! Virtual Cyton dongle on a pseudo-terminal
//!
//! Third-party software opens the pseudo-terminal as if it were the USB
//! dongle of an 8-channel Cyton board. Single-byte commands arrive on the
//! same endpoint; samples leave as 33-byte Cyton packets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::DRAIN_WAIT;
use crate::decoder::DecodedSample;
use crate::error::{SinkError, SinkResult};
use crate::hub::SampleHub;
use crate::pty::VirtualPort;

/// Reply to `v`; the trailing `$$$` is the prompt readers wait for
pub const IDENTITY: &[u8] = b"OpenBCI V3 8-16 channel\r\nOn Board ADS1299 Device ID: 0x3E\r\n$$$";

/// Command bytes answered with [`ACK`] and otherwise ignored
pub const ACK_BYTES: &[u8] = b"xX12345678!@#$%^&*()qwertyuiop";
pub const ACK: &[u8] = b",";

pub const PACKET_START: u8 = 0xA0;
pub const PACKET_END: u8 = 0xC0;
pub const PACKET_SIZE: usize = 33;
const AUX_BYTES: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct DongleConfig {
    /// Emit every Nth sample
    pub downsample_ratio: u32,
    /// How long the command listener waits for input per poll
    pub command_poll: Duration,
}

impl Default for DongleConfig {
    fn default() -> Self {
        Self {
            downsample_ratio: 2,
            command_poll: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `v`: stop streaming and send the identity block
    Reset,
    /// `b`
    StartStreaming,
    /// `s`
    StopStreaming,
    /// Configuration bytes the reader expects a comma for
    Acknowledge,
    Ignored,
}

impl Command {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'v' => Command::Reset,
            b'b' => Command::StartStreaming,
            b's' => Command::StopStreaming,
            b if ACK_BYTES.contains(&b) => Command::Acknowledge,
            _ => Command::Ignored,
        }
    }
}

/// Builds Cyton packets with downsampling and a wrapping sample index
#[derive(Debug, Clone)]
pub struct CytonEncoder {
    ratio: u32,
    // Samples seen since streaming last started
    phase: u32,
    sample_index: u8,
}

impl CytonEncoder {
    pub fn new(ratio: u32) -> Self {
        Self {
            ratio: ratio.max(1),
            phase: 0,
            sample_index: 0,
        }
    }

    /// Restart the downsample phase; the sample index keeps counting
    pub fn restart(&mut self) {
        self.phase = 0;
    }

    /// Packet for this sample, or `None` when downsampling skips it
    pub fn encode(&mut self, sample: &DecodedSample) -> Option<[u8; PACKET_SIZE]> {
        self.phase = (self.phase + 1) % self.ratio;
        if self.phase != 0 {
            return None;
        }

        let packet = cyton_packet(self.sample_index, sample);
        self.sample_index = self.sample_index.wrapping_add(1);
        Some(packet)
    }
}

/// `A0 | index | 24 channel bytes | 6 aux zeros | C0`
pub fn cyton_packet(sample_index: u8, sample: &DecodedSample) -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = PACKET_START;
    packet[1] = sample_index;
    packet[2..26].copy_from_slice(&sample.channel_bytes());
    // Aux bytes stay zero
    packet[26 + AUX_BYTES] = PACKET_END;
    packet
}

#[derive(Debug)]
struct Session {
    streaming: bool,
    encoder: CytonEncoder,
}

/// Streaming flag and encoder, shared by the command listener and the writer
#[derive(Debug)]
pub struct DongleState {
    session: Mutex<Session>,
}

impl DongleState {
    pub fn new(config: &DongleConfig) -> Self {
        Self {
            session: Mutex::new(Session {
                streaming: false,
                encoder: CytonEncoder::new(config.downsample_ratio),
            }),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.session.lock().streaming
    }

    /// Apply one command byte and return the bytes to send back, if any
    pub fn handle(&self, byte: u8) -> Option<&'static [u8]> {
        let command = Command::from_byte(byte);
        let mut session = self.session.lock();

        match command {
            Command::Reset => {
                debug!("Reset (v), sending identity");
                session.streaming = false;
                Some(IDENTITY)
            }
            Command::StartStreaming => {
                debug!("Start streaming (b)");
                if !session.streaming {
                    session.encoder.restart();
                }
                session.streaming = true;
                None
            }
            Command::StopStreaming => {
                debug!("Stop streaming (s)");
                session.streaming = false;
                None
            }
            Command::Acknowledge => Some(ACK),
            Command::Ignored => None,
        }
    }

    /// Packet to emit for this sample; `None` while stopped or downsampled away
    pub fn encode(&self, sample: &DecodedSample) -> Option<[u8; PACKET_SIZE]> {
        let mut session = self.session.lock();
        if !session.streaming {
            return None;
        }
        session.encoder.encode(sample)
    }
}

/// Serve the virtual dongle until `quit` is set or the endpoint fails.
///
/// Commands are handled on a dedicated thread; packets are written from the
/// calling thread as samples arrive in the hub.
pub fn run_dongle(
    port: Arc<VirtualPort>,
    hub: Arc<SampleHub>,
    quit: Arc<AtomicBool>,
    config: &DongleConfig,
) -> SinkResult<()> {
    let state = Arc::new(DongleState::new(config));

    let listener = {
        let port = port.clone();
        let state = state.clone();
        let quit = quit.clone();
        let poll = config.command_poll;
        thread::spawn(move || {
            let result = listen_for_commands(&port, &state, &quit, poll);
            quit.store(true, Ordering::SeqCst);
            result
        })
    };

    info!("Virtual dongle ready at {}", port.path().display());
    let result = write_packets(&port, &hub, &state, &quit);

    // Either side failing ends the session
    quit.store(true, Ordering::SeqCst);
    let listened = listener
        .join()
        .unwrap_or_else(|_| Err(SinkError::Pty(std::io::Error::other("command listener panicked"))));

    result.and(listened)
}

fn listen_for_commands(
    port: &VirtualPort,
    state: &DongleState,
    quit: &AtomicBool,
    poll: Duration,
) -> SinkResult<()> {
    let mut buf = [0u8; 1024];

    while !quit.load(Ordering::SeqCst) {
        if !port.wait_readable(poll).map_err(SinkError::Pty)? {
            continue;
        }
        let n = port.read(&mut buf).map_err(SinkError::Pty)?;

        for &byte in &buf[..n] {
            if let Some(reply) = state.handle(byte) {
                if !port.write_within(reply, poll).map_err(SinkError::Pty)? {
                    warn!("Reader is not draining the virtual dongle, reply dropped");
                }
            }
        }
    }
    Ok(())
}

fn write_packets(
    port: &VirtualPort,
    hub: &SampleHub,
    state: &DongleState,
    quit: &AtomicBool,
) -> SinkResult<()> {
    let mut written: u64 = 0;
    let mut dropped: u64 = 0;
    let mut stalled = false;

    while !quit.load(Ordering::SeqCst) {
        for queued in hub.drain_timeout(DRAIN_WAIT) {
            if quit.load(Ordering::SeqCst) {
                break;
            }
            let Some(packet) = state.encode(&queued.sample) else {
                continue;
            };

            let sent = port.write_within(&packet, DRAIN_WAIT).map_err(|e| {
                warn!("Virtual dongle write failed: {}", e);
                SinkError::Pty(e)
            })?;

            if sent {
                written += 1;
                if stalled {
                    info!("Reader resumed, {} packets were dropped", dropped);
                    stalled = false;
                }
            } else {
                dropped += 1;
                if !stalled {
                    warn!("Reader stopped draining the virtual dongle, dropping packets");
                    stalled = true;
                }
            }
        }
    }

    info!(
        "Virtual dongle stopped after {} packets ({} dropped)",
        written, dropped
    );
    Ok(())
}
