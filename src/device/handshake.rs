use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use super::transport::{DeviceTransport, is_timeout};
use crate::error::HandshakeError;
use crate::protocol::{FINAL_BAUD_RATE, FRAME_SIZE, FRAME_START_MARKER, HandshakeControlPacket};

/// Timing of the baud negotiation
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeConfig {
    /// Time the board needs to reboot after the port is opened
    pub boot_wait: Duration,
    /// Pause after sending the control packet, before switching speed
    pub command_delay: Duration,
    /// Pause after switching speed, before verification
    pub settle: Duration,
    /// Bytes read to look for a start marker
    pub verify_bytes: usize,
    /// Upper bound on the verification read
    pub verify_timeout: Duration,
    /// Read timeout used once streaming
    pub stream_read_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            boot_wait: Duration::from_secs(5),
            command_delay: Duration::from_millis(100),
            settle: Duration::from_millis(500),
            verify_bytes: FRAME_SIZE * 5,
            verify_timeout: Duration::from_secs(2),
            stream_read_timeout: Duration::from_millis(10),
        }
    }
}

impl HandshakeConfig {
    /// No waiting at all, for in-memory transports
    pub fn immediate() -> Self {
        Self {
            boot_wait: Duration::ZERO,
            command_delay: Duration::ZERO,
            settle: Duration::ZERO,
            verify_timeout: Duration::from_millis(50),
            ..Self::default()
        }
    }
}

/// A transport whose board has been switched to its operating speed and is
/// known to be streaming frames
pub struct ReadyTransport<T> {
    transport: T,
    preamble: Vec<u8>,
}

impl<T: DeviceTransport> ReadyTransport<T> {
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// Bytes read during verification; they belong at the head of the stream
    pub fn preamble(&self) -> &[u8] {
        &self.preamble
    }

    pub fn into_parts(self) -> (T, Vec<u8>) {
        (self.transport, self.preamble)
    }
}

/// Drive the board from 9600 to 115200 baud and confirm it is streaming.
///
/// Runs once per candidate; any failure means the caller should move on to
/// the next transport.
pub fn negotiate<T: DeviceTransport>(
    mut transport: T,
    config: &HandshakeConfig,
) -> Result<ReadyTransport<T>, HandshakeError> {
    info!(
        "Waiting {:.1}s for board reset on {}",
        config.boot_wait.as_secs_f64(),
        transport.name()
    );
    thread::sleep(config.boot_wait);
    transport.clear_input()?;

    let packet = HandshakeControlPacket::now();
    debug!("Sending handshake (timestamp {})", packet.timestamp);
    transport.write_all(&packet.encode())?;
    transport.flush()?;
    thread::sleep(config.command_delay);

    transport.set_baud_rate(FINAL_BAUD_RATE)?;
    info!("Switched {} to {} baud, verifying stream", transport.name(), FINAL_BAUD_RATE);
    thread::sleep(config.settle);
    transport.clear_input()?;

    let burst = read_burst(&mut transport, config.verify_bytes, config.verify_timeout)?;
    if !burst.windows(2).any(|w| w == FRAME_START_MARKER) {
        debug!("Verification read {} bytes without a start marker", burst.len());
        return Err(HandshakeError::NoStream);
    }

    transport.set_read_timeout(config.stream_read_timeout)?;
    info!("Board streaming on {}", transport.name());

    Ok(ReadyTransport {
        transport,
        preamble: burst,
    })
}

/// Read until `len` bytes arrived or `timeout` elapsed
fn read_burst<T: Read>(
    transport: &mut T,
    len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, HandshakeError> {
    let deadline = Instant::now() + timeout;
    let mut burst = Vec::with_capacity(len);
    let mut chunk = [0u8; 64];

    while burst.len() < len && Instant::now() < deadline {
        let want = chunk.len().min(len - burst.len());
        match transport.read(&mut chunk[..want]) {
            Ok(n) => burst.extend_from_slice(&chunk[..n]),
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(burst)
}
