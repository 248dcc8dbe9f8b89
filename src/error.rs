//! Error types for the bridge
//!
//! Framing problems never appear here: a checksum mismatch is recovered
//! inside [`FrameAssembler`](crate::framing::FrameAssembler) and only shows
//! up in its counters.

use std::io;

use thiserror::Error;

/// A serial transport could not be opened or stopped working
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Baud negotiation failed on one candidate transport
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("No framed data stream detected after baud switch")]
    NoStream,
}

impl From<io::Error> for HandshakeError {
    fn from(error: io::Error) -> Self {
        HandshakeError::Transport(TransportError::Io(error))
    }
}

/// Every candidate transport was tried without success
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Could not enumerate serial ports: {0}")]
    Enumeration(#[from] serialport::Error),

    #[error("No Cerelog board found ({tried} port(s) tried)")]
    NoBoardFound { tried: usize },
}

/// A sink lost its downstream peer or could not set up its endpoint
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Downstream connection error: {0}")]
    Connection(#[source] io::Error),

    #[error("Virtual terminal error: {0}")]
    Pty(#[source] io::Error),

    #[error("Outlet error: {0}")]
    Outlet(String),

    #[error("HTTP server error: {0}")]
    Http(#[source] io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;
