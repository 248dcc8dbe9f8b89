//! Locating the board among the host's serial ports
//!
//! Enumeration goes through `serialport`; the choice of which ports to try
//! and in what order is a pure function over [`PortDescriptor`]s so it can be
//! exercised without hardware.

use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};
use tracing::{info, warn};

use super::handshake::{HandshakeConfig, ReadyTransport, negotiate};
use super::transport::{DeviceTransport, SerialTransport};
use crate::error::{DiscoveryError, HandshakeError};
use crate::protocol::INITIAL_BAUD_RATE;

/// What enumeration tells us about one port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    pub name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub description: Option<String>,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            description: None,
        }
    }

    pub fn usb(name: impl Into<String>, vid: u16, pid: u16, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            vid: Some(vid),
            pid: Some(pid),
            description: description.map(str::to_string),
        }
    }
}

impl From<&SerialPortInfo> for PortDescriptor {
    fn from(info: &SerialPortInfo) -> Self {
        match &info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name.clone(),
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                description: usb.product.clone().or_else(|| usb.manufacturer.clone()),
            },
            _ => Self::new(info.port_name.clone()),
        }
    }
}

/// Identifies the board's USB-serial bridge
#[derive(Debug, Clone, Serialize)]
pub struct BoardMatcher {
    pub vid: u16,
    pub pid: u16,
    /// Substrings looked for in the port description, case-insensitive
    pub descriptions: Vec<String>,
}

impl Default for BoardMatcher {
    fn default() -> Self {
        Self {
            vid: 0x1A86,
            pid: 0x7523,
            descriptions: vec!["USB-SERIAL CH340".to_string(), "CH340".to_string()],
        }
    }
}

impl BoardMatcher {
    pub fn matches(&self, port: &PortDescriptor) -> bool {
        if port.vid == Some(self.vid) && port.pid == Some(self.pid) {
            return true;
        }

        port.description.as_deref().is_some_and(|desc| {
            let desc = desc.to_lowercase();
            self.descriptions
                .iter()
                .any(|wanted| desc.contains(&wanted.to_lowercase()))
        })
    }

    /// Ports worth trying, in enumeration order.
    ///
    /// Falls back to every port when nothing matches.
    pub fn candidates(&self, ports: &[PortDescriptor]) -> Vec<String> {
        let matched: Vec<String> = ports
            .iter()
            .filter(|p| self.matches(p))
            .map(|p| p.name.clone())
            .collect();

        if matched.is_empty() {
            ports.iter().map(|p| p.name.clone()).collect()
        } else {
            matched
        }
    }
}

/// Enumerate the host's serial ports
pub fn list_ports() -> Result<Vec<PortDescriptor>, DiscoveryError> {
    let ports = serialport::available_ports()?;
    Ok(ports.iter().map(PortDescriptor::from).collect())
}

/// Open and negotiate each candidate in turn; the first that streams wins
pub fn connect_first<T, F>(
    candidates: &[String],
    mut open: F,
    config: &HandshakeConfig,
) -> Result<ReadyTransport<T>, DiscoveryError>
where
    T: DeviceTransport,
    F: FnMut(&str) -> Result<T, HandshakeError>,
{
    for name in candidates {
        info!("Trying {}", name);

        let transport = match open(name) {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Could not open {}: {}", name, e);
                continue;
            }
        };

        match negotiate(transport, config) {
            Ok(ready) => return Ok(ready),
            Err(e) => warn!("Handshake failed on {}: {}", name, e),
        }
    }

    Err(DiscoveryError::NoBoardFound {
        tried: candidates.len(),
    })
}

/// Find the board and hand back a streaming transport.
///
/// An explicit port name skips enumeration entirely.
pub fn find_and_open_board(
    explicit_port: Option<&str>,
    matcher: &BoardMatcher,
    config: &HandshakeConfig,
) -> Result<ReadyTransport<SerialTransport>, DiscoveryError> {
    let candidates = match explicit_port {
        Some(port) => vec![port.to_string()],
        None => {
            let ports = list_ports()?;
            info!("Found {} serial port(s)", ports.len());
            matcher.candidates(&ports)
        }
    };

    connect_first(
        &candidates,
        |name| {
            SerialTransport::open(name, INITIAL_BAUD_RATE, config.verify_timeout)
                .map_err(HandshakeError::from)
        },
        config,
    )
}
