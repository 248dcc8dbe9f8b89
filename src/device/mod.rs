//! Device side of the bridge: serial transport, baud negotiation and board
//! discovery
//!
//! The board boots at 9600 baud. [`negotiate`] switches it to 115200 with a
//! single [`HandshakeControlPacket`](crate::protocol::HandshakeControlPacket)
//! and confirms framed data is flowing; [`find_and_open_board`] runs that
//! negotiation on each candidate port until one succeeds.

pub mod discovery;
pub mod handshake;
pub mod transport;

pub use discovery::{BoardMatcher, PortDescriptor, connect_first, find_and_open_board, list_ports};
pub use handshake::{HandshakeConfig, ReadyTransport, negotiate};
pub use transport::{DeviceTransport, SerialTransport, is_timeout};
