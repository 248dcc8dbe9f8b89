//! Cerelog Bridge - Connect a Cerelog ADS1299 EEG board to third-party EEG software
//!
//! This crate provides the device protocol, a resynchronising frame reader and
//! three downstream emulators, each shipped as its own command-line tool.
//!
//! # Overview
//!
//! The board streams 37-byte frames over a USB serial link once it has been
//! switched from 9600 to 115200 baud with a timestamped control packet. The
//! bridge finds the board, negotiates the speed, validates every frame and
//! hands decoded samples to exactly one sink:
//!
//! ```text
//! serial bytes -> negotiate -> FrameAssembler -> decode -> SampleHub -> sink -> consumer
//! ```
//!
//! # Command-Line Tools
//!
//! - [`cerelog-lsl`](../cerelog_lsl/index.html) - Publish the board as an LSL stream
//! - [`cerelog-dongle`](../cerelog_dongle/index.html) - Pose as a Cyton USB dongle on a pseudo-terminal (unix)
//! - [`cerelog-wifi`](../cerelog_wifi/index.html) - Pose as a Cyton WiFi Shield (HTTP control + TCP/JSON stream)
//! - [`cerelog-dummy-board`](../cerelog_dummy_board/index.html) - Synthetic board on a pseudo-terminal for testing (unix)
//!
//! # Quick Start
//!
//! ```bash
//! # Stream to LSL (auto-detects the CH340 serial adapter)
//! cerelog-lsl
//!
//! # Without hardware: start a synthetic board and point a bridge at it
//! cerelog-dummy-board --noise-rate 0.01
//! # -> prints e.g. /dev/pts/5
//! cerelog-wifi --port /dev/pts/5 --boot-wait 0
//! ```
//!
//! # Library Usage
//!
//! - [`protocol`] - Wire constants, [`RawFrame`](protocol::RawFrame) and the handshake packet
//! - [`framing`] - Frame reassembly with one-byte resynchronisation
//! - [`decoder`] - Channel extraction and microvolt conversion
//! - [`hub`] - Bounded drop-oldest queue between acquisition and sinks
//! - [`device`] - Serial transport, baud negotiation and board discovery
//! - [`acquisition`] - The read-frame-decode loop
//! - [`sinks`] - LSL outlet, virtual dongle and WiFi Shield emulators
//! - [`cli`] - Shared command-line argument groups
//! - [`commands`] - Interactive console and stop signals
//!
//! # License
//!
//! This project is licensed under the GNU General Public License v3.0.
//! See LICENSE.md for details.

pub mod acquisition;
pub mod cli;
pub mod commands;
pub mod decoder;
pub mod device;
pub mod error;
pub mod framing;
pub mod hub;
pub mod protocol;
#[cfg(unix)]
pub mod pty;
pub mod simulator;
pub mod sinks;

use chrono::Datelike;

/// Display GPL license notice for a program
pub fn display_license_notice(program_name: &str) {
	let version = env!("CARGO_PKG_VERSION");
	let current_year = chrono::Utc::now().year();
	let copyright_year = if current_year == 2025 {
		"2025".to_string()
	} else {
		format!("2025-{}", current_year)
	};

	println!("{} {} Copyright (C) {} Raul C. Sîmpetru", program_name, version, copyright_year);
	println!("This program comes with ABSOLUTELY NO WARRANTY.");
	println!("For details see https://www.gnu.org/licenses/gpl-3.0.html#license-text.");
	println!("This is free software, and you are welcome to redistribute it under certain conditions.");
	println!();
}
