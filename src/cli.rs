use std::time::Duration;

use clap::Args;
use serde::Serialize;
use serde_json::json;

use crate::device::HandshakeConfig;
use crate::hub::{DEFAULT_CAPACITY, SampleHub};

/// Which board to use and how to bring it up
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    #[arg(long, help = "Serial port of the board (skips auto-detection)")]
    pub port: Option<String>,

    #[arg(
        long,
        help = "Seconds to wait for the board to reset after opening the port (tool-specific default)"
    )]
    pub boot_wait: Option<f64>,

    #[arg(
        long,
        default_value = "2.0",
        help = "Seconds to wait for framed data after switching to 115200 baud"
    )]
    pub verify_timeout: f64,
}

impl DeviceArgs {
    pub fn handshake_config(&self, default_boot_wait: f64) -> HandshakeConfig {
        HandshakeConfig {
            boot_wait: Duration::from_secs_f64(self.boot_wait.unwrap_or(default_boot_wait).max(0.0)),
            verify_timeout: Duration::from_secs_f64(self.verify_timeout.max(0.0)),
            ..HandshakeConfig::default()
        }
    }
}

/// Queue sizing and session control shared by every bridge
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    #[arg(
        long,
        default_value_t = DEFAULT_CAPACITY,
        help = "Samples buffered for the sink before the oldest are dropped"
    )]
    pub queue_capacity: usize,

    #[arg(
        long,
        short = 'i',
        help = "Interactive mode - accept STATUS/QUIT commands via stdin"
    )]
    pub interactive: bool,

    #[arg(long, short = 'd', help = "Stop after this many seconds")]
    pub duration: Option<u64>,

    #[arg(long, short = 'q', help = "Minimal output mode")]
    pub quiet: bool,
}

impl SessionArgs {
    pub fn hub(&self) -> SampleHub {
        SampleHub::new(self.queue_capacity)
    }
}

/// Serialize the effective bridge configuration to a JSON string
pub fn to_config_json<S: Serialize>(
    tool: &str,
    device: &DeviceArgs,
    session: &SessionArgs,
    sink: &S,
) -> anyhow::Result<String> {
    let config_json = json!({
        "tool": tool,
        "port": device.port,
        "boot_wait": device.boot_wait,
        "verify_timeout": device.verify_timeout,
        "queue_capacity": session.queue_capacity,
        "interactive": session.interactive,
        "duration": session.duration,
        "quiet": session.quiet,
        "sink": serde_json::to_value(sink)?,
        "started_at": chrono::Utc::now().to_rfc3339(),
        "bridge_version": env!("CARGO_PKG_VERSION")
    });

    Ok(serde_json::to_string_pretty(&config_json)?)
}
