//! Cerelog WiFi - Present a Cerelog EEG board as an OpenBCI Cyton WiFi Shield
//!
//! Serves the Shield's HTTP control API and, once the GUI has posted a TCP
//! target and started the stream, pushes JSON sample chunks to it.
//!
//! # Usage
//!
//! ```bash
//! cerelog-wifi
//! # In the OpenBCI GUI: CYTON -> WIFI -> MANUAL, IP 127.0.0.1, port 3000
//!
//! cerelog-wifi --http-port 8080 --chunk-size 5
//! ```
//!
//! # HTTP API
//!
//! - `GET /board` - Board descriptor
//! - `GET /stream/start` / `GET /stream/stop` - Toggle streaming
//! - `POST /tcp` - `{"ip": "...", "port": N, "output": "json"}` sets the stream target

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::debug;

use cerelog_bridge::acquisition::run_acquisition;
use cerelog_bridge::cli::{DeviceArgs, SessionArgs, to_config_json};
use cerelog_bridge::commands::spawn_session_controls;
use cerelog_bridge::device::{BoardMatcher, find_and_open_board};
use cerelog_bridge::sinks::wifi::{ShieldConfig, run_shield};

#[derive(Parser)]
#[command(name = "cerelog-wifi")]
#[command(about = "Present a Cerelog EEG board as an OpenBCI Cyton WiFi Shield")]
struct Args {
    #[command(flatten)]
    device: DeviceArgs,

    #[command(flatten)]
    session: SessionArgs,

    #[arg(long, help = "Address the HTTP control API binds to", default_value = "0.0.0.0")]
    bind_address: IpAddr,

    #[arg(long, help = "HTTP control API port", default_value = "3000")]
    http_port: u16,

    #[arg(long, help = "Samples per JSON chunk", default_value = "10")]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let quiet = args.session.quiet;

    if !quiet {
        cerelog_bridge::display_license_notice("cerelog-wifi");
        tracing_subscriber::fmt::init();
    }

    if args.chunk_size == 0 {
        anyhow::bail!("--chunk-size must be at least 1");
    }
    let shield_config = ShieldConfig {
        bind: SocketAddr::new(args.bind_address, args.http_port),
        chunk_size: args.chunk_size,
        ..ShieldConfig::default()
    };
    debug!(
        "Configuration:\n{}",
        to_config_json("cerelog-wifi", &args.device, &args.session, &shield_config)?
    );

    let handshake = args.device.handshake_config(3.0);
    let port = args.device.port.clone();
    let ready = tokio::task::spawn_blocking(move || {
        find_and_open_board(port.as_deref(), &BoardMatcher::default(), &handshake)
    })
    .await?
    .context("Could not connect to the board")?;

    let hub = Arc::new(args.session.hub());
    let quit = Arc::new(AtomicBool::new(false));

    if !quiet {
        println!();
        println!(">>> WIFI SHIELD EMULATOR RUNNING ON PORT {} <<<", args.http_port);
        println!("Board port:\t{}", ready.name());
        println!("1. Open the standard OpenBCI GUI");
        println!("2. Select CYTON -> WIFI -> MANUAL");
        println!("3. Enter IP: 127.0.0.1");
        println!("4. Enter port: {}", args.http_port);
        println!("5. Click 'START SESSION'");
        println!();
    }

    spawn_session_controls(&args.session, hub.clone(), quit.clone());

    let acquisition = {
        let hub = hub.clone();
        let quit = quit.clone();
        tokio::task::spawn_blocking(move || {
            let result = run_acquisition(ready, hub, quit.clone(), !quiet);
            quit.store(true, Ordering::SeqCst);
            result
        })
    };

    let served = run_shield(hub, quit.clone(), shield_config).await;
    quit.store(true, Ordering::SeqCst);
    let report = acquisition.await?.context("Board connection lost")?;
    served.context("WiFi Shield emulator failed")?;

    if !quiet {
        println!(
            "Done: {} frames received, {} checksum failures",
            report.frames, report.checksum_failures
        );
    }

    Ok(())
}
