//! Cerelog LSL - Publish a Cerelog EEG board as a Lab Streaming Layer stream
//!
//! Finds the board, switches it to 115200 baud and publishes every validated
//! sample as an 8-channel float32 vector in microvolts.
//!
//! # Usage
//!
//! ```bash
//! # Auto-detect the board and publish "Cerelog_EEG"
//! cerelog-lsl
//!
//! # Explicit port, custom stream identity, console control
//! cerelog-lsl --port /dev/ttyUSB0 --name Cerelog_Lab2 --source-id cerelog_lab2 -i
//! # Then use commands: STATUS, QUIT
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::debug;

use cerelog_bridge::acquisition::run_acquisition;
use cerelog_bridge::cli::{DeviceArgs, SessionArgs, to_config_json};
use cerelog_bridge::commands::spawn_session_controls;
use cerelog_bridge::device::{BoardMatcher, find_and_open_board};
use cerelog_bridge::sinks::outlet::{LslOutlet, OutletConfig, run_outlet};

#[derive(Parser)]
#[command(name = "cerelog-lsl")]
#[command(about = "Publish a Cerelog EEG board as an LSL stream")]
struct Args {
    #[command(flatten)]
    device: DeviceArgs,

    #[command(flatten)]
    session: SessionArgs,

    #[arg(long = "name", help = "Stream name", default_value = "Cerelog_EEG")]
    name: String,

    #[arg(long = "type", help = "Stream type", default_value = "EEG")]
    stream_type: String,

    #[arg(long = "source-id", help = "Source ID", default_value = "cerelog_uid_1234")]
    source_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let quiet = args.session.quiet;

    if !quiet {
        cerelog_bridge::display_license_notice("cerelog-lsl");
        tracing_subscriber::fmt::init();
    }

    let outlet_config = OutletConfig {
        name: args.name.clone(),
        stream_type: args.stream_type.clone(),
        source_id: args.source_id.clone(),
        ..OutletConfig::default()
    };
    debug!(
        "Configuration:\n{}",
        to_config_json("cerelog-lsl", &args.device, &args.session, &outlet_config)?
    );

    let handshake = args.device.handshake_config(5.0);
    let port = args.device.port.clone();
    let ready = tokio::task::spawn_blocking(move || {
        find_and_open_board(port.as_deref(), &BoardMatcher::default(), &handshake)
    })
    .await?
    .context("Could not connect to the board")?;

    let hub = Arc::new(args.session.hub());
    let quit = Arc::new(AtomicBool::new(false));

    if !quiet {
        println!("Cerelog LSL Bridge");
        println!("==================");
        println!("Board port:\t{}", ready.name());
        println!("Stream name:\t{}", outlet_config.name);
        println!("Stream type:\t{}", outlet_config.stream_type);
        println!("Source ID:\t{}", outlet_config.source_id);
        println!("Channels:\t{}", outlet_config.channels);
        println!("Sample rate:\t{} Hz", outlet_config.sample_rate);
        println!();
        println!("Press Ctrl+C to stop");
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

    // The outlet stays on the thread that created it
    let publisher = {
        let quit = quit.clone();
        tokio::task::spawn_blocking(move || -> Result<u64> {
            let mut outlet = LslOutlet::create(&outlet_config)?;
            Ok(run_outlet(&mut outlet, &hub, &quit)?)
        })
    };

    let published = publisher.await?;
    quit.store(true, Ordering::SeqCst);
    let report = acquisition.await?.context("Board connection lost")?;
    let published = published.context("LSL outlet failed")?;

    if !quiet {
        println!(
            "Done: {} frames received, {} published, {} checksum failures",
            report.frames, published, report.checksum_failures
        );
    }

    Ok(())
}
