//! Cerelog Dongle - Present a Cerelog EEG board as an OpenBCI Cyton USB dongle
//!
//! Creates a pseudo-terminal that software written for the Cyton (such as the
//! OpenBCI GUI or Processing sketches) can open as a serial port. The usual
//! single-byte commands are understood: `v` resets and returns the board
//! identity, `b` starts streaming, `s` stops it, and configuration bytes are
//! acknowledged with a comma.
//!
//! # Usage
//!
//! ```bash
//! cerelog-dongle
//! # -> VIRTUAL DONGLE ACTIVE AT: /dev/pts/4
//!
//! # Forward every sample instead of every second one
//! cerelog-dongle --downsample 1
//! ```

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    dongle::main()
}

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("cerelog-dongle needs pseudo-terminal support and only runs on unix")
}

#[cfg(unix)]
mod dongle {
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
    use cerelog_bridge::pty::VirtualPort;
    use cerelog_bridge::sinks::dongle::{DongleConfig, run_dongle};

    #[derive(Parser)]
    #[command(name = "cerelog-dongle")]
    #[command(about = "Present a Cerelog EEG board as an OpenBCI Cyton USB dongle")]
    struct Args {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        session: SessionArgs,

        #[arg(
            long,
            help = "Forward every Nth sample (250 Hz board / 2 = 125 Hz)",
            default_value = "2"
        )]
        downsample: u32,
    }

    #[tokio::main]
    pub async fn main() -> Result<()> {
        let args = Args::parse();
        let quiet = args.session.quiet;

        if !quiet {
            cerelog_bridge::display_license_notice("cerelog-dongle");
            tracing_subscriber::fmt::init();
        }

        if args.downsample == 0 {
            anyhow::bail!("--downsample must be at least 1");
        }
        let dongle_config = DongleConfig {
            downsample_ratio: args.downsample,
            ..DongleConfig::default()
        };
        debug!(
            "Configuration:\n{}",
            to_config_json("cerelog-dongle", &args.device, &args.session, &dongle_config)?
        );

        let handshake = args.device.handshake_config(3.0);
        let port = args.device.port.clone();
        let ready = tokio::task::spawn_blocking(move || {
            find_and_open_board(port.as_deref(), &BoardMatcher::default(), &handshake)
        })
        .await?
        .context("Could not connect to the board")?;

        let virtual_port = Arc::new(VirtualPort::open().context("Failed to create pseudo-terminal")?);

        // The path is the one thing the user must see, even in quiet mode
        println!();
        println!("{}", "=".repeat(60));
        println!("VIRTUAL DONGLE ACTIVE AT: {}", virtual_port.path().display());
        println!("{}", "=".repeat(60));
        println!("Open this path as the serial port in your Cyton software");
        println!("{}", "=".repeat(60));
        println!();

        let hub = Arc::new(args.session.hub());
        let quit = Arc::new(AtomicBool::new(false));
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

        let sink = {
            let quit = quit.clone();
            tokio::task::spawn_blocking(move || run_dongle(virtual_port, hub, quit, &dongle_config))
        };

        let served = sink.await?;
        quit.store(true, Ordering::SeqCst);
        let report = acquisition.await?.context("Board connection lost")?;
        served.context("Virtual dongle failed")?;

        if !quiet {
            println!(
                "Done: {} frames received, {} checksum failures",
                report.frames, report.checksum_failures
            );
        }

        Ok(())
    }
}
