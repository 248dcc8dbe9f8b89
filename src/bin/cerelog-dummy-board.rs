//! Cerelog Dummy Board - Synthetic Cerelog board on a pseudo-terminal
//!
//! Behaves like the real board on its serial link: stays silent until it
//! receives a valid baud-switch handshake, then streams 37-byte frames whose
//! channels carry sine waves at linearly spaced frequencies. Point any of the
//! bridges at the printed path with `--port`.
//!
//! # Usage
//!
//! ```bash
//! cerelog-dummy-board
//! # -> DUMMY BOARD AT: /dev/pts/5
//! cerelog-lsl --port /dev/pts/5 --boot-wait 0
//!
//! # Exercise resynchronisation with line noise and corrupted frames
//! cerelog-dummy-board --noise-rate 0.05 --corrupt-rate 0.01 -v
//! ```

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    dummy::main()
}

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("cerelog-dummy-board needs pseudo-terminal support and only runs on unix")
}

#[cfg(unix)]
mod dummy {
    use anyhow::{Context, Result};
    use clap::Parser;
    use std::thread;
    use std::time::{Duration, Instant};

    use cerelog_bridge::protocol::{FIRMWARE_BAUD_RATE_INDEX, PAYLOAD_SIZE};
    use cerelog_bridge::pty::VirtualPort;
    use cerelog_bridge::simulator::{HandshakeListener, SyntheticBoard, garbage, parse_freq_range};

    #[derive(Parser)]
    #[command(name = "cerelog-dummy-board")]
    #[command(about = "Emulate a Cerelog EEG board on a pseudo-terminal for testing")]
    struct Args {
        #[arg(long = "sample-rate", help = "Frames per second", default_value = "250")]
        sample_rate: f64,

        #[arg(
            long = "freq-range",
            help = "Frequency range for channels as 'min,max'",
            default_value = "1,10"
        )]
        freq_range: String,

        #[arg(long, help = "Peak amplitude in microvolts", default_value = "100")]
        amplitude: f64,

        #[arg(
            long = "noise-rate",
            help = "Probability of injecting random bytes before a frame",
            default_value = "0"
        )]
        noise_rate: f64,

        #[arg(
            long = "corrupt-rate",
            help = "Probability of sending a frame with a bad checksum",
            default_value = "0"
        )]
        corrupt_rate: f64,

        #[arg(short = 'v', long = "verbose", help = "Verbose output")]
        verbose: bool,
    }

    /// Block until the host sends a valid handshake
    fn wait_for_handshake(port: &VirtualPort, verbose: bool) -> Result<()> {
        let mut listener = HandshakeListener::new();
        let mut buf = [0u8; 256];

        loop {
            if !port.wait_readable(Duration::from_millis(100))? {
                continue;
            }
            let n = port.read(&mut buf)?;
            if let Some(packet) = listener.feed(&buf[..n]) {
                println!(
                    "Handshake received (host time {}, baud index 0x{:02X})",
                    packet.timestamp, packet.baud_index
                );
                if packet.baud_index != FIRMWARE_BAUD_RATE_INDEX {
                    println!("Warning: unexpected baud index, streaming anyway");
                }
                return Ok(());
            }
            if verbose {
                println!("Ignoring {} byte(s) before handshake", n);
            }
        }
    }

    pub fn main() -> Result<()> {
        let args = Args::parse();
        let freq_range = parse_freq_range(&args.freq_range)?;
        if args.sample_rate <= 0.0 {
            anyhow::bail!("Sample rate must be positive");
        }

        let port = VirtualPort::open().context("Failed to create pseudo-terminal")?;
        let mut board = SyntheticBoard::new(args.sample_rate, freq_range, args.amplitude);

        println!("Cerelog Dummy Board");
        println!("===================");
        println!("DUMMY BOARD AT:\t{}", port.path().display());
        println!("Sample rate:\t{} Hz", args.sample_rate);
        println!("Freq. range:\t{:.1} - {:.1} Hz", freq_range.0, freq_range.1);
        println!("Amplitude:\t{} uV", args.amplitude);
        println!("Noise rate:\t{}", args.noise_rate);
        println!("Corrupt rate:\t{}", args.corrupt_rate);
        if args.verbose {
            println!("Channel frequencies:");
            for (i, freq) in board.frequencies().iter().enumerate() {
                println!("\tChannel {}: {:.2} Hz", i + 1, freq);
            }
        }
        println!();
        println!("Waiting for handshake...");
        println!("Press Ctrl+C to stop");
        println!();

        wait_for_handshake(&port, args.verbose)?;

        let frame_interval = Duration::from_secs_f64(1.0 / args.sample_rate);
        let start_time = Instant::now();
        let mut next_frame = start_time;
        let mut listener = HandshakeListener::new();
        let mut buf = [0u8; 256];

        loop {
            // A restarted bridge negotiates again; restart the counter like a reset board
            if port.wait_readable(Duration::ZERO)? {
                let n = port.read(&mut buf)?;
                if listener.feed(&buf[..n]).is_some() {
                    println!("Handshake received again, restarting stream");
                    board = SyntheticBoard::new(args.sample_rate, freq_range, args.amplitude);
                }
            }

            if fastrand::f64() < args.noise_rate {
                port.write_all(&garbage(fastrand::usize(1..16)))?;
            }

            let mut bytes = board.next_frame().to_bytes();
            if fastrand::f64() < args.corrupt_rate {
                bytes[2 + fastrand::usize(..PAYLOAD_SIZE)] ^= 0x5A;
            }
            port.write_all(&bytes)?;

            let sent = board.counter();
            if args.verbose && sent % 1000 == 0 {
                let elapsed = start_time.elapsed().as_secs_f64();
                println!(
                    "Status: {} frames sent in {:.1}s (avg rate: {:.1} Hz)",
                    sent,
                    elapsed,
                    sent as f64 / elapsed
                );
            }

            next_frame += frame_interval;
            let now = Instant::now();
            if next_frame > now {
                thread::sleep(next_frame - now);
            }
        }
    }
}
