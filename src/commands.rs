use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;
use tracing::info;

use crate::cli::SessionArgs;
use crate::hub::{HubMetrics, SampleHub};

/// One-line summary printed in reply to `STATUS`
pub fn format_status(metrics: &HubMetrics) -> String {
    format!(
        "STATUS queued={} peak={} capacity={} pushed={} delivered={} dropped={}",
        metrics.current_size,
        metrics.peak_size,
        metrics.capacity,
        metrics.total_pushed,
        metrics.total_drained,
        metrics.total_dropped
    )
}

/// Line-oriented console: `STATUS` prints hub counters, `QUIT` stops the bridge
pub fn handle_commands<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    hub: &SampleHub,
    quit: &AtomicBool,
) -> Result<()> {
    for line_res in input.lines() {
        match line_res {
            Ok(line) => {
                let cmd = line.trim();
                if cmd.eq_ignore_ascii_case("STATUS") {
                    writeln!(output, "{}", format_status(&hub.metrics()))?;
                } else if cmd.eq_ignore_ascii_case("QUIT") {
                    writeln!(output, "STATUS QUIT")?;
                    output.flush()?;
                    quit.store(true, Ordering::SeqCst);
                    break;
                } else if !cmd.is_empty() {
                    writeln!(output, "ERROR unknown command: {}", cmd)?;
                }
                output.flush()?;
            }
            Err(e) => {
                eprintln!("stdin read error: {}", e);
                break;
            }
        }
    }
    Ok(())
}

/// Wire up everything that can end a session: Ctrl+C, the optional duration
/// timer and, in interactive mode, the stdin console.
///
/// Must be called from within a tokio runtime.
pub fn spawn_session_controls(session: &SessionArgs, hub: Arc<SampleHub>, quit: Arc<AtomicBool>) {
    {
        let quit = quit.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, stopping");
                quit.store(true, Ordering::SeqCst);
            }
        });
    }

    if let Some(duration) = session.duration {
        if !session.quiet {
            println!("Bridge will stop after {} seconds", duration);
        }
        let quit = quit.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(duration));
            quit.store(true, Ordering::SeqCst);
        });
    }

    if session.interactive {
        // Not joined: a blocked stdin read must not hold up shutdown
        thread::spawn(move || {
            let stdin = io::stdin();
            if let Err(e) = handle_commands(stdin.lock(), io::stdout(), &hub, &quit) {
                eprintln!("Command handling error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedSample;
    use std::io::Cursor;

    #[test]
    fn test_status_then_quit() -> Result<()> {
        let hub = SampleHub::new(2);
        for i in 0..3 {
            hub.push(DecodedSample::new([i; 8]));
        }
        let quit = AtomicBool::new(false);
        let mut output = Vec::new();

        handle_commands(Cursor::new("status\n\nfoo\nQUIT\nSTATUS\n"), &mut output, &hub, &quit)?;
        let text = String::from_utf8(output)?;
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines,
            vec![
                "STATUS queued=2 peak=2 capacity=2 pushed=3 delivered=0 dropped=1",
                "ERROR unknown command: foo",
                "STATUS QUIT",
            ]
        );
        assert!(quit.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    fn test_end_of_input_leaves_session_running() -> Result<()> {
        let hub = SampleHub::default();
        let quit = AtomicBool::new(false);
        handle_commands(Cursor::new("STATUS\n"), Vec::new(), &hub, &quit)?;
        assert!(!quit.load(Ordering::SeqCst));
        Ok(())
    }
}
