//! Acquisition loop: transport bytes in, decoded samples into the hub

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::decoder::decode;
use crate::device::{DeviceTransport, ReadyTransport, is_timeout};
use crate::error::TransportError;
use crate::framing::{FrameAssembler, FramingStats};
use crate::hub::{HubMetrics, SampleHub, epoch_millis};

const READ_CHUNK: usize = 1024;

/// Pause after a read that returned nothing without timing out
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(5);

/// Counters returned when acquisition ends
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AcquisitionReport {
    pub frames: u64,
    pub checksum_failures: u64,
    pub bytes_read: u64,
    pub bytes_discarded: u64,
    pub duration_secs: f64,
}

impl AcquisitionReport {
    fn new(stats: FramingStats, bytes_read: u64, duration: Duration) -> Self {
        Self {
            frames: stats.frames,
            checksum_failures: stats.checksum_failures,
            bytes_read,
            bytes_discarded: stats.bytes_discarded,
            duration_secs: duration.as_secs_f64(),
        }
    }
}

/// Periodic throughput logging
struct ThroughputMonitor {
    last_report: Option<Instant>,
    last_frames: u64,
    last_dropped: u64,
    interval: Duration,
}

impl ThroughputMonitor {
    fn new(enabled: bool) -> Self {
        Self {
            last_report: enabled.then(Instant::now),
            last_frames: 0,
            last_dropped: 0,
            interval: Duration::from_secs(10),
        }
    }

    fn maybe_report(&mut self, stats: &FramingStats, hub: &HubMetrics) {
        let Some(ref mut last_report) = self.last_report else {
            return;
        };
        let elapsed = last_report.elapsed();
        if elapsed < self.interval {
            return;
        }

        let rate = (stats.frames - self.last_frames) as f64 / elapsed.as_secs_f64();
        info!(
            "Throughput:\t{:.1} frames/s, {} checksum failures, {} queued, {} dropped",
            rate, stats.checksum_failures, hub.current_size, hub.total_dropped
        );
        if hub.total_dropped > self.last_dropped {
            warn!(
                "Sink fell behind: {} samples evicted in the last {:.0}s",
                hub.total_dropped - self.last_dropped,
                elapsed.as_secs_f64()
            );
        }

        self.last_frames = stats.frames;
        self.last_dropped = hub.total_dropped;
        *last_report = Instant::now();
    }
}

/// Read the board until `quit` is set or the transport fails.
///
/// Every validated frame is decoded and pushed into `hub`; the hub never
/// blocks, so a stalled sink cannot slow this loop down.
pub fn run_acquisition<T: DeviceTransport>(
    ready: ReadyTransport<T>,
    hub: Arc<SampleHub>,
    quit: Arc<AtomicBool>,
    report_throughput: bool,
) -> Result<AcquisitionReport, TransportError> {
    let started = Instant::now();
    let (mut transport, preamble) = ready.into_parts();
    let mut assembler = FrameAssembler::new();
    let mut monitor = ThroughputMonitor::new(report_throughput);
    let mut bytes_read = preamble.len() as u64;

    for frame in assembler.feed(&preamble) {
        hub.push(decode(&frame));
    }

    info!("Acquisition started on {}", transport.name());
    let mut buf = [0u8; READ_CHUNK];

    while !quit.load(Ordering::SeqCst) {
        let n = match transport.read(&mut buf) {
            Ok(0) => {
                thread::sleep(EMPTY_READ_BACKOFF);
                continue;
            }
            Ok(n) => n,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                warn!("Transport {} failed: {}", transport.name(), e);
                return Err(TransportError::Io(e));
            }
        };
        bytes_read += n as u64;

        let received_ms = epoch_millis();
        for frame in assembler.feed(&buf[..n]) {
            hub.push_at(decode(&frame), received_ms);
        }

        monitor.maybe_report(&assembler.stats(), &hub.metrics());
    }

    let report = AcquisitionReport::new(assembler.stats(), bytes_read, started.elapsed());
    info!(
        "Acquisition stopped: {} frames, {} checksum failures",
        report.frames, report.checksum_failures
    );
    Ok(report)
}
