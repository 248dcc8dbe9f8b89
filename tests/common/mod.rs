//! In-memory board used by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cerelog_bridge::device::DeviceTransport;
use cerelog_bridge::error::TransportError;
use cerelog_bridge::protocol::{FINAL_BAUD_RATE, RawFrame};
use cerelog_bridge::simulator::frame_for;

/// What the board does once its scripted reads run out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenDone {
    /// Set the shared quit flag and keep timing out
    Quit,
    /// Fail every further read
    Disconnect,
    /// Return zero bytes from every further read
    Idle,
}

/// Serial double that stays silent until switched to 115200 baud, then
/// delivers its script one read at a time
pub struct ScriptedBoard {
    pub baud: u32,
    pub written: Vec<u8>,
    reads: VecDeque<Vec<u8>>,
    when_done: WhenDone,
    quit: Arc<AtomicBool>,
    /// Reads served after the script ran out
    pub extra_reads: Arc<AtomicUsize>,
}

impl ScriptedBoard {
    pub fn new(reads: Vec<Vec<u8>>, when_done: WhenDone, quit: Arc<AtomicBool>) -> Self {
        Self {
            baud: 9600,
            written: Vec::new(),
            reads: reads.into(),
            when_done,
            quit,
            extra_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Split `bytes` into reads of `chunk` bytes
    pub fn chunked(bytes: &[u8], chunk: usize, when_done: WhenDone, quit: Arc<AtomicBool>) -> Self {
        Self::new(bytes.chunks(chunk).map(<[u8]>::to_vec).collect(), when_done, quit)
    }
}

impl Read for ScriptedBoard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.baud != FINAL_BAUD_RATE {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "silent at 9600"));
        }

        let Some(mut next) = self.reads.pop_front() else {
            self.extra_reads.fetch_add(1, Ordering::SeqCst);
            return match self.when_done {
                WhenDone::Quit => {
                    self.quit.store(true, Ordering::SeqCst);
                    Err(io::Error::new(io::ErrorKind::TimedOut, "script finished"))
                }
                WhenDone::Disconnect => Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
                WhenDone::Idle => Ok(0),
            };
        };

        let n = next.len().min(buf.len());
        buf[..n].copy_from_slice(&next[..n]);
        if n < next.len() {
            self.reads.push_front(next.split_off(n));
        }
        Ok(n)
    }
}

impl Write for ScriptedBoard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DeviceTransport for ScriptedBoard {
    fn name(&self) -> &str {
        "scripted"
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        self.baud = baud_rate;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Frame `i` of a test stream: every channel holds `i`
pub fn numbered_frame(i: u32) -> RawFrame {
    frame_for(i, &[i as i32; 8])
}

pub fn numbered_stream(count: u32) -> Vec<u8> {
    (0..count).flat_map(|i| numbered_frame(i).to_bytes()).collect()
}

pub fn quit_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}
