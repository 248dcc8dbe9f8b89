//! Bounded drop-oldest queue between acquisition and the active sink
//!
//! One producer (the acquisition loop) pushes decoded samples; sinks drain at
//! their own pace. When a sink falls behind, the oldest samples are evicted so
//! the acquisition path never waits on a consumer.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::decoder::DecodedSample;

/// Default number of samples held before eviction starts (2 s at 250 Hz)
pub const DEFAULT_CAPACITY: usize = 500;

/// A decoded sample together with its position in the acquisition stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedSample {
    /// Monotonic sequence number assigned at push time
    pub seq: u64,
    /// Wall-clock reception time in milliseconds since the Unix epoch
    pub received_ms: f64,
    pub sample: DecodedSample,
}

/// Snapshot of the hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubMetrics {
    pub total_pushed: u64,
    pub total_drained: u64,
    pub total_dropped: u64,
    pub current_size: usize,
    pub peak_size: usize,
    pub capacity: usize,
}

#[derive(Debug)]
struct HubState {
    queue: VecDeque<QueuedSample>,
    next_seq: u64,
    metrics: HubMetrics,
}

/// Thread-safe sample queue; share it behind an `Arc`
#[derive(Debug)]
pub struct SampleHub {
    state: Mutex<HubState>,
    ready: Condvar,
    capacity: usize,
}

impl SampleHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(HubState {
                queue: VecDeque::with_capacity(capacity),
                next_seq: 0,
                metrics: HubMetrics {
                    capacity,
                    ..HubMetrics::default()
                },
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a sample stamped with the current time; never blocks on consumers.
    ///
    /// Returns the sequence number assigned to the sample.
    pub fn push(&self, sample: DecodedSample) -> u64 {
        self.push_at(sample, epoch_millis())
    }

    /// Enqueue a sample with an explicit reception time
    pub fn push_at(&self, sample: DecodedSample, received_ms: f64) -> u64 {
        let mut state = self.state.lock();

        if state.queue.len() == self.capacity {
            state.queue.pop_front();
            state.metrics.total_dropped += 1;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push_back(QueuedSample {
            seq,
            received_ms,
            sample,
        });

        state.metrics.total_pushed += 1;
        state.metrics.peak_size = state.metrics.peak_size.max(state.queue.len());
        drop(state);

        self.ready.notify_one();
        seq
    }

    /// Take everything currently queued, oldest first
    pub fn drain(&self) -> Vec<QueuedSample> {
        let mut state = self.state.lock();
        Self::take_all(&mut state)
    }

    /// Like [`drain`](Self::drain), but waits up to `timeout` for data when empty
    pub fn drain_timeout(&self, timeout: Duration) -> Vec<QueuedSample> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        while state.queue.is_empty() {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        Self::take_all(&mut state)
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> HubMetrics {
        let state = self.state.lock();
        HubMetrics {
            current_size: state.queue.len(),
            ..state.metrics
        }
    }

    fn take_all(state: &mut HubState) -> Vec<QueuedSample> {
        let items: Vec<_> = state.queue.drain(..).collect();
        state.metrics.total_drained += items.len() as u64;
        items
    }
}

impl Default for SampleHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Milliseconds since the Unix epoch as a float
pub fn epoch_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}
