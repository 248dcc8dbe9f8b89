//! LSL outlet publisher: one float32 microvolt sample per decoded frame

use std::sync::atomic::{AtomicBool, Ordering};

use lsl::{ChannelFormat, Pushable, StreamInfo, StreamOutlet};
use serde::Serialize;
use tracing::info;

use super::DRAIN_WAIT;
use crate::decoder::DecodedSample;
use crate::error::{SinkError, SinkResult};
use crate::hub::SampleHub;
use crate::protocol::{NUM_CHANNELS, SAMPLING_RATE_HZ};

#[derive(Debug, Clone, Serialize)]
pub struct OutletConfig {
    pub name: String,
    pub stream_type: String,
    pub source_id: String,
    pub channels: u32,
    pub sample_rate: f64,
    /// Seconds of data the outlet buffers for slow subscribers
    pub max_buffered: i32,
}

impl Default for OutletConfig {
    fn default() -> Self {
        Self {
            name: "Cerelog_EEG".to_string(),
            stream_type: "EEG".to_string(),
            source_id: "cerelog_uid_1234".to_string(),
            channels: NUM_CHANNELS as u32,
            sample_rate: SAMPLING_RATE_HZ,
            max_buffered: 360,
        }
    }
}

/// Anything that can publish one multichannel float sample
pub trait SamplePublisher {
    fn publish(&mut self, microvolts: &[f32; NUM_CHANNELS]) -> SinkResult<()>;
}

pub struct LslOutlet {
    outlet: StreamOutlet,
    sample: Vec<f32>,
}

impl LslOutlet {
    pub fn create(config: &OutletConfig) -> SinkResult<Self> {
        let info = StreamInfo::new(
            &config.name,
            &config.stream_type,
            config.channels,
            config.sample_rate,
            ChannelFormat::Float32,
            &config.source_id,
        )
        .map_err(|e| SinkError::Outlet(e.to_string()))?;

        let outlet = StreamOutlet::new(&info, 0, config.max_buffered)
            .map_err(|e| SinkError::Outlet(e.to_string()))?;

        info!(
            "LSL outlet '{}' ({}, {} channels @ {} Hz, source id {})",
            config.name, config.stream_type, config.channels, config.sample_rate, config.source_id
        );

        Ok(Self {
            outlet,
            sample: Vec::with_capacity(NUM_CHANNELS),
        })
    }
}

impl SamplePublisher for LslOutlet {
    fn publish(&mut self, microvolts: &[f32; NUM_CHANNELS]) -> SinkResult<()> {
        self.sample.clear();
        self.sample.extend_from_slice(microvolts);
        self.outlet
            .push_sample(&self.sample)
            .map_err(|e| SinkError::Outlet(e.to_string()))
    }
}

/// Convert and publish one sample
pub fn publish_sample<P: SamplePublisher>(publisher: &mut P, sample: &DecodedSample) -> SinkResult<()> {
    publisher.publish(&sample.microvolts())
}

/// Publish every sample that reaches the hub until `quit` is set.
///
/// Returns the number of samples published.
pub fn run_outlet<P: SamplePublisher>(
    publisher: &mut P,
    hub: &SampleHub,
    quit: &AtomicBool,
) -> SinkResult<u64> {
    let mut published: u64 = 0;

    while !quit.load(Ordering::SeqCst) {
        for queued in hub.drain_timeout(DRAIN_WAIT) {
            publish_sample(publisher, &queued.sample)?;
            published += 1;
        }
    }

    info!("Outlet stopped after {} samples", published);
    Ok(published)
}
