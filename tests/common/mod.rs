//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::collections::HashMap;

use labhal::session::{Frame, FramePayload, FrameSink, SessionHeader};
use labhal::{DeviceInstance, DeviceRegistry, ScanOptions, SimDriver};

/// Sink that records everything it is handed.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub began: u32,
    pub ended: u32,
    pub frames: u32,
    pub logic_samples: u64,
    pub analog_samples: HashMap<usize, u64>,
    pub analog_values: HashMap<usize, Vec<f64>>,
}

impl FrameSink for CollectSink {
    fn begin(&mut self, _header: &SessionHeader) -> labhal::Result<()> {
        self.began += 1;
        Ok(())
    }

    fn frame(&mut self, frame: &Frame<'_>) -> labhal::Result<()> {
        self.frames += 1;
        match &frame.payload {
            FramePayload::Logic { unit_size, data } => {
                assert_eq!(
                    data.len() as u64,
                    frame.samples * *unit_size as u64,
                    "logic payload length must match the sample count"
                );
                self.logic_samples += frame.samples;
            }
            FramePayload::Analog { channel, values } => {
                assert_eq!(values.len() as u64, frame.samples);
                *self.analog_samples.entry(*channel).or_default() += frame.samples;
                self.analog_values
                    .entry(*channel)
                    .or_default()
                    .extend_from_slice(values);
            }
        }
        Ok(())
    }

    fn end(&mut self) -> labhal::Result<()> {
        self.ended += 1;
        Ok(())
    }
}

/// Discover and open one simulated device with the given channel counts.
pub async fn sim_device(num_logic: usize, num_analog: usize) -> DeviceInstance {
    let mut registry = DeviceRegistry::new();
    registry
        .scan(
            &SimDriver,
            &ScanOptions {
                num_logic_channels: num_logic,
                num_analog_channels: num_analog,
            },
        )
        .await
        .expect("scan failed");
    let mut device = registry.take("sim0").expect("device missing after scan");
    device.open().await.expect("open failed");
    device
}
