//! Device registry: discovery, lookup and teardown.
//!
//! The registry is an explicit object passed by reference into discovery
//! and teardown; there is no process-wide driver list. Drivers implement
//! [`DeviceDriver`] and populate each discovered device's channel list,
//! channel groups and capability table; the registry only stores the
//! result. The built-in [`SimDriver`] discovers a simulated
//! pattern-generator instrument and is always available.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::capability::{CapAccess, Capability, CapabilityModel, ConfigKey, ValueDomain};
use crate::device::{
    Channel, ChannelGroup, ChannelKind, DeviceId, DeviceInstance, DeviceState, PatternContext,
};
use crate::generators::{LogicPattern, WaveformKind};

/// Sample rate assigned to simulated devices at discovery, in Hz.
pub const DEFAULT_SAMPLE_RATE: u64 = 200_000;

/// Discrete sample rates a simulated device advertises, in Hz.
pub const SAMPLE_RATES: [u64; 8] = [
    100,
    1_000,
    10_000,
    100_000,
    200_000,
    1_000_000,
    10_000_000,
    100_000_000,
];

/// Options a scan accepts.
#[derive(Clone, Copy, Debug)]
pub struct ScanOptions {
    /// Logic channels to create on each discovered device.
    pub num_logic_channels: usize,
    /// Analog channels to create on each discovered device.
    pub num_analog_channels: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            num_logic_channels: 8,
            num_analog_channels: 4,
        }
    }
}

/// A device family's discovery entry point. Real instrument families
/// (protocol decoders over serial or USB transports) implement this
/// outside the core; the simulated family lives in-tree.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Short driver name ("sim", …).
    fn name(&self) -> &'static str;

    /// Probe for attached instruments and return fully populated device
    /// instances, still Inactive.
    async fn scan(&self, options: &ScanOptions) -> Result<Vec<DeviceInstance>>;
}

/// Driver for the simulated pattern-generator instrument.
#[derive(Debug, Default)]
pub struct SimDriver;

impl SimDriver {
    fn capability_model(
        num_logic: usize,
        num_analog: usize,
        analog_names: &[String],
    ) -> CapabilityModel {
        let mut caps = CapabilityModel::new();
        caps.add_device(Capability::with_domain(
            ConfigKey::SampleRate,
            CapAccess::GET_SET_LIST,
            ValueDomain::Rates(SAMPLE_RATES.to_vec()),
        ));
        caps.add_device(Capability::new(ConfigKey::LimitSamples, CapAccess::GET_SET));
        caps.add_device(Capability::new(ConfigKey::LimitTime, CapAccess::GET_SET));
        caps.add_device(Capability::new(ConfigKey::Averaging, CapAccess::GET_SET));
        caps.add_device(Capability::new(ConfigKey::AvgSamples, CapAccess::GET_SET));

        if num_logic > 0 {
            caps.add_group(
                "Logic",
                Capability::with_domain(
                    ConfigKey::PatternMode,
                    CapAccess::GET_SET_LIST,
                    ValueDomain::Names(
                        LogicPattern::NAMES.iter().map(|n| n.to_string()).collect(),
                    ),
                ),
            );
        }
        if num_analog > 0 {
            // The all-channel analog group carries amplitude only; pattern
            // selection is per channel.
            caps.add_group("Analog", Capability::new(ConfigKey::Amplitude, CapAccess::GET_SET));
            for name in analog_names {
                caps.add_group(
                    name,
                    Capability::with_domain(
                        ConfigKey::PatternMode,
                        CapAccess::GET_SET_LIST,
                        ValueDomain::Names(
                            WaveformKind::NAMES.iter().map(|n| n.to_string()).collect(),
                        ),
                    ),
                );
                caps.add_group(name, Capability::new(ConfigKey::Amplitude, CapAccess::GET_SET));
            }
        }
        caps
    }
}

#[async_trait]
impl DeviceDriver for SimDriver {
    fn name(&self) -> &'static str {
        "sim"
    }

    async fn scan(&self, options: &ScanOptions) -> Result<Vec<DeviceInstance>> {
        let num_logic = options.num_logic_channels;
        let num_analog = options.num_analog_channels;

        let mut channels = Vec::with_capacity(num_logic + num_analog);
        let mut groups = Vec::new();

        if num_logic > 0 {
            // Logic channels, all in one channel group.
            for i in 0..num_logic {
                channels.push(Channel {
                    index: i,
                    kind: ChannelKind::Logic,
                    name: format!("D{i}"),
                    enabled: true,
                });
            }
            groups.push(ChannelGroup {
                name: "Logic".into(),
                channels: (0..num_logic).collect(),
            });
        }

        let mut analog_names = Vec::with_capacity(num_analog);
        if num_analog > 0 {
            for i in 0..num_analog {
                let index = num_logic + i;
                let name = format!("A{i}");
                channels.push(Channel {
                    index,
                    kind: ChannelKind::Analog,
                    name: name.clone(),
                    enabled: true,
                });
                // Every analog channel gets a single-channel group as well.
                groups.push(ChannelGroup {
                    name: name.clone(),
                    channels: vec![index],
                });
                analog_names.push(name);
            }
            groups.push(ChannelGroup {
                name: "Analog".into(),
                channels: (num_logic..num_logic + num_analog).collect(),
            });
        }

        let caps = Self::capability_model(num_logic, num_analog, &analog_names);
        let ctx = PatternContext::new(num_logic, num_analog, DEFAULT_SAMPLE_RATE);
        let device = DeviceInstance::new("sim0", "Simulated instrument", channels, groups, caps, ctx, None);
        tracing::info!(
            logic = num_logic,
            analog = num_analog,
            "simulated device discovered"
        );
        Ok(vec![device])
    }
}

/// All devices known to one application instance. Created at startup and
/// torn down at shutdown; nothing about it is global.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceInstance>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a driver's scan and adopt what it finds. Returns the ids of the
    /// newly registered devices.
    pub async fn scan(
        &mut self,
        driver: &dyn DeviceDriver,
        options: &ScanOptions,
    ) -> Result<Vec<DeviceId>> {
        let found = driver
            .scan(options)
            .await
            .with_context(|| format!("scan failed for driver \"{}\"", driver.name()))?;
        let mut ids = Vec::with_capacity(found.len());
        for mut device in found {
            device.state = DeviceState::Initializing;
            if self.get(device.id()).is_some() {
                return Err(anyhow!("duplicate device id \"{}\"", device.id()));
            }
            device.state = DeviceState::Inactive;
            ids.push(device.id().to_string());
            self.devices.push(device);
        }
        Ok(ids)
    }

    /// All registered devices.
    pub fn devices(&self) -> &[DeviceInstance] {
        &self.devices
    }

    /// Lookup by id.
    pub fn get(&self, id: &str) -> Option<&DeviceInstance> {
        self.devices.iter().find(|d| d.id() == id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut DeviceInstance> {
        self.devices.iter_mut().find(|d| d.id() == id)
    }

    /// Remove a device from the registry, e.g. to hand it to an
    /// acquisition binding. Re-register it with [`Self::insert`].
    pub fn take(&mut self, id: &str) -> Option<DeviceInstance> {
        let pos = self.devices.iter().position(|d| d.id() == id)?;
        Some(self.devices.remove(pos))
    }

    /// Put a device (back) into the registry.
    pub fn insert(&mut self, device: DeviceInstance) {
        self.devices.push(device);
    }

    /// Close every open device and drop all of them.
    pub async fn teardown(&mut self) -> Result<()> {
        for device in &mut self.devices {
            if device.state() == DeviceState::Active {
                device
                    .close()
                    .await
                    .with_context(|| format!("failed to close \"{}\"", device.id()))?;
            }
        }
        self.devices.clear();
        Ok(())
    }
}
