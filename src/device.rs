//! Device instances: identity, channels, channel groups, lifecycle state
//! and the configuration surface.
//!
//! A `DeviceInstance` is one attached instrument. Its channel list and
//! channel groups are fixed at discovery (only the per-channel enabled flag
//! may change afterwards); its capability table says which configuration
//! keys are legal where. Configuration mutation is gated on the lifecycle
//! state: `config_set` requires an open (Active) device.

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityModel, ConfigKey, ConfigValue, Scope};
use crate::error::{HalError, Result};
use crate::generators::{AnalogGenerator, LogicGenerator, LogicPattern, WaveformKind};
use crate::session::SessionClock;
use crate::transport::Transport;

/// Unique identifier for a device in a registry.
pub type DeviceId = String;

/// Lifecycle state of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Discovered but not opened.
    Inactive,
    /// Transient, used only while a scan probes the device.
    Initializing,
    /// Opened; eligible for configuration mutation and acquisition.
    Active,
}

/// Kind of a channel. Behavior that forks on kind matches exhaustively on
/// this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Digital channel carrying packed bits.
    Logic,
    /// Analog channel carrying real-valued samples.
    Analog,
}

/// One channel of a device. Immutable after creation except for `enabled`.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Stable index assigned at discovery.
    pub index: usize,
    /// Logic or Analog.
    pub kind: ChannelKind,
    /// Display name ("D0", "A3", …).
    pub name: String,
    /// Whether the channel participates in acquisition.
    pub enabled: bool,
}

/// Named, ordered, non-owning set of channels sharing a configuration
/// scope. A channel may belong to several groups.
#[derive(Clone, Debug)]
pub struct ChannelGroup {
    /// Group name; also the capability scope name.
    pub name: String,
    /// Member channel indices, in order.
    pub channels: Vec<usize>,
}

/// Acquisition termination conditions. At most one is authoritative:
/// setting one clears the other. Both zero means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionLimits {
    /// Stop after this many samples (0 = unset).
    pub samples: u64,
    /// Stop after this much acquisition time in microseconds (0 = unset).
    pub time_us: u64,
}

impl AcquisitionLimits {
    /// Set the sample-count limit, clearing the time limit.
    pub fn set_samples(&mut self, samples: u64) {
        self.time_us = 0;
        self.samples = samples;
    }

    /// Set the time limit, clearing the sample-count limit.
    pub fn set_time_us(&mut self, time_us: u64) {
        self.samples = 0;
        self.time_us = time_us;
    }

    /// Whether no termination condition is set.
    pub fn is_unbounded(&self) -> bool {
        self.samples == 0 && self.time_us == 0
    }
}

/// Private per-kind context of the pattern-generator instrument family:
/// tuning state plus the per-channel signal sources. Generators for analog
/// channels live in a dense array indexed by analog position; the logic
/// channels share one generator.
#[derive(Debug)]
pub struct PatternContext {
    pub(crate) sample_rate: u64,
    pub(crate) limits: AcquisitionLimits,
    pub(crate) averaging: bool,
    pub(crate) avg_samples: u64,
    pub(crate) num_logic_channels: usize,
    pub(crate) logic: Option<LogicGenerator>,
    pub(crate) analog: Vec<AnalogGenerator>,
}

impl PatternContext {
    /// Context for `num_logic` logic channels and `num_analog` analog
    /// channels, with waveforms assigned round-robin.
    pub fn new(num_logic: usize, num_analog: usize, sample_rate: u64) -> Self {
        let logic = (num_logic > 0).then(|| LogicGenerator::new(num_logic));
        let analog = (0..num_analog)
            .map(|i| AnalogGenerator::new(WaveformKind::ALL[i % WaveformKind::ALL.len()]))
            .collect();
        Self {
            sample_rate,
            limits: AcquisitionLimits::default(),
            averaging: false,
            avg_samples: 0,
            num_logic_channels: num_logic,
            logic,
            analog,
        }
    }

    /// Generator slot of an analog channel, by its device-wide index.
    pub(crate) fn analog_slot(&self, channel_index: usize) -> usize {
        channel_index - self.num_logic_channels
    }
}

/// One attached instrument.
#[derive(Debug)]
pub struct DeviceInstance {
    pub(crate) id: DeviceId,
    pub(crate) model: String,
    pub(crate) state: DeviceState,
    pub(crate) channels: Vec<Channel>,
    pub(crate) groups: Vec<ChannelGroup>,
    pub(crate) caps: CapabilityModel,
    pub(crate) ctx: PatternContext,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) session: Option<SessionClock>,
}

impl DeviceInstance {
    /// Assemble a device. Called by drivers at discovery.
    pub fn new(
        id: impl Into<DeviceId>,
        model: impl Into<String>,
        channels: Vec<Channel>,
        groups: Vec<ChannelGroup>,
        caps: CapabilityModel,
        ctx: PatternContext,
        transport: Option<Box<dyn Transport>>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            state: DeviceState::Inactive,
            channels,
            groups,
            caps,
            ctx,
            transport,
            session: None,
        }
    }

    /// Registry identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Model string reported at discovery.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Channel arena, indexed by `Channel::index`.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Channel groups declared at discovery.
    pub fn channel_groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    /// Group lookup by name.
    pub fn group(&self, name: &str) -> Option<&ChannelGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Capability table.
    pub fn capabilities(&self) -> &CapabilityModel {
        &self.caps
    }

    /// Enable or disable one channel.
    pub fn set_channel_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        let channel = self
            .channels
            .get_mut(index)
            .ok_or_else(|| HalError::InvalidArgument(format!("no channel with index {index}")))?;
        channel.enabled = enabled;
        Ok(())
    }

    /// Open the device: Inactive → Active. Opens the owned transport when
    /// one is attached.
    pub async fn open(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.as_mut() {
            transport.open().await?;
        }
        self.state = DeviceState::Active;
        tracing::info!(device = %self.id, "device opened");
        Ok(())
    }

    /// Close the device: Active → Inactive. Any running session is
    /// abandoned; acquisition requires an Active device.
    pub async fn close(&mut self) -> Result<()> {
        self.session = None;
        if let Some(transport) = self.transport.as_mut() {
            transport.close().await?;
        }
        self.state = DeviceState::Inactive;
        tracing::info!(device = %self.id, "device closed");
        Ok(())
    }

    /// Read a configuration value. Legal in any lifecycle state.
    pub fn config_get(&self, key: ConfigKey, scope: Scope<'_>) -> Result<ConfigValue> {
        let access = self
            .caps
            .access(key, scope)
            .ok_or(HalError::Unsupported(key))?;
        if !access.get {
            return Err(HalError::Unsupported(key));
        }

        match scope {
            Scope::Device => match key {
                ConfigKey::SampleRate => Ok(ConfigValue::UInt(self.ctx.sample_rate)),
                ConfigKey::LimitSamples => Ok(ConfigValue::UInt(self.ctx.limits.samples)),
                ConfigKey::LimitTime => Ok(ConfigValue::UInt(self.ctx.limits.time_us)),
                ConfigKey::Averaging => Ok(ConfigValue::Bool(self.ctx.averaging)),
                ConfigKey::AvgSamples => Ok(ConfigValue::UInt(self.ctx.avg_samples)),
                _ => Err(HalError::Unsupported(key)),
            },
            Scope::Group(name) => {
                let first = self.first_group_channel(name)?;
                match (key, first.kind) {
                    (ConfigKey::PatternMode, ChannelKind::Logic) => {
                        let gen = self.ctx.logic.as_ref().ok_or(HalError::Unsupported(key))?;
                        Ok(ConfigValue::Str(gen.pattern().name().to_string()))
                    }
                    (ConfigKey::PatternMode, ChannelKind::Analog) => {
                        let slot = self.ctx.analog_slot(first.index);
                        Ok(ConfigValue::Str(
                            self.ctx.analog[slot].pattern().name().to_string(),
                        ))
                    }
                    (ConfigKey::Amplitude, ChannelKind::Analog) => {
                        let slot = self.ctx.analog_slot(first.index);
                        Ok(ConfigValue::Float(self.ctx.analog[slot].amplitude()))
                    }
                    _ => Err(HalError::Unsupported(key)),
                }
            }
        }
    }

    /// Write a configuration value. Requires an open device; group-scoped
    /// writes are all-or-nothing across the group's members.
    pub fn config_set(&mut self, key: ConfigKey, scope: Scope<'_>, value: ConfigValue) -> Result<()> {
        if self.state != DeviceState::Active {
            return Err(HalError::DeviceClosed);
        }
        let access = self
            .caps
            .access(key, scope)
            .ok_or(HalError::Unsupported(key))?;
        if !access.set {
            return Err(HalError::Unsupported(key));
        }
        if let Some(domain) = self.caps.domain(key, scope) {
            if !domain.contains(&value) {
                return Err(HalError::InvalidArgument(format!(
                    "{value:?} is outside the domain of {key}"
                )));
            }
        }

        match scope {
            Scope::Device => self.set_device_key(key, value),
            Scope::Group(name) => {
                let group = self
                    .group(name)
                    .ok_or_else(|| HalError::InvalidArgument(format!("no group \"{name}\"")))?
                    .clone();
                self.set_group_key(key, &group, value)
            }
        }
    }

    /// Enumerate the legal values of a key.
    pub fn config_enumerate(&self, key: ConfigKey, scope: Scope<'_>) -> Result<Vec<ConfigValue>> {
        let access = self
            .caps
            .access(key, scope)
            .ok_or(HalError::Unsupported(key))?;
        if !access.list {
            return Err(HalError::Unsupported(key));
        }
        let domain = self
            .caps
            .domain(key, scope)
            .ok_or(HalError::Unsupported(key))?;
        Ok(domain.values())
    }

    fn set_device_key(&mut self, key: ConfigKey, value: ConfigValue) -> Result<()> {
        match key {
            ConfigKey::SampleRate => {
                self.ctx.sample_rate = expect_u64(key, &value)?;
            }
            ConfigKey::LimitSamples => {
                self.ctx.limits.set_samples(expect_u64(key, &value)?);
            }
            ConfigKey::LimitTime => {
                self.ctx.limits.set_time_us(expect_u64(key, &value)?);
            }
            ConfigKey::Averaging => {
                self.ctx.averaging = value
                    .as_bool()
                    .ok_or_else(|| bad_type(key, &value))?;
                tracing::debug!(
                    device = %self.id,
                    enabled = self.ctx.averaging,
                    "averaging toggled"
                );
            }
            ConfigKey::AvgSamples => {
                self.ctx.avg_samples = expect_u64(key, &value)?;
                tracing::debug!(
                    device = %self.id,
                    window = self.ctx.avg_samples,
                    "averaging window set"
                );
            }
            _ => return Err(HalError::Unsupported(key)),
        }
        Ok(())
    }

    /// Group-scoped writes validate every member before touching any
    /// generator: a kind-specific key on a group mixing kinds fails whole,
    /// leaving no half-applied state.
    fn set_group_key(&mut self, key: ConfigKey, group: &ChannelGroup, value: ConfigValue) -> Result<()> {
        match key {
            ConfigKey::PatternMode => {
                let name = value.as_str().ok_or_else(|| bad_type(key, &value))?;
                if let Ok(pattern) = LogicPattern::from_name(name) {
                    self.require_uniform_kind(group, ChannelKind::Logic, key)?;
                    let gen = self.ctx.logic.as_mut().ok_or(HalError::Unsupported(key))?;
                    tracing::debug!(device = %self.id, pattern = name, "logic pattern set");
                    gen.set_pattern(pattern);
                } else if let Ok(pattern) = WaveformKind::from_name(name) {
                    self.require_uniform_kind(group, ChannelKind::Analog, key)?;
                    for &index in &group.channels {
                        let slot = self.ctx.analog_slot(index);
                        tracing::debug!(
                            device = %self.id,
                            channel = %self.channels[index].name,
                            pattern = name,
                            "analog pattern set"
                        );
                        self.ctx.analog[slot].set_pattern(pattern);
                    }
                } else {
                    return Err(HalError::InvalidArgument(format!(
                        "unknown pattern \"{name}\""
                    )));
                }
            }
            ConfigKey::Amplitude => {
                let amplitude = value.as_f64().ok_or_else(|| bad_type(key, &value))?;
                self.require_uniform_kind(group, ChannelKind::Analog, key)?;
                for &index in &group.channels {
                    let slot = self.ctx.analog_slot(index);
                    self.ctx.analog[slot].set_amplitude(amplitude);
                }
            }
            _ => return Err(HalError::Unsupported(key)),
        }
        Ok(())
    }

    fn require_uniform_kind(
        &self,
        group: &ChannelGroup,
        kind: ChannelKind,
        key: ConfigKey,
    ) -> Result<()> {
        for &index in &group.channels {
            if self.channels[index].kind != kind {
                return Err(HalError::InvalidArgument(format!(
                    "{key} requires every channel in \"{}\" to be {kind:?}, but \"{}\" is {:?}",
                    group.name, self.channels[index].name, self.channels[index].kind
                )));
            }
        }
        Ok(())
    }

    fn first_group_channel(&self, name: &str) -> Result<&Channel> {
        let group = self
            .group(name)
            .ok_or_else(|| HalError::InvalidArgument(format!("no group \"{name}\"")))?;
        let index = *group
            .channels
            .first()
            .ok_or_else(|| HalError::InvalidArgument(format!("group \"{name}\" is empty")))?;
        Ok(&self.channels[index])
    }
}

fn expect_u64(key: ConfigKey, value: &ConfigValue) -> Result<u64> {
    value.as_u64().ok_or_else(|| bad_type(key, value))
}

fn bad_type(key: ConfigKey, value: &ConfigValue) -> HalError {
    HalError::InvalidArgument(format!("{value:?} has the wrong type for {key}"))
}
