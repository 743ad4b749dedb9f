//! Capability model: which configuration keys a device supports, in which
//! scope, with which operations, and over which value domains.
//!
//! The model is pure data populated by a driver at discovery time. Lookups
//! never mutate and never touch hardware. A missing entry is an expected
//! negotiation outcome (callers probe keys to discover what a device can
//! do), so lookups return `Option` and only the public `config_*` surface
//! turns `None` into [`crate::HalError::Unsupported`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A tunable device property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigKey {
    /// Acquisition sample rate in Hz.
    SampleRate,
    /// Stop after this many samples (0 = unset).
    LimitSamples,
    /// Stop after this many microseconds (0 = unset).
    LimitTime,
    /// Waveform or bit-pattern selection, per channel kind.
    PatternMode,
    /// Peak amplitude of analog waveforms.
    Amplitude,
    /// Whether analog decimation (running average) is enabled.
    Averaging,
    /// Averaging window in samples (0 = average everything until stop).
    AvgSamples,
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigKey::SampleRate => "samplerate",
            ConfigKey::LimitSamples => "limit-samples",
            ConfigKey::LimitTime => "limit-time",
            ConfigKey::PatternMode => "pattern-mode",
            ConfigKey::Amplitude => "amplitude",
            ConfigKey::Averaging => "averaging",
            ConfigKey::AvgSamples => "avg-samples",
        };
        f.write_str(name)
    }
}

/// A configuration value as it crosses the public surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Unsigned integer (rates, limits, windows).
    UInt(u64),
    /// Floating point (amplitude).
    Float(f64),
    /// Boolean (averaging enable).
    Bool(bool),
    /// String enumeration (pattern mode).
    Str(String),
}

impl ConfigValue {
    /// Value as `u64`, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Value as `f64`; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Value as `bool`, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Value as string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Which operations a key supports in a given scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CapAccess {
    /// `config_get` is legal.
    pub get: bool,
    /// `config_set` is legal.
    pub set: bool,
    /// `config_enumerate` is legal.
    pub list: bool,
}

impl CapAccess {
    /// Get and set, no enumeration.
    pub const GET_SET: CapAccess = CapAccess {
        get: true,
        set: true,
        list: false,
    };

    /// Get, set and enumerate.
    pub const GET_SET_LIST: CapAccess = CapAccess {
        get: true,
        set: true,
        list: true,
    };
}

/// Legal value domain for an enumerable key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValueDomain {
    /// Discrete sample rates in Hz.
    Rates(Vec<u64>),
    /// String enumeration (pattern mode names).
    Names(Vec<String>),
}

impl ValueDomain {
    /// Domain as a list of configuration values, for `config_enumerate`.
    pub fn values(&self) -> Vec<ConfigValue> {
        match self {
            ValueDomain::Rates(rates) => rates.iter().map(|r| ConfigValue::UInt(*r)).collect(),
            ValueDomain::Names(names) => {
                names.iter().map(|n| ConfigValue::Str(n.clone())).collect()
            }
        }
    }

    /// Whether a value is a member of this domain.
    pub fn contains(&self, value: &ConfigValue) -> bool {
        match (self, value) {
            (ValueDomain::Rates(rates), ConfigValue::UInt(v)) => rates.contains(v),
            (ValueDomain::Names(names), ConfigValue::Str(v)) => names.iter().any(|n| n == v),
            _ => false,
        }
    }
}

/// Scope of a configuration operation: the whole device, or one named
/// channel group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Device-wide key.
    Device,
    /// Key applied to one channel group, by group name.
    Group(&'a str),
}

/// One capability entry: a key, its legal operations, and (for enumerable
/// keys) its value domain.
#[derive(Clone, Debug)]
pub struct Capability {
    /// The configuration key.
    pub key: ConfigKey,
    /// Supported operations.
    pub access: CapAccess,
    /// Legal values, when enumerable.
    pub domain: Option<ValueDomain>,
}

impl Capability {
    /// Entry without a value domain.
    pub fn new(key: ConfigKey, access: CapAccess) -> Self {
        Self {
            key,
            access,
            domain: None,
        }
    }

    /// Entry with an enumerable value domain.
    pub fn with_domain(key: ConfigKey, access: CapAccess, domain: ValueDomain) -> Self {
        Self {
            key,
            access,
            domain: Some(domain),
        }
    }
}

/// Per-device capability table, keyed by scope. Populated once at discovery
/// by the device's driver; pure lookup afterwards.
#[derive(Clone, Debug, Default)]
pub struct CapabilityModel {
    device: Vec<Capability>,
    groups: HashMap<String, Vec<Capability>>,
}

impl CapabilityModel {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device-scope capability.
    pub fn add_device(&mut self, cap: Capability) {
        self.device.push(cap);
    }

    /// Register a capability on a named channel group.
    pub fn add_group(&mut self, group: &str, cap: Capability) {
        self.groups.entry(group.to_string()).or_default().push(cap);
    }

    fn entry(&self, key: ConfigKey, scope: Scope<'_>) -> Option<&Capability> {
        let table = match scope {
            Scope::Device => &self.device,
            Scope::Group(name) => self.groups.get(name)?,
        };
        table.iter().find(|cap| cap.key == key)
    }

    /// Operations legal for `key` in `scope`. `None` means the key is
    /// unknown there, which is an expected outcome rather than an error.
    pub fn access(&self, key: ConfigKey, scope: Scope<'_>) -> Option<CapAccess> {
        self.entry(key, scope).map(|cap| cap.access)
    }

    /// Value domain of `key` in `scope`, when one was declared.
    pub fn domain(&self, key: ConfigKey, scope: Scope<'_>) -> Option<&ValueDomain> {
        self.entry(key, scope)?.domain.as_ref()
    }

    /// Keys declared at device scope.
    pub fn device_keys(&self) -> impl Iterator<Item = ConfigKey> + '_ {
        self.device.iter().map(|cap| cap.key)
    }

    /// Keys declared on a named group.
    pub fn group_keys<'a>(&'a self, group: &str) -> impl Iterator<Item = ConfigKey> + 'a {
        self.groups
            .get(group)
            .into_iter()
            .flat_map(|caps| caps.iter().map(|cap| cap.key))
    }
}
