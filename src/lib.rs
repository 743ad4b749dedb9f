//! # labhal
//!
//! A hardware abstraction layer for test-and-measurement instruments
//! (multimeters, logic analyzers, pattern generators) attached over serial
//! or USB transports. It exposes a uniform device lifecycle, a
//! capability-negotiation surface, and a sample-streaming pipeline so that
//! physically distinct instruments can be driven through one API.
//!
//! ## Crate Structure
//!
//! - **`capability`**: which configuration keys exist per device, in which
//!   scope, with which operations and value domains. Pure data.
//! - **`device`**: `DeviceInstance` with identity, channels, channel
//!   groups, lifecycle state, and the `config_get`/`config_set`/
//!   `config_enumerate` surface.
//! - **`generators`**: per-channel signal sources, logic bit patterns and
//!   analog waveform tables with circular reads.
//! - **`session`**: the acquisition session engine. Converts elapsed time
//!   into an exact sample budget, paces all channels through bounded
//!   frames, applies limits and decimation. The heart of the crate.
//! - **`scheduler`**: the cooperative polling binding between the
//!   synchronous engine and the tokio runtime.
//! - **`registry`**: explicit device registry plus the `DeviceDriver`
//!   discovery seam and the built-in simulated instrument.
//! - **`transport`**: byte-stream seam to real hardware; serial transport
//!   behind the `transport_serial` feature.
//! - **`config`**: Figment-based application configuration.
//! - **`telemetry`**: tracing subscriber initialization.
//! - **`error`**: the `HalError` taxonomy.

pub mod capability;
pub mod config;
pub mod device;
pub mod error;
pub mod generators;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use capability::{CapAccess, Capability, CapabilityModel, ConfigKey, ConfigValue, Scope};
pub use device::{
    AcquisitionLimits, Channel, ChannelGroup, ChannelKind, DeviceId, DeviceInstance, DeviceState,
};
pub use error::{HalError, Result};
pub use registry::{DeviceDriver, DeviceRegistry, ScanOptions, SimDriver};
pub use scheduler::{AcquisitionBinding, EventSource, MonotonicClock};
pub use session::{Frame, FramePayload, FrameSink, SessionHeader, StepDirective};
