//! Custom error types for the hardware abstraction layer.
//!
//! This module defines the primary error type, `HalError`, used across the
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to classify the failure modes of device configuration and
//! acquisition.
//!
//! ## Error Hierarchy
//!
//! - **`DeviceClosed`**: the operation requires the device to be open
//!   (Active). Recoverable; the caller opens the device and retries.
//! - **`Unsupported`**: the configuration key is not recognized for the
//!   given scope. This is an expected negotiation outcome, not an
//!   exceptional condition; capability discovery works by probing keys.
//! - **`InvalidArgument`**: a value outside its declared domain, or a
//!   kind-specific key applied to a channel group mixing Logic and Analog
//!   channels. Surfaced without side effects.
//! - **`SessionInvariant`**: the pacing step finished with mismatched
//!   per-kind sample counts. Fatal for the session: the session is forced
//!   to Idle and the error propagates. Other devices are unaffected.
//! - **`Io` / `Config` / `Transport`**: ambient failures wrapped from the
//!   standard library, the configuration loader, and transport adapters.
//!
//! By using `#[from]`, `HalError` can be seamlessly created from underlying
//! error types, simplifying error handling with the `?` operator.

use thiserror::Error;

use crate::capability::ConfigKey;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, HalError>;

/// Failure modes of device configuration and acquisition.
#[derive(Error, Debug)]
pub enum HalError {
    #[error("device is closed; operation requires an open device")]
    DeviceClosed,

    #[error("configuration key {0} is not supported in this scope")]
    Unsupported(ConfigKey),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session invariant violated: {0}")]
    SessionInvariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

impl HalError {
    /// Whether the caller can expect to retry or renegotiate after this
    /// error. `SessionInvariant` is fatal for the affected session; ambient
    /// I/O and configuration failures require outside intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            HalError::DeviceClosed
            | HalError::Unsupported(_)
            | HalError::InvalidArgument(_) => true,
            HalError::SessionInvariant(_)
            | HalError::Io(_)
            | HalError::Config(_)
            | HalError::Transport(_) => false,
        }
    }
}
