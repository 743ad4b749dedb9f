//! Transport seam for instruments attached over serial or USB.
//!
//! The core never talks to a wire itself: a device that has real hardware
//! behind it owns a boxed `Transport`, opened and closed with the device
//! lifecycle and used exclusively by that device while it is Active.
//! Protocol decoding on top of the byte stream belongs to the
//! device-specific driver, not here.

use async_trait::async_trait;

use crate::error::Result;

#[cfg(feature = "transport_serial")]
pub mod serial;

#[cfg(feature = "transport_serial")]
pub use serial::{SerialTransport, SerialTransportBuilder};

/// Byte-stream transport to one instrument.
#[async_trait]
pub trait Transport: Send + std::fmt::Debug {
    /// Open the underlying port or endpoint.
    async fn open(&mut self) -> Result<()>;

    /// Close it. Closing an unopened transport is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Discard buffered bytes in both directions.
    async fn flush(&mut self) -> Result<()>;

    /// Write a full command buffer.
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read until the delimiter byte (consumed, not returned).
    async fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>>;
}
