//! Serial transport over tokio-serial.
//!
//! Async RS-232/USB-serial byte stream for instruments on a serial port.
//! Construction never touches the port; `open` does.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{HalError, Result};
use crate::transport::Transport;

/// Builder for a [`SerialTransport`] with custom configuration.
///
/// Defaults: 1 second timeout, 8-N-1 framing as provided by the port.
pub struct SerialTransportBuilder {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialTransportBuilder {
    /// Builder for `port_name` (e.g. "/dev/ttyUSB0") at `baud_rate`.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_secs(1),
        }
    }

    /// Set the read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the transport. The port stays closed until `open`.
    pub fn build(self) -> SerialTransport {
        SerialTransport {
            port_name: self.port_name,
            baud_rate: self.baud_rate,
            timeout: self.timeout,
            stream: None,
        }
    }
}

/// Serial transport handle. Exclusively owned by one device while that
/// device is Active.
#[derive(Debug)]
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Transport for `port_name` at `baud_rate` with default settings.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        SerialTransportBuilder::new(port_name, baud_rate).build()
    }

    /// Whether the port is currently open.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> Result<&mut SerialStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| HalError::Transport(format!("{} is not open", self.port_name)))
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = tokio_serial::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(|e| HalError::Transport(format!("{}: {e}", self.port_name)))?;
        tracing::info!(port = %self.port_name, baud = self.baud_rate, "serial port opened");
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            tracing::info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let stream = self.stream_mut()?;
        stream.flush().await?;
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await?;
        Ok(())
    }

    async fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>> {
        let stream = self.stream_mut()?;
        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await?;
            if byte[0] == delimiter {
                return Ok(response);
            }
            response.push(byte[0]);
        }
    }
}
