//! Demo front end: discovers the simulated instrument, applies the
//! requested configuration and streams one acquisition to stdout.
//!
//! This binary is a thin consumer of the library; everything interesting
//! happens behind [`labhal::DeviceRegistry`] and the acquisition engine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use labhal::config::HalConfig;
use labhal::scheduler::{run_source, AcquisitionBinding, MonotonicClock};
use labhal::session::{Frame, FramePayload, FrameSink, SessionHeader};
use labhal::telemetry::{self, OutputFormat};
use labhal::{ConfigKey, ConfigValue, DeviceRegistry, ScanOptions, Scope, SimDriver};

#[derive(Parser, Debug)]
#[command(name = "labhal", about = "Stream samples from a simulated instrument")]
struct Cli {
    /// Configuration file (defaults to labhal.toml in the working dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sample rate in Hz (must be one of the device's advertised rates).
    #[arg(long)]
    sample_rate: Option<u64>,

    /// Stop after this many samples.
    #[arg(long)]
    samples: Option<u64>,

    /// Stop after this many milliseconds of acquisition time.
    #[arg(long, conflicts_with = "samples")]
    time_ms: Option<u64>,

    /// Number of logic channels to create.
    #[arg(long)]
    logic: Option<usize>,

    /// Number of analog channels to create.
    #[arg(long)]
    analog: Option<usize>,

    /// Enable analog decimation (running average).
    #[arg(long)]
    average: bool,

    /// Averaging window in samples (0 = average everything until stop).
    #[arg(long, requires = "average")]
    avg_window: Option<u64>,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,
}

/// Sink that summarizes the stream on stdout.
#[derive(Debug, Default)]
struct StdoutSink {
    logic_frames: u64,
    logic_samples: u64,
    analog_frames: u64,
    analog_samples: u64,
}

impl FrameSink for StdoutSink {
    fn begin(&mut self, header: &SessionHeader) -> labhal::Result<()> {
        println!(
            "# session on {} at {} Hz ({})",
            header.device, header.sample_rate, header.started_at
        );
        Ok(())
    }

    fn frame(&mut self, frame: &Frame<'_>) -> labhal::Result<()> {
        match &frame.payload {
            FramePayload::Logic { unit_size, data } => {
                self.logic_frames += 1;
                self.logic_samples += frame.samples;
                println!(
                    "logic: {} samples ({} bytes/sample, first unit {:02x?})",
                    frame.samples,
                    unit_size,
                    &data[..*unit_size]
                );
            }
            FramePayload::Analog { channel, values } => {
                self.analog_frames += 1;
                self.analog_samples += frame.samples;
                println!(
                    "analog ch{}: {} samples (first {:.4})",
                    channel, frame.samples, values[0]
                );
            }
        }
        Ok(())
    }

    fn end(&mut self) -> labhal::Result<()> {
        println!("# session ended");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => HalConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => HalConfig::load()?,
    };
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Pretty
    };
    telemetry::init(&config.application.log_level, format)?;

    let options = ScanOptions {
        num_logic_channels: cli.logic.unwrap_or(config.scan.logic_channels),
        num_analog_channels: cli.analog.unwrap_or(config.scan.analog_channels),
    };

    let mut registry = DeviceRegistry::new();
    let ids = registry.scan(&SimDriver, &options).await?;
    let id = ids.first().context("scan found no devices")?;
    let mut device = registry.take(id).context("device vanished after scan")?;
    device.open().await?;

    let rate = cli.sample_rate.unwrap_or(config.acquisition.sample_rate_hz);
    if let Err(err) = device.config_set(ConfigKey::SampleRate, Scope::Device, ConfigValue::UInt(rate)) {
        let rates = device.config_enumerate(ConfigKey::SampleRate, Scope::Device)?;
        anyhow::bail!("cannot use {rate} Hz ({err}); supported rates: {rates:?}");
    }
    if let Some(samples) = cli.samples {
        device.config_set(ConfigKey::LimitSamples, Scope::Device, ConfigValue::UInt(samples))?;
    }
    if let Some(time_ms) = cli.time_ms {
        device.config_set(
            ConfigKey::LimitTime,
            Scope::Device,
            ConfigValue::UInt(time_ms * 1_000),
        )?;
    }
    if cli.average {
        device.config_set(ConfigKey::Averaging, Scope::Device, ConfigValue::Bool(true))?;
        device.config_set(
            ConfigKey::AvgSamples,
            Scope::Device,
            ConfigValue::UInt(cli.avg_window.unwrap_or(0)),
        )?;
    }
    if cli.samples.is_none() && cli.time_ms.is_none() {
        // Unbounded acquisition needs an external stop; keep the demo
        // bounded instead.
        device.config_set(
            ConfigKey::LimitTime,
            Scope::Device,
            ConfigValue::UInt(1_000_000),
        )?;
        tracing::info!("no limit given; defaulting to a one second run");
    }

    let clock = MonotonicClock::new();
    let mut binding = AcquisitionBinding::new(device, StdoutSink::default());
    binding.start(clock.now_us())?;
    let tick = Duration::from_millis(config.acquisition.tick_interval_ms);
    let binding = run_source(binding, clock, tick).await?;

    let (mut device, sink) = binding.into_parts();
    println!(
        "# totals: {} logic samples in {} frames, {} analog samples in {} frames",
        sink.logic_samples, sink.logic_frames, sink.analog_samples, sink.analog_frames
    );
    device.close().await?;
    Ok(())
}
