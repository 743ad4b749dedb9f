//! Cooperative polling binding between the session engine and an async
//! runtime.
//!
//! The engine itself is synchronous and non-blocking; this module supplies
//! the one async-aware layer around it. An [`EventSource`] is anything
//! with a single re-entrant `dispatch(now_us)` step; the tick loop invokes
//! it on an interval from a single task and tears the binding down when
//! the source asks to stop. Multiple devices run independent bindings with
//! no shared state.

use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::device::DeviceInstance;
use crate::error::{HalError, Result};
use crate::session::{FrameSink, StepDirective};

/// One pollable step function. Implemented once per binding target.
pub trait EventSource {
    /// Perform one step at monotonic time `now_us` and say whether to keep
    /// polling. Must return promptly; a step never blocks.
    fn dispatch(&mut self, now_us: u64) -> Result<StepDirective>;
}

/// Monotonic time base shared by a scheduler and the sessions it drives.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    base: Instant,
}

impl MonotonicClock {
    /// Clock starting at zero now.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }

    /// Microseconds since the clock was created.
    pub fn now_us(&self) -> u64 {
        self.base.elapsed().as_micros() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds one device and one sink into an [`EventSource`]: each dispatch is
/// one pacing step of the device's session.
pub struct AcquisitionBinding<S: FrameSink> {
    device: DeviceInstance,
    sink: S,
}

impl<S: FrameSink> AcquisitionBinding<S> {
    /// Take ownership of a device and its sink for the duration of a run.
    pub fn new(device: DeviceInstance, sink: S) -> Self {
        Self { device, sink }
    }

    /// Start the device's acquisition session at `now_us`.
    pub fn start(&mut self, now_us: u64) -> Result<()> {
        self.device.start_acquisition(now_us, &mut self.sink)
    }

    /// Give the device and sink back after the run.
    pub fn into_parts(self) -> (DeviceInstance, S) {
        (self.device, self.sink)
    }
}

impl<S: FrameSink> EventSource for AcquisitionBinding<S> {
    fn dispatch(&mut self, now_us: u64) -> Result<StepDirective> {
        self.device.acquisition_step(now_us, &mut self.sink)
    }
}

/// Drive a source on `interval` ticks until it stops, then return it.
///
/// Runs on the current task; use [`spawn_source`] to run in the
/// background.
pub async fn run_source<S: EventSource>(
    mut source: S,
    clock: MonotonicClock,
    interval: Duration,
) -> Result<S> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if source.dispatch(clock.now_us())? == StepDirective::Stop {
            return Ok(source);
        }
    }
}

/// Handle to a source running in a background task.
pub struct ScheduledSource<S> {
    handle: JoinHandle<Result<S>>,
    shutdown_tx: oneshot::Sender<()>,
}

impl<S: EventSource + Send + 'static> ScheduledSource<S> {
    /// Ask the loop to stop at the next tick and wait for the source.
    pub async fn shutdown(self) -> Result<S> {
        // The task may already have finished on its own; either way the
        // join below observes the final state.
        let _ = self.shutdown_tx.send(());
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => Err(HalError::Io(std::io::Error::other(format!(
                "scheduler task failed: {join_err}"
            )))),
        }
    }
}

/// Spawn a tick loop for `source` on the tokio runtime. The loop ends when
/// the source stops or [`ScheduledSource::shutdown`] is called.
pub fn spawn_source<S: EventSource + Send + 'static>(
    mut source: S,
    clock: MonotonicClock,
    interval: Duration,
) -> ScheduledSource<S> {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if source.dispatch(clock.now_us())? == StepDirective::Stop {
                        break;
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("scheduler shutdown requested");
                    break;
                }
            }
        }
        Ok(source)
    });
    ScheduledSource {
        handle,
        shutdown_tx,
    }
}
