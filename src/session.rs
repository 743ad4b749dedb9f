//! Acquisition session engine: the device-agnostic pacing core.
//!
//! The engine turns wall-clock elapsed time into an exact sample budget,
//! drives every enabled channel's signal source to produce exactly that
//! many samples, and hands them to the delivery sink in bounded frames.
//! All work happens inside scheduler-invoked steps; a step never blocks,
//! never spawns, and snapshots its inputs (sample rate, limits) at entry.
//!
//! ## Pacing arithmetic
//!
//! Owed time is converted to samples with *ceiling* division, so no owed
//! time is ever silently dropped; the time actually consumed is then
//! recomputed from the sample count with *floor* division and only that
//! amount is accounted. The asymmetric pairing keeps the sample count
//! exact under integer rounding: the engine can neither accumulate drift
//! nor get stuck emitting zero samples forever on a too-small time delta.
//!
//! ## Decimation
//!
//! With averaging enabled, analog samples fold into a per-channel running
//! mix `value = (value + sample) / 2` and a single-sample frame is emitted
//! each time the window fills. A window of zero folds everything and emits
//! once at stop. Partially-filled accumulators are flushed on stop.

use chrono::{DateTime, Utc};

use crate::device::{ChannelKind, DeviceInstance, DeviceState};
use crate::error::{HalError, Result};

/// Upper bound on one analog sub-batch, in samples.
pub const ANALOG_FRAME_SAMPLES: usize = 1024;

const USEC_PER_SEC: u128 = 1_000_000;

/// Time base of one acquisition run. Created at `start_acquisition`,
/// discarded at stop; owned exclusively by the engine.
#[derive(Clone, Copy, Debug)]
pub struct SessionClock {
    pub(crate) start_us: u64,
    pub(crate) spent_us: u64,
    pub(crate) sent_samples: u64,
}

impl SessionClock {
    /// Monotonic timestamp captured at acquisition start.
    pub fn start_us(&self) -> u64 {
        self.start_us
    }

    /// Microseconds of acquisition time accounted so far. Never ahead of
    /// real elapsed time by more than one sample period.
    pub fn accounted_us(&self) -> u64 {
        self.spent_us
    }

    /// Samples delivered (per channel group) so far.
    pub fn samples_sent(&self) -> u64 {
        self.sent_samples
    }
}

/// What the scheduler should do with this event source after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDirective {
    /// Keep invoking the step.
    Continue,
    /// The session is done; tear down the binding.
    Stop,
}

/// Metadata delivered to the sink when a session starts.
#[derive(Clone, Debug)]
pub struct SessionHeader {
    /// Registry id of the acquiring device.
    pub device: String,
    /// Sample rate the session runs at, in Hz.
    pub sample_rate: u64,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
}

/// Payload of one frame. Logic samples cover the whole logic group as
/// packed bits; analog samples belong to a single channel.
#[derive(Debug)]
pub enum FramePayload<'a> {
    /// Packed logic bits, `unit_size` bytes per sample.
    Logic {
        /// Bytes per sample.
        unit_size: usize,
        /// `samples * unit_size` packed bytes.
        data: &'a [u8],
    },
    /// Real-valued samples of one analog channel.
    Analog {
        /// Device-wide channel index.
        channel: usize,
        /// Sample values.
        values: &'a [f64],
    },
}

/// One bounded delivery unit. Transient: valid only for the duration of
/// the sink call, never retained by the engine.
#[derive(Debug)]
pub struct Frame<'a> {
    /// Number of samples in this frame.
    pub samples: u64,
    /// The samples themselves.
    pub payload: FramePayload<'a>,
}

/// Downstream consumer of frames. Implementations accept synchronously
/// and return quickly; the engine issues at most one outstanding frame at
/// a time and does not proceed until the sink returns.
pub trait FrameSink {
    /// A session is starting.
    fn begin(&mut self, _header: &SessionHeader) -> Result<()> {
        Ok(())
    }

    /// One frame of samples.
    fn frame(&mut self, frame: &Frame<'_>) -> Result<()>;

    /// The session ended; no more frames will follow.
    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

impl DeviceInstance {
    /// Whether an acquisition session is currently running.
    pub fn is_acquiring(&self) -> bool {
        self.session.is_some()
    }

    /// Time base of the running session, if any.
    pub fn session_clock(&self) -> Option<&SessionClock> {
        self.session.as_ref()
    }

    /// Start an acquisition session at monotonic time `now_us`.
    ///
    /// Requires an open device. Regenerates the analog waveform tables at
    /// the configured sample rate, restarts the deterministic logic
    /// patterns, announces the session to the sink and zeroes the clock.
    pub fn start_acquisition(&mut self, now_us: u64, sink: &mut dyn FrameSink) -> Result<()> {
        if self.state != DeviceState::Active {
            return Err(HalError::DeviceClosed);
        }
        if self.session.is_some() {
            return Err(HalError::InvalidArgument(
                "acquisition is already running".into(),
            ));
        }

        let sample_rate = self.ctx.sample_rate;
        for gen in &mut self.ctx.analog {
            gen.regenerate(sample_rate);
        }
        if let Some(logic) = self.ctx.logic.as_mut() {
            logic.reset();
        }

        sink.begin(&SessionHeader {
            device: self.id.clone(),
            sample_rate,
            started_at: Utc::now(),
        })?;

        self.session = Some(SessionClock {
            start_us: now_us,
            spent_us: 0,
            sent_samples: 0,
        });
        tracing::info!(device = %self.id, sample_rate, "acquisition started");
        Ok(())
    }

    /// Stop the running session: flush partially-averaged values, emit the
    /// end event and discard the clock. Stopping an idle session is a
    /// no-op.
    pub fn stop_acquisition(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        if self.session.take().is_none() {
            return Ok(());
        }
        tracing::debug!(device = %self.id, "stopping acquisition");
        self.flush_pending_averages(sink)?;
        sink.end()?;
        Ok(())
    }

    /// One pacing step at monotonic time `now_us`.
    ///
    /// Computes the sample budget owed since the last step, emits it in
    /// bounded sub-batches across the logic group and every enabled analog
    /// channel, advances the clock by the time actually covered, and stops
    /// the session once a limit is satisfied.
    pub fn acquisition_step(
        &mut self,
        now_us: u64,
        sink: &mut dyn FrameSink,
    ) -> Result<StepDirective> {
        // Snapshot every input at step entry; configuration changes take
        // effect at the next step, never mid-computation.
        let Some(clock) = self.session else {
            return Ok(StepDirective::Stop);
        };
        let sample_rate = self.ctx.sample_rate;
        let limits = self.ctx.limits;
        let averaging = self.ctx.averaging;
        let avg_samples = self.ctx.avg_samples;

        let logic_enabled = self.ctx.logic.is_some()
            && self
                .channels
                .iter()
                .any(|c| c.kind == ChannelKind::Logic && c.enabled);
        let analog_enabled: Vec<usize> = self
            .channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Analog && c.enabled)
            .map(|c| c.index)
            .collect();

        if sample_rate == 0 || (!logic_enabled && analog_enabled.is_empty()) {
            tracing::warn!(device = %self.id, "nothing to acquire; stopping");
            self.stop_acquisition(sink)?;
            return Ok(StepDirective::Stop);
        }

        // What time span should samples be sent for? Once past a time
        // limit, drain the remaining owed window instead of cutting off.
        let elapsed_us = now_us.saturating_sub(clock.start_us);
        let limit_us = limits.time_us;
        let window_us = if limit_us > 0 && limit_us < elapsed_us {
            limit_us.saturating_sub(clock.spent_us)
        } else {
            elapsed_us.saturating_sub(clock.spent_us)
        };

        // Samples outstanding since the last step, rounded up.
        let mut samples_todo = ceil_samples(window_us, sample_rate);
        if limits.samples > 0 {
            samples_todo = samples_todo.min(limits.samples.saturating_sub(clock.sent_samples));
        }
        // Time actually covered by that sample count, rounded down. This
        // is what gets accounted, never the estimated window.
        let covered_us = floor_us(samples_todo, sample_rate);

        let mut logic_done = if logic_enabled { 0 } else { samples_todo };
        let mut analog_done = if analog_enabled.is_empty() {
            samples_todo
        } else {
            0
        };
        let mut scratch = [0.0f64; ANALOG_FRAME_SAMPLES];

        while logic_done < samples_todo || analog_done < samples_todo {
            if logic_done < samples_todo {
                if let Some(gen) = self.ctx.logic.as_mut() {
                    let chunk = ((samples_todo - logic_done) as usize).min(gen.max_frame_samples());
                    let unit_size = gen.unit_size();
                    let data = gen.fill(chunk);
                    sink.frame(&Frame {
                        samples: chunk as u64,
                        payload: FramePayload::Logic { unit_size, data },
                    })?;
                    logic_done += chunk as u64;
                }
            }

            if analog_done < samples_todo {
                let chunk = ((samples_todo - analog_done) as usize).min(ANALOG_FRAME_SAMPLES);
                let pos = clock.sent_samples + analog_done;
                for &index in &analog_enabled {
                    let slot = self.ctx.analog_slot(index);
                    let gen = &mut self.ctx.analog[slot];
                    gen.read_into(pos, &mut scratch[..chunk]);
                    if averaging {
                        for &sample in &scratch[..chunk] {
                            let avg = gen.avg_mut();
                            avg.fold(sample);
                            // Window 0 means hold everything until stop.
                            if avg_samples > 0 && avg.count() >= avg_samples {
                                let value = avg.take();
                                sink.frame(&Frame {
                                    samples: 1,
                                    payload: FramePayload::Analog {
                                        channel: index,
                                        values: &[value],
                                    },
                                })?;
                            }
                        }
                    } else {
                        sink.frame(&Frame {
                            samples: chunk as u64,
                            payload: FramePayload::Analog {
                                channel: index,
                                values: &scratch[..chunk],
                            },
                        })?;
                    }
                }
                analog_done += chunk as u64;
            }
        }

        // Both pacing tracks must land exactly on the budget. Anything
        // else means corrupted counters; the session cannot continue.
        if logic_done != samples_todo || analog_done != samples_todo {
            self.session = None;
            return Err(HalError::SessionInvariant(format!(
                "sample count mismatch: logic {logic_done}, analog {analog_done}, owed {samples_todo}"
            )));
        }

        let clock = self
            .session
            .as_mut()
            .ok_or_else(|| HalError::SessionInvariant("clock vanished mid-step".into()))?;
        clock.sent_samples += samples_todo;
        clock.spent_us += covered_us;
        let sent = clock.sent_samples;
        let spent = clock.spent_us;

        if (limits.samples > 0 && sent >= limits.samples) || (limit_us > 0 && spent >= limit_us) {
            tracing::debug!(device = %self.id, sent, "requested sample count reached");
            self.stop_acquisition(sink)?;
            return Ok(StepDirective::Stop);
        }
        Ok(StepDirective::Continue)
    }

    fn flush_pending_averages(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        if !self.ctx.averaging {
            return Ok(());
        }
        let num_logic = self.ctx.num_logic_channels;
        for (slot, gen) in self.ctx.analog.iter_mut().enumerate() {
            let avg = gen.avg_mut();
            if avg.count() == 0 {
                continue;
            }
            let value = avg.take();
            sink.frame(&Frame {
                samples: 1,
                payload: FramePayload::Analog {
                    channel: num_logic + slot,
                    values: &[value],
                },
            })?;
        }
        Ok(())
    }
}

/// Samples owed for `window_us` at `rate` Hz, rounded up so no owed time
/// is dropped.
fn ceil_samples(window_us: u64, rate: u64) -> u64 {
    ((window_us as u128 * rate as u128 + USEC_PER_SEC - 1) / USEC_PER_SEC) as u64
}

/// Microseconds covered by `samples` at `rate` Hz, rounded down.
fn floor_us(samples: u64, rate: u64) -> u64 {
    (samples as u128 * USEC_PER_SEC / rate as u128) as u64
}
