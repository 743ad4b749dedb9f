//! Analog waveform generator, one per analog channel.
//!
//! Waveforms are precomputed into a finite table sized to hold an integer
//! number of periods at the configured sample rate, so a circular read
//! wraps with no phase discontinuity. Tables are regenerated on every
//! acquisition start, after the sample rate is final.

use std::f64::consts::PI;

use crate::error::{HalError, Result};

/// Capacity of a waveform table in samples, before trimming to a whole
/// number of periods.
pub const ANALOG_TABLE_SAMPLES: usize = 1024;

/// Samples per waveform period. Table lengths are trimmed downward until
/// evenly divisible by this, guaranteeing seamless wraparound.
pub const SAMPLES_PER_PERIOD: usize = 20;

/// Default peak amplitude assigned at discovery.
pub const DEFAULT_AMPLITUDE: f64 = 10.0;

/// Selectable analog waveforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveformKind {
    /// Square wave.
    Square,
    /// Sine wave.
    Sine,
    /// Triangle wave.
    Triangle,
    /// Sawtooth wave.
    Sawtooth,
}

impl WaveformKind {
    /// External names, in enumeration order.
    pub const NAMES: [&'static str; 4] = ["square", "sine", "triangle", "sawtooth"];

    /// All kinds, in round-robin assignment order.
    pub const ALL: [WaveformKind; 4] = [
        WaveformKind::Square,
        WaveformKind::Sine,
        WaveformKind::Triangle,
        WaveformKind::Sawtooth,
    ];

    /// External name of this waveform.
    pub fn name(self) -> &'static str {
        match self {
            WaveformKind::Square => "square",
            WaveformKind::Sine => "sine",
            WaveformKind::Triangle => "triangle",
            WaveformKind::Sawtooth => "sawtooth",
        }
    }

    /// Parse an external name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "square" => Ok(WaveformKind::Square),
            "sine" => Ok(WaveformKind::Sine),
            "triangle" => Ok(WaveformKind::Triangle),
            "sawtooth" => Ok(WaveformKind::Sawtooth),
            other => Err(HalError::InvalidArgument(format!(
                "unknown analog pattern \"{other}\""
            ))),
        }
    }
}

/// Decimation accumulator: a recency-weighted running mix, not an
/// arithmetic mean. Each folded sample halves the weight of everything
/// before it. The recurrence is part of the device's observable output and
/// is preserved exactly.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningAverage {
    value: f64,
    count: u64,
}

impl RunningAverage {
    /// Fold one sample into the mix.
    pub fn fold(&mut self, sample: f64) {
        self.value = (self.value + sample) / 2.0;
        self.count += 1;
    }

    /// Samples folded since the last emit.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Current mixed value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Emit: return the mixed value and reset the accumulator.
    pub fn take(&mut self) -> f64 {
        let value = self.value;
        *self = RunningAverage::default();
        value
    }
}

/// Per-channel analog generator state.
#[derive(Clone, Debug)]
pub struct AnalogGenerator {
    pattern: WaveformKind,
    amplitude: f64,
    table: Vec<f64>,
    avg: RunningAverage,
}

impl AnalogGenerator {
    /// Generator with the given waveform and the default amplitude. The
    /// table is empty until [`Self::regenerate`] runs at acquisition start.
    pub fn new(pattern: WaveformKind) -> Self {
        Self {
            pattern,
            amplitude: DEFAULT_AMPLITUDE,
            table: Vec::new(),
            avg: RunningAverage::default(),
        }
    }

    /// Selected waveform.
    pub fn pattern(&self) -> WaveformKind {
        self.pattern
    }

    /// Select a waveform. Takes effect at the next table regeneration.
    pub fn set_pattern(&mut self, pattern: WaveformKind) {
        self.pattern = pattern;
    }

    /// Peak amplitude.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Set the peak amplitude. Takes effect at the next table regeneration.
    pub fn set_amplitude(&mut self, amplitude: f64) {
        self.amplitude = amplitude;
    }

    /// Decimation accumulator.
    pub fn avg_mut(&mut self) -> &mut RunningAverage {
        &mut self.avg
    }

    /// Table length in samples. Zero until regenerated.
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Rebuild the waveform table for `sample_rate`. Called on acquisition
    /// start; also resets the decimation accumulator.
    pub fn regenerate(&mut self, sample_rate: u64) {
        self.avg = RunningAverage::default();
        self.table.clear();
        tracing::debug!(pattern = self.pattern.name(), "generating analog pattern");
        match self.pattern {
            WaveformKind::Square => {
                // The square table is built by a flip rule rather than from
                // the period formula: the level negates every 5 samples and
                // the table ends at the last full 10-sample period.
                let mut value = self.amplitude;
                let mut last_end = 0;
                for i in 0..ANALOG_TABLE_SAMPLES {
                    if i % 5 == 0 {
                        value = -value;
                    }
                    if i % 10 == 0 {
                        last_end = i;
                    }
                    self.table.push(value);
                }
                self.table.truncate(last_end);
            }
            WaveformKind::Sine | WaveformKind::Triangle | WaveformKind::Sawtooth => {
                let frequency = sample_rate as f64 / SAMPLES_PER_PERIOD as f64;
                let mut num_samples = ANALOG_TABLE_SAMPLES;
                while num_samples % SAMPLES_PER_PERIOD != 0 {
                    num_samples -= 1;
                }
                for i in 0..num_samples {
                    let t = i as f64 / sample_rate as f64;
                    let value = match self.pattern {
                        WaveformKind::Sine => {
                            self.amplitude * (2.0 * PI * frequency * t).sin()
                        }
                        WaveformKind::Triangle => {
                            (2.0 * self.amplitude / PI)
                                * (2.0 * PI * frequency * t).sin().asin()
                        }
                        WaveformKind::Sawtooth => {
                            2.0 * self.amplitude
                                * ((t * frequency) - (0.5 + t * frequency).floor())
                        }
                        WaveformKind::Square => unreachable!(),
                    };
                    self.table.push(value);
                }
            }
        }
    }

    /// Circular read of `out.len()` samples starting at absolute sample
    /// position `pos`. Wraps within a single request when the read runs
    /// past the table tail.
    pub fn read_into(&self, pos: u64, out: &mut [f64]) {
        let len = self.table.len();
        debug_assert!(len > 0, "read before table regeneration");
        let mut idx = (pos % len as u64) as usize;
        for slot in out.iter_mut() {
            *slot = self.table[idx];
            idx += 1;
            if idx == len {
                idx = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_names_round_trip() {
        for name in WaveformKind::NAMES {
            assert_eq!(WaveformKind::from_name(name).unwrap().name(), name);
        }
        assert!(WaveformKind::from_name("banner").is_err());
    }

    #[test]
    fn periodic_tables_hold_whole_periods() {
        for kind in [WaveformKind::Sine, WaveformKind::Triangle, WaveformKind::Sawtooth] {
            let mut gen = AnalogGenerator::new(kind);
            gen.regenerate(200_000);
            assert_eq!(gen.table_len() % SAMPLES_PER_PERIOD, 0);
            assert_eq!(gen.table_len(), 1020);
        }
    }

    #[test]
    fn square_follows_the_flip_rule() {
        let mut gen = AnalogGenerator::new(WaveformKind::Square);
        gen.set_amplitude(1.0);
        gen.regenerate(1_000);
        assert_eq!(gen.table_len(), 1020);
        let mut out = vec![0.0; 12];
        gen.read_into(0, &mut out);
        // Negated on sample 0, flips every 5 samples.
        assert_eq!(&out[..5], &[-1.0; 5]);
        assert_eq!(&out[5..10], &[1.0; 5]);
        assert_eq!(&out[10..12], &[-1.0; 2]);
    }

    #[test]
    fn circular_read_wraps_within_one_request() {
        let mut gen = AnalogGenerator::new(WaveformKind::Sawtooth);
        gen.regenerate(1_000);
        let len = gen.table_len() as u64;

        let mut wrapped = vec![0.0; 10];
        gen.read_into(len - 5, &mut wrapped);

        let mut tail = vec![0.0; 5];
        gen.read_into(len - 5, &mut tail);
        let mut head = vec![0.0; 5];
        gen.read_into(0, &mut head);

        assert_eq!(&wrapped[..5], &tail[..]);
        assert_eq!(&wrapped[5..], &head[..]);
    }

    #[test]
    fn sine_has_no_phase_discontinuity_at_the_seam() {
        let mut gen = AnalogGenerator::new(WaveformKind::Sine);
        gen.regenerate(200_000);
        let len = gen.table_len() as u64;

        // Derivative sign pattern across the wrap must match the pattern
        // one period earlier in the table.
        let mut across = vec![0.0; SAMPLES_PER_PERIOD + 1];
        gen.read_into(len - 10, &mut across);
        let mut reference = vec![0.0; SAMPLES_PER_PERIOD + 1];
        gen.read_into(len - 10 - SAMPLES_PER_PERIOD as u64, &mut reference);

        let signs = |w: &[f64]| -> Vec<bool> {
            w.windows(2).map(|p| p[1] >= p[0]).collect()
        };
        assert_eq!(signs(&across), signs(&reference));
    }

    #[test]
    fn running_mix_matches_the_literal_recurrence() {
        let mut avg = RunningAverage::default();
        for sample in [1.0, 2.0, 3.0, 4.0] {
            avg.fold(sample);
        }
        // v0 = 0; v_i = (v_{i-1} + s_i) / 2
        // -> 0.5, 1.25, 2.125, 3.0625
        assert_eq!(avg.count(), 4);
        assert_eq!(avg.value(), 3.0625);
        assert_eq!(avg.take(), 3.0625);
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.value(), 0.0);
    }
}
