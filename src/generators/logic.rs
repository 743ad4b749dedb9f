//! Bit-pattern generator shared by all logic channels of a device.
//!
//! Samples are packed little-endian: one "unit" of `ceil(channels / 8)`
//! bytes per sample, channel N in bit `N % 8` of byte `N / 8`. The
//! generator refills its fixed frame buffer on demand; the buffer is only
//! valid until the next `fill` call.

use rand::Rng;

use crate::error::{HalError, Result};

/// Size in bytes of the logic frame buffer, and therefore the upper bound
/// on one logic sub-batch (`LOGIC_BUF_SIZE / unit_size` samples).
pub const LOGIC_BUF_SIZE: usize = 4096;

/// Fixed banner template for the deterministic pattern: 5x7 column glyphs
/// spelling the project name, one byte per column, repeated every 64 steps.
const BANNER_TEMPLATE: [u8; 64] = [
    0x7f, 0x40, 0x40, 0x40, 0x40, 0x00, 0x00, 0x00, // L
    0x7e, 0x09, 0x09, 0x09, 0x7e, 0x00, 0x00, 0x00, // A
    0x7f, 0x49, 0x49, 0x49, 0x36, 0x00, 0x00, 0x00, // B
    0x7f, 0x08, 0x08, 0x08, 0x7f, 0x00, 0x00, 0x00, // H
    0x7e, 0x09, 0x09, 0x09, 0x7e, 0x00, 0x00, 0x00, // A
    0x7f, 0x40, 0x40, 0x40, 0x40, 0x00, 0x00, 0x00, // L
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x3a, 0x3a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Selectable logic patterns, shared across all logic channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicPattern {
    /// Deterministic banner template advanced by the step counter.
    Banner,
    /// Pseudo-random bytes on all channels; non-restartable.
    Random,
    /// Incrementing step counter repeated on every unit byte.
    Incremental,
    /// All channels low. Precomputed once when selected.
    AllLow,
    /// All channels high. Precomputed once when selected.
    AllHigh,
}

impl LogicPattern {
    /// External names, in enumeration order.
    pub const NAMES: [&'static str; 5] =
        ["banner", "random", "incremental", "all-low", "all-high"];

    /// External name of this pattern.
    pub fn name(self) -> &'static str {
        match self {
            LogicPattern::Banner => "banner",
            LogicPattern::Random => "random",
            LogicPattern::Incremental => "incremental",
            LogicPattern::AllLow => "all-low",
            LogicPattern::AllHigh => "all-high",
        }
    }

    /// Parse an external name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "banner" => Ok(LogicPattern::Banner),
            "random" => Ok(LogicPattern::Random),
            "incremental" => Ok(LogicPattern::Incremental),
            "all-low" => Ok(LogicPattern::AllLow),
            "all-high" => Ok(LogicPattern::AllHigh),
            other => Err(HalError::InvalidArgument(format!(
                "unknown logic pattern \"{other}\""
            ))),
        }
    }
}

/// Generator state for the logic channel group.
#[derive(Debug)]
pub struct LogicGenerator {
    pattern: LogicPattern,
    unit_size: usize,
    step: u64,
    data: Vec<u8>,
}

impl LogicGenerator {
    /// Generator for `num_channels` logic channels.
    pub fn new(num_channels: usize) -> Self {
        Self {
            pattern: LogicPattern::Banner,
            unit_size: num_channels.div_ceil(8),
            step: 0,
            data: vec![0; LOGIC_BUF_SIZE],
        }
    }

    /// Bytes per sample across all logic channels.
    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Currently selected pattern.
    pub fn pattern(&self) -> LogicPattern {
        self.pattern
    }

    /// Largest sub-batch the frame buffer can hold, in samples.
    pub fn max_frame_samples(&self) -> usize {
        LOGIC_BUF_SIZE / self.unit_size
    }

    /// Select a pattern. The constant patterns are precomputed here, once,
    /// so `fill` does no work for them.
    pub fn set_pattern(&mut self, pattern: LogicPattern) {
        self.pattern = pattern;
        match pattern {
            LogicPattern::AllLow => self.data.fill(0x00),
            LogicPattern::AllHigh => self.data.fill(0xff),
            _ => {}
        }
    }

    /// Restart the deterministic patterns at their first sample. Called on
    /// acquisition start; the random pattern is unaffected by design.
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Generate `samples` samples into the frame buffer and return the
    /// packed bytes. `samples` must not exceed [`Self::max_frame_samples`].
    pub fn fill(&mut self, samples: usize) -> &[u8] {
        debug_assert!(samples <= self.max_frame_samples());
        let nbytes = samples * self.unit_size;
        match self.pattern {
            LogicPattern::Banner => {
                for unit in self.data[..nbytes].chunks_exact_mut(self.unit_size) {
                    for (j, byte) in unit.iter_mut().enumerate() {
                        let idx = (self.step + j as u64) % BANNER_TEMPLATE.len() as u64;
                        *byte = BANNER_TEMPLATE[idx as usize];
                    }
                    self.step += 1;
                }
            }
            LogicPattern::Random => {
                let mut rng = rand::thread_rng();
                rng.fill(&mut self.data[..nbytes]);
            }
            LogicPattern::Incremental => {
                for unit in self.data[..nbytes].chunks_exact_mut(self.unit_size) {
                    unit.fill(self.step as u8);
                    self.step += 1;
                }
            }
            LogicPattern::AllLow | LogicPattern::AllHigh => {
                // Filled when the pattern was selected.
            }
        }
        &self.data[..nbytes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_names_round_trip() {
        for name in LogicPattern::NAMES {
            assert_eq!(LogicPattern::from_name(name).unwrap().name(), name);
        }
        assert!(LogicPattern::from_name("sine").is_err());
    }

    #[test]
    fn unit_size_rounds_up_to_bytes() {
        assert_eq!(LogicGenerator::new(1).unit_size(), 1);
        assert_eq!(LogicGenerator::new(8).unit_size(), 1);
        assert_eq!(LogicGenerator::new(9).unit_size(), 2);
        assert_eq!(LogicGenerator::new(16).unit_size(), 2);
    }

    #[test]
    fn incremental_advances_one_step_per_sample() {
        let mut gen = LogicGenerator::new(16);
        gen.set_pattern(LogicPattern::Incremental);
        let data = gen.fill(4).to_vec();
        assert_eq!(data, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        // The counter keeps running across fills.
        let data = gen.fill(2).to_vec();
        assert_eq!(data, vec![4, 4, 5, 5]);
    }

    #[test]
    fn banner_is_deterministic_and_restartable() {
        let mut gen = LogicGenerator::new(8);
        gen.set_pattern(LogicPattern::Banner);
        let first = gen.fill(64).to_vec();
        gen.reset();
        let again = gen.fill(64).to_vec();
        assert_eq!(first, again, "reset must restart the template");
        assert_eq!(&first[..], &BANNER_TEMPLATE[..]);
    }

    #[test]
    fn constant_patterns_are_prefilled() {
        let mut gen = LogicGenerator::new(8);
        gen.set_pattern(LogicPattern::AllHigh);
        assert!(gen.fill(100).iter().all(|&b| b == 0xff));
        gen.set_pattern(LogicPattern::AllLow);
        assert!(gen.fill(100).iter().all(|&b| b == 0x00));
    }

    #[test]
    fn fill_is_bounded_by_frame_buffer() {
        let gen = LogicGenerator::new(8);
        assert_eq!(gen.max_frame_samples(), LOGIC_BUF_SIZE);
        let gen = LogicGenerator::new(32);
        assert_eq!(gen.max_frame_samples(), LOGIC_BUF_SIZE / 4);
    }
}
