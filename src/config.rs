//! Measurement configuration.

/// Tuning knobs for a leak check. `Default` is the reference configuration;
/// tests and short-running checks typically lower `enough_samples`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Samples per round (N).
    pub measures_per_round: usize,
    /// Input bytes handed to the operation per sample.
    pub chunk_size: usize,
    /// Number of percentile-cropped test slots (P).
    pub percentile_count: usize,
    /// Per-class sample count a slot must exceed before its t value counts.
    pub enough_samples: usize,
    /// Per-round allowance for discarded measurements, used when sizing a
    /// trial's round count.
    pub drop_margin: usize,
    /// How many fresh trials to attempt before reporting a leak.
    pub test_tries: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            measures_per_round: 500,
            chunk_size: 32,
            percentile_count: 100,
            enough_samples: 10_000,
            drop_margin: 20,
            test_tries: 10,
        }
    }
}

impl Config {
    /// Rounds per trial, sized so that the raw slot's smaller class count
    /// crosses the watermark even after the expected per-round discards.
    pub fn rounds_per_trial(&self) -> usize {
        let usable = self
            .measures_per_round
            .saturating_sub(2 * self.drop_margin)
            .max(1);
        2 * self.enough_samples / usable + 1
    }
}
