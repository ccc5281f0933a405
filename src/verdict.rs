//! Turning accumulated t statistics into a confidence-graded verdict.

use crate::stats::Battery;

/// How strongly the measurements contradict the constant-time hypothesis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    /// `10 < |t| <= 500`: probably not constant time.
    Moderate,
    /// `|t| > 500`: definitely not constant time.
    Overwhelming,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// No slot has crossed the watermark yet; `still_needed` estimates the
    /// raw samples left to collect.
    Insufficient { still_needed: usize },
    /// No leak detected at this sample size. Not a proof: other input
    /// distributions may still distinguish the operation.
    ConstantTimeLikely,
    Leak(Severity),
}

/// A t value above this bar fails the test with overwhelming probability.
const T_THRESHOLD_BANANAS: f64 = 500.0;
/// A t value above this bar fails the test.
const T_THRESHOLD_MODERATE: f64 = 10.0;

/// One evaluation of the battery.
///
/// `max_tau` is the t value normalized by `sqrt(n)`, a sample-size-free
/// distance between the two distributions, and `(5/tau)^2` estimates how many
/// measurements would be needed to barely detect the leak (push t past 5).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Report {
    /// Samples behind the winning t value (raw-slot total when no slot
    /// qualifies yet).
    pub sample_size: usize,
    pub max_t: f64,
    pub max_tau: f64,
    pub needed_estimate: f64,
    pub verdict: Verdict,
}

impl Report {
    /// True only for a full-confidence pass: enough samples and `|t|` under
    /// the moderate bar.
    pub fn passes(&self) -> bool {
        self.verdict == Verdict::ConstantTimeLikely
    }

    pub fn fmt(&self) -> String {
        match self.verdict {
            Verdict::Insufficient { still_needed } => format!(
                "n == {:+0.3}M, not enough measurements ({} still to go)",
                (self.sample_size as f64) / 1_000_000f64,
                still_needed
            ),
            _ => format!(
                "n == {:+0.3}M, max t = {:+0.5}, max tau = {:+0.5}, (5/tau)^2 = {}",
                (self.sample_size as f64) / 1_000_000f64,
                self.max_t,
                self.max_tau,
                self.needed_estimate as u64
            ),
        }
    }
}

/// Grades the most extreme qualifying t statistic in the battery. The tiers
/// are fixed constants set high enough that the false-positive rate under the
/// null hypothesis stays negligible even with a hundred-odd tests evaluated
/// after every round.
pub fn evaluate(battery: &Battery) -> Report {
    let slot = match battery.max_test() {
        Some(slot) => slot,
        None => {
            let total = battery.raw().total();
            let goal = 2 * battery.enough_samples();
            return Report {
                sample_size: total,
                max_t: 0.0,
                max_tau: 0.0,
                needed_estimate: 0.0,
                verdict: Verdict::Insufficient {
                    still_needed: goal.saturating_sub(total),
                },
            };
        }
    };

    let max_t = slot.t_value().unwrap_or(0.0);
    let sample_size = slot.total();
    let max_tau = max_t / (sample_size as f64).sqrt();
    let needed_estimate = (5.0 / max_tau).powi(2);

    let verdict = if max_t.abs() > T_THRESHOLD_BANANAS {
        Verdict::Leak(Severity::Overwhelming)
    } else if max_t.abs() > T_THRESHOLD_MODERATE {
        Verdict::Leak(Severity::Moderate)
    } else {
        Verdict::ConstantTimeLikely
    };

    Report {
        sample_size,
        max_t,
        max_tau,
        needed_estimate,
        verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Class;

    fn battery_with_shift(enough: usize, per_class: usize, shift: f64) -> Battery {
        let mut battery = Battery::new(4, enough);
        battery.begin_round(&[1_000_000]);
        for i in 0..per_class {
            let jitter = (i % 7) as f64;
            battery.record((200.0 + jitter) as i64, Class::Left);
            battery.record((200.0 + jitter + shift) as i64, Class::Right);
        }
        battery
    }

    #[test]
    fn empty_battery_is_insufficient() {
        let battery = Battery::new(4, 100);
        let report = evaluate(&battery);
        assert_eq!(
            report.verdict,
            Verdict::Insufficient { still_needed: 200 }
        );
        assert!(!report.passes());
    }

    #[test]
    fn fewer_than_two_per_class_never_computes_t() {
        let mut battery = Battery::new(4, 0);
        battery.begin_round(&[100, 200]);
        battery.record(100, Class::Left);
        battery.record(200, Class::Right);
        // watermark is 0 but each class has one sample; t must stay undefined
        let report = evaluate(&battery);
        assert!(matches!(report.verdict, Verdict::Insufficient { .. }));
    }

    #[test]
    fn identical_populations_pass() {
        let battery = battery_with_shift(500, 2_000, 0.0);
        let report = evaluate(&battery);
        assert_eq!(report.verdict, Verdict::ConstantTimeLikely);
        assert!(report.passes());
    }

    #[test]
    fn large_shift_is_an_overwhelming_leak() {
        let battery = battery_with_shift(500, 2_000, 40.0);
        let report = evaluate(&battery);
        assert_eq!(report.verdict, Verdict::Leak(Severity::Overwhelming));
        assert!(report.max_t.abs() > 500.0);
    }
}
