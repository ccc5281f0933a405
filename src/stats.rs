// Copyright 2012 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Online Welch's t-test battery.
//!
//! Execution-time distributions tend to be skewed towards large timings: most
//! runs take little time, a few take a lot (e.g. when the OS interrupts the
//! measurement). To cope with the fat right tail, the battery keeps one
//! uncropped test, a set of tests cropped at exponentially-spaced percentile
//! thresholds, and a second-order test on squared deviations that catches
//! leaks showing up as unequal variance rather than unequal mean.

use crate::collector::Class;

/// One independent two-population accumulator. Running mean and sum of
/// squared deviations are maintained per class with Welford's method, so the
/// t statistic can be computed at any point without storing raw samples.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TestSlot {
    means: [f64; 2],
    sq_devs: [f64; 2],
    sizes: [usize; 2],
}

impl TestSlot {
    /// Feeds one measurement into the accumulator for the given class.
    pub fn push(&mut self, value: f64, class: Class) {
        let c = class as usize;
        self.sizes[c] += 1;
        // Welford's update; avoids the catastrophic cancellation of naively
        // accumulating sums of squares.
        let delta = value - self.means[c];
        self.means[c] += delta / (self.sizes[c] as f64);
        self.sq_devs[c] += delta * (value - self.means[c]);
    }

    /// Number of samples accumulated for one class.
    pub fn n(&self, class: Class) -> usize {
        self.sizes[class as usize]
    }

    /// Total samples across both classes.
    pub fn total(&self) -> usize {
        self.sizes[0] + self.sizes[1]
    }

    /// Running mean for one class (0.0 before the first push).
    pub fn mean(&self, class: Class) -> f64 {
        self.means[class as usize]
    }

    /// Welch's t statistic for the two accumulated populations, or `None`
    /// when either class has fewer than 2 samples. Swapping the two classes
    /// negates the result exactly.
    pub fn t_value(&self) -> Option<f64> {
        if self.sizes[0] < 2 || self.sizes[1] < 2 {
            return None;
        }
        let n0 = self.sizes[0] as f64;
        let n1 = self.sizes[1] as f64;
        let var0 = self.sq_devs[0] / (n0 - 1.0);
        let var1 = self.sq_devs[1] / (n1 - 1.0);
        let num = self.means[0] - self.means[1];
        let den = (var0 / n0 + var1 / n1).sqrt();
        Some(num / den)
    }
}

/// Cropping thresholds for one round. For each index `i` in `[0, count)` the
/// rank fraction is `1 - 0.5^(10(i+1)/count)`, so thresholds are densely
/// packed near the low end and sparse near the high end, approximately
/// matching the measurement distribution. There is no more science to the
/// spacing than that.
pub fn crop_thresholds(times: &[i64], count: usize) -> Vec<i64> {
    let sorted = {
        let mut v = times.to_vec();
        v.sort_unstable();
        v
    };
    if sorted.is_empty() {
        return Vec::new();
    }

    (0..count)
        .map(|i| {
            let exp = 10.0 * ((i + 1) as f64) / (count as f64);
            let frac = 1.0 - 0.5f64.powf(exp);
            // frac < 1 strictly, so the rank stays in range for any count
            let rank = (frac * (sorted.len() as f64)) as usize;
            sorted[rank]
        })
        .collect()
}

/// The full test battery for one trial: slot 0 is the uncropped test, slots
/// `1..=P` are cropped at this round's percentile thresholds, and the final
/// slot accumulates squared deviations once enough raw samples exist.
///
/// Slots persist across rounds within a trial; thresholds are recomputed
/// fresh from each round's own samples.
#[derive(Clone, Debug)]
pub struct Battery {
    slots: Vec<TestSlot>,
    thresholds: Vec<i64>,
    enough: usize,
}

impl Battery {
    pub fn new(percentile_count: usize, enough_samples: usize) -> Battery {
        Battery {
            slots: vec![TestSlot::default(); percentile_count + 2],
            thresholds: Vec::new(),
            enough: enough_samples,
        }
    }

    /// Empties every slot. Called at trial start; never mid-trial.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = TestSlot::default();
        }
        self.thresholds.clear();
    }

    /// Refits the cropping thresholds to one round's valid execution times,
    /// replacing the previous round's thresholds outright.
    pub fn begin_round(&mut self, valid_times: &[i64]) {
        let count = self.slots.len() - 2;
        self.thresholds = crop_thresholds(valid_times, count);
    }

    /// Feeds one sanitized execution time into the battery: always into the
    /// raw slot, into every cropped slot whose threshold it falls under, and
    /// past the raw-sample watermark into the second-order slot as a squared
    /// deviation from the raw running mean.
    ///
    /// Non-positive times (counter overflow, interrupted measurement) are
    /// discarded here and leave no trace in any slot.
    pub fn record(&mut self, exec_time: i64, class: Class) {
        if exec_time <= 0 {
            return;
        }
        let x = exec_time as f64;

        self.slots[0].push(x, class);

        for (slot, &threshold) in self.slots[1..].iter_mut().zip(self.thresholds.iter()) {
            if exec_time < threshold {
                slot.push(x, class);
            }
        }

        if self.slots[0].total() > self.enough {
            let centered = x - self.slots[0].mean(class);
            let second_order = self.slots.len() - 1;
            self.slots[second_order].push(centered * centered, class);
        }
    }

    /// The slot with the largest `|t|` among those where both classes have
    /// crossed the watermark; ties go to the first such slot. `None` when no
    /// slot qualifies yet.
    pub fn max_test(&self) -> Option<&TestSlot> {
        let mut best: Option<(&TestSlot, f64)> = None;
        for slot in &self.slots {
            if slot.n(Class::Left).min(slot.n(Class::Right)) <= self.enough {
                continue;
            }
            let abs_t = match slot.t_value() {
                Some(t) if !t.is_nan() => t.abs(),
                _ => continue,
            };
            match best {
                Some((_, max)) if abs_t <= max => {}
                _ => best = Some((slot, abs_t)),
            }
        }
        best.map(|(slot, _)| slot)
    }

    /// The uncropped slot; its totals drive progress reporting.
    pub fn raw(&self) -> &TestSlot {
        &self.slots[0]
    }

    pub fn enough_samples(&self) -> usize {
        self.enough
    }

    /// This round's cropping thresholds, ascending.
    pub fn thresholds(&self) -> &[i64] {
        &self.thresholds
    }
}
