// Copyright 2012-2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This crate decides, by statistical inference rather than static analysis,
//! whether a black-box operation's execution time depends on secret input
//! values. It follows the [DudeCT](https://eprint.iacr.org/2016/1123) leakage
//! detection methodology.
//!
//! The operation under test is run many times under two input classes
//! ([`Class::Left`] and [`Class::Right`]) chosen by the user to be maximally
//! distinguishable in behavior. For example, when checking a comparison
//! routine, `Left` might hold pairs of equal buffers while `Right` holds
//! pairs differing at a fixed position. Each invocation is timed, and a
//! battery of Welch's t-tests (uncropped, percentile-cropped, second-order)
//! decides whether the two runtime distributions differ.
//!
//! Operations are added to a [`Registry`] and driven through repeated trials
//! by [`run_benches_console`] or [`main_with_registry`]. A result line looks
//! like
//!
//! ```text
//! check array_eq ... LEAKED, probably not constant time: n == +0.046M, max t = +61.61472, max tau = +0.28863, (5/tau)^2 = 300
//! ```
//!
//! where `n` is the number of samples behind the winning t value, `max t` the
//! most extreme t statistic across the battery, `max tau = max_t / sqrt(n)` a
//! sample-size-free effect size, and `(5/tau)^2` the number of measurements
//! that would be needed to push t past 5, a conventional detection bar.
//!
//! A pass means no leak was detected at this sample size. It is statistical
//! evidence, not proof: other input distributions may still distinguish the
//! operation.

pub mod collector;
pub mod config;
pub mod runner;
pub mod stats;
pub mod trial;
pub mod verdict;

pub use collector::{black_box, BenchRng, Class, Dut, FnDut};
pub use config::Config;
pub use runner::{main_with_registry, run_benches_console, BenchOpts};
pub use trial::{DutEntry, Registry, TrialEvent, TrialResult, TrialState};
pub use verdict::{Report, Severity, Verdict};
