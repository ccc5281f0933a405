//! One measurement round: classified inputs in, sanitized execution times out.
//!
//! The collector owns nothing across rounds. Every round allocates fresh
//! buffers for ticks, times, class labels and input bytes, feeds the valid
//! deltas into the battery, and drops the buffers; the accumulator slots are
//! the only state carried forward.

use std::process;
use std::time::Instant;

use rand_chacha::ChaChaRng;

use crate::config::Config;
use crate::stats::Battery;

/// The RNG handed to input-preparation code. Seedable so runs can be
/// reproduced exactly.
pub type BenchRng = ChaChaRng;

/// Specifies which of the two input distributions a sample belongs to. The
/// two classes should be maximally distinguishable in behavior but
/// indistinguishable to an attacker.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Class {
    #[default]
    Left = 0,
    Right = 1,
}

/// An operation under test, together with the code that feeds and times it.
///
/// The engine calls `init` once per trial, then alternates `prepare_inputs`
/// and `measure` once per round. `measure` must invoke the operation once per
/// `chunk_size`-byte input chunk and record a high-resolution timestamp
/// immediately before and after each invocation.
pub trait Dut {
    /// One-time setup per trial (key generation, context setup, ...).
    fn init(&mut self) {}

    /// Fills `input` (`N * chunk_size` bytes) and `classes` (N labels).
    /// Both classes must eventually be populated; randomized interleaving is
    /// recommended to keep thermal and frequency drift from biasing one
    /// class.
    fn prepare_inputs(&mut self, rng: &mut BenchRng, input: &mut [u8], classes: &mut [Class]);

    /// Runs and times the operation once per input chunk, filling `before`
    /// and `after` with per-invocation ticks. The returned flag reports
    /// whether the measurement itself went through structurally; it says
    /// nothing about constant-timeness.
    fn measure(&mut self, before: &mut [u64], after: &mut [u64], input: &[u8]) -> bool;
}

/// What one round produced: the structural-success hint from the measurement
/// collaborator and the sanitized (class, execution time) pairs, kept only so
/// callers can mirror them to a raw-data sink.
pub struct RoundOutcome {
    pub structurally_ok: bool,
    pub samples: Vec<(Class, i64)>,
}

// This tool is diagnostic: if a round buffer cannot be allocated there is no
// sensible partial result, so bail out with a status distinct from both
// "leak" and "no leak".
pub(crate) const EXIT_MALFUNCTION: i32 = 111;

fn die(what: &str) -> ! {
    eprintln!("fatal: failed to allocate {}", what);
    process::exit(EXIT_MALFUNCTION);
}

fn round_buf<T: Clone + Default>(len: usize, what: &str) -> Vec<T> {
    let mut v: Vec<T> = Vec::new();
    if v.try_reserve_exact(len).is_err() {
        die(what);
    }
    v.resize(len, T::default());
    v
}

/// Executes one round against `dut` and feeds the battery.
///
/// Deltas that come out non-positive (overflowed counter, measurement
/// interrupted by the host OS) are dropped before they reach the percentile
/// fit or any slot.
pub fn run_round(
    dut: &mut dyn Dut,
    rng: &mut BenchRng,
    battery: &mut Battery,
    cfg: &Config,
) -> RoundOutcome {
    let n = cfg.measures_per_round;
    let mut before: Vec<u64> = round_buf(n, "before-tick buffer");
    let mut after: Vec<u64> = round_buf(n, "after-tick buffer");
    let mut classes: Vec<Class> = round_buf(n, "class buffer");
    let mut input: Vec<u8> = round_buf(n * cfg.chunk_size, "input buffer");

    dut.prepare_inputs(rng, &mut input, &mut classes);
    let structurally_ok = dut.measure(&mut before, &mut after, &input);

    let mut times: Vec<i64> = Vec::new();
    let mut samples: Vec<(Class, i64)> = Vec::new();
    if times.try_reserve_exact(n).is_err() || samples.try_reserve_exact(n).is_err() {
        die("execution-time buffer");
    }
    for i in 0..n {
        let delta = after[i].wrapping_sub(before[i]) as i64;
        if delta <= 0 {
            continue;
        }
        times.push(delta);
        samples.push((classes[i], delta));
    }

    battery.begin_round(&times);
    for &(class, delta) in &samples {
        battery.record(delta, class);
    }

    RoundOutcome {
        structurally_ok,
        samples,
    }
}

// NOTE: We don't have a proper black box in stable Rust. This is a workaround
// implementation, that may have a too big performance overhead, depending on
// operation, or it may fail to properly avoid having code optimized out. It
// is used when the `core-hint-black-box` feature is disabled.
#[cfg(not(feature = "core-hint-black-box"))]
pub fn black_box<T>(dummy: T) -> T {
    unsafe {
        let ret = std::ptr::read_volatile(&dummy);
        std::mem::forget(dummy);
        ret
    }
}

/// A function that is opaque to the optimizer, so the timed operation cannot
/// be dead-code-eliminated.
#[cfg(feature = "core-hint-black-box")]
pub fn black_box<T>(dummy: T) -> T {
    core::hint::black_box(dummy)
}

/// Adapter for the common case where the operation under test is a plain
/// closure over an input chunk. Handles the tick protocol with a monotonic
/// nanosecond clock so call sites only supply input generation and the
/// operation itself.
pub struct FnDut<G, F> {
    epoch: Instant,
    prepare: G,
    operation: F,
}

impl<G, F> FnDut<G, F>
where
    G: FnMut(&mut BenchRng, &mut [u8]) -> Class,
    F: FnMut(&[u8]),
{
    /// `prepare` fills one input chunk and labels it; `operation` is the
    /// routine whose timing is in question.
    pub fn new(prepare: G, operation: F) -> FnDut<G, F> {
        FnDut {
            epoch: Instant::now(),
            prepare,
            operation,
        }
    }

    fn now_ns(&self) -> u64 {
        let elapsed = self.epoch.elapsed();
        elapsed.as_secs() * 1_000_000_000 + u64::from(elapsed.subsec_nanos())
    }
}

impl<G, F> Dut for FnDut<G, F>
where
    G: FnMut(&mut BenchRng, &mut [u8]) -> Class,
    F: FnMut(&[u8]),
{
    fn init(&mut self) {
        self.epoch = Instant::now();
    }

    fn prepare_inputs(&mut self, rng: &mut BenchRng, input: &mut [u8], classes: &mut [Class]) {
        let chunk_size = (input.len() / classes.len().max(1)).max(1);
        for (chunk, class) in input.chunks_mut(chunk_size).zip(classes.iter_mut()) {
            *class = (self.prepare)(rng, chunk);
        }
    }

    fn measure(&mut self, before: &mut [u64], after: &mut [u64], input: &[u8]) -> bool {
        let chunk_size = (input.len() / before.len().max(1)).max(1);
        for (i, chunk) in input.chunks(chunk_size).enumerate() {
            before[i] = self.now_ns();
            (self.operation)(black_box(chunk));
            after[i] = self.now_ns();
        }
        true
    }
}
