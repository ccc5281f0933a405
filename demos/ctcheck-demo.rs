//! Two demonstration leak checks: random arithmetic (should pass) and slice
//! equality with early exit (should leak).
//!
//! Run with `cargo run --example ctcheck-demo`, optionally with `--filter`,
//! `--continuous` or `--out` (see `--help`).

use ctleak::{black_box, main_with_registry, BenchRng, Class, Config, FnDut, Registry};
use rand::{Rng, RngCore};

fn main() {
    let mut registry = Registry::new();

    // Random arithmetic on a random input byte. The work done is independent
    // of the class, so this should produce small t values.
    registry.register(
        "arith",
        FnDut::new(
            |rng: &mut BenchRng, chunk: &mut [u8]| {
                rng.fill_bytes(chunk);
                if rng.random::<bool>() {
                    Class::Left
                } else {
                    Class::Right
                }
            },
            |chunk: &[u8]| {
                let u = chunk[0] as usize;
                black_box(((u + 10) / 6) << 5);
            },
        ),
    );

    // Equality of the two chunk halves. Left inputs are equal pairs, Right
    // inputs differ at the 6th byte; the comparison returns early on the
    // first mismatch, so this is very much not constant time.
    registry.register(
        "slice_eq",
        FnDut::new(
            |rng: &mut BenchRng, chunk: &mut [u8]| {
                let mid = chunk.len() / 2;
                rng.fill_bytes(chunk);
                let (lo, hi) = chunk.split_at_mut(mid);
                hi.copy_from_slice(lo);
                if rng.random::<bool>() {
                    Class::Left
                } else {
                    hi[5] = hi[5].wrapping_add(1);
                    Class::Right
                }
            },
            |chunk: &[u8]| {
                let (lo, hi) = chunk.split_at(chunk.len() / 2);
                black_box(lo == hi);
            },
        ),
    );

    main_with_registry(registry, &Config::default());
}
