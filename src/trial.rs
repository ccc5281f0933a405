//! Trial repetition: fresh statistics, bounded retries, one verdict per
//! registered operation.

use rand::SeedableRng;

use crate::collector::{self, BenchRng, Class, Dut};
use crate::config::Config;
use crate::stats::Battery;
use crate::verdict::{self, Report};

/// One registered operation under test. Adding an operation to a run is a
/// registry insertion, not code generation.
pub struct DutEntry {
    pub name: String,
    /// RNG seed for input preparation; `None` seeds from the OS.
    pub seed: Option<[u8; 32]>,
    pub dut: Box<dyn Dut>,
}

/// Ordered collection of operations under test. The runner executes one full
/// trial sequence per entry, in insertion order.
#[derive(Default)]
pub struct Registry {
    entries: Vec<DutEntry>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register<D: Dut + 'static>(&mut self, name: &str, dut: D) -> &mut Registry {
        self.register_seeded(name, None, dut)
    }

    pub fn register_seeded<D: Dut + 'static>(
        &mut self,
        name: &str,
        seed: Option<[u8; 32]>,
        dut: D,
    ) -> &mut Registry {
        self.entries.push(DutEntry {
            name: name.to_string(),
            seed,
            dut: Box::new(dut),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DutEntry] {
        &self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<DutEntry> {
        self.entries
    }

    /// Drops entries whose name does not contain `filter`, then sorts the
    /// rest alphabetically.
    pub fn filter(self, filter: Option<&str>) -> Registry {
        let mut entries = self.entries;
        if let Some(f) = filter {
            entries.retain(|e| e.name.contains(f));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Registry { entries }
    }
}

/// Where one operation's check currently stands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrialState {
    NotStarted,
    Running,
    Passed,
    Failed,
}

/// Callback events emitted while an entry is being checked, for progress
/// display and raw-sample dumping.
pub enum TrialEvent<'a> {
    /// A fresh trial is starting (1-based attempt out of the retry bound).
    TrialStart { attempt: usize, tries: usize },
    /// One round finished; `samples` are this round's sanitized
    /// (class, execution time) pairs, already folded into the statistics.
    Round {
        report: &'a Report,
        samples: &'a [(Class, i64)],
    },
}

/// Outcome of one trial: the last evaluation plus whether every measurement
/// call reported structural success.
pub struct TrialResult {
    pub report: Report,
    pub structurally_ok: bool,
}

impl TrialResult {
    pub fn passes(&self) -> bool {
        self.structurally_ok && self.report.passes()
    }

    pub fn state(&self) -> TrialState {
        if self.passes() {
            TrialState::Passed
        } else {
            TrialState::Failed
        }
    }
}

/// Runs one trial: resets the battery, initializes the device under test,
/// then alternates rounds and evaluations for the configured round count.
pub fn run_trial<F>(
    dut: &mut dyn Dut,
    rng: &mut BenchRng,
    battery: &mut Battery,
    cfg: &Config,
    mut on_round: F,
) -> TrialResult
where
    F: FnMut(&Report, &[(Class, i64)]),
{
    battery.reset();
    dut.init();

    let mut structurally_ok = true;
    let mut report = verdict::evaluate(battery);
    for _ in 0..cfg.rounds_per_trial() {
        let outcome = collector::run_round(dut, rng, battery, cfg);
        structurally_ok &= outcome.structurally_ok;
        report = verdict::evaluate(battery);
        on_round(&report, &outcome.samples);
    }

    TrialResult {
        report,
        structurally_ok,
    }
}

/// Runs up to `test_tries` trials for one entry, stopping early on the first
/// pass. Statistics never survive a trial boundary. Always halts within
/// `test_tries * rounds_per_trial` rounds.
pub fn run_entry<F>(entry: &mut DutEntry, cfg: &Config, mut on_event: F) -> TrialResult
where
    F: FnMut(TrialEvent),
{
    let mut rng = match entry.seed {
        Some(seed) => BenchRng::from_seed(seed),
        None => BenchRng::from_os_rng(),
    };
    let mut battery = Battery::new(cfg.percentile_count, cfg.enough_samples);

    let mut result = TrialResult {
        report: verdict::evaluate(&battery),
        structurally_ok: true,
    };
    for attempt in 1..=cfg.test_tries.max(1) {
        on_event(TrialEvent::TrialStart {
            attempt,
            tries: cfg.test_tries.max(1),
        });
        result = run_trial(&mut *entry.dut, &mut rng, &mut battery, cfg, |report, samples| {
            on_event(TrialEvent::Round { report, samples })
        });
        if result.passes() {
            break;
        }
    }
    result
}
