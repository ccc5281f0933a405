// Copyright 2012 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Console front end: runs every registered operation, shows live per-round
//! progress, and prints one verdict line per operation.

use std::fs::OpenOptions;
use std::io;
use std::io::prelude::*;
use std::iter::repeat;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use clap::App;

use crate::collector::Class;
use crate::config::Config;
use crate::trial::{run_entry, Registry, TrialEvent, TrialState};
use crate::verdict::{Report, Severity, Verdict};

/// Options for a console run.
///
/// When `continuous` is set, the first (alphabetically) matching operation is
/// checked over and over, reporting after every round.
///
/// When `filter` is set and `continuous` is not, only operations whose names
/// contain the filter string are checked.
#[derive(Default)]
pub struct BenchOpts {
    pub continuous: bool,
    pub filter: Option<String>,
    /// Append every valid sample as a `name,class,exec_time` CSV row.
    pub file_out: Option<PathBuf>,
}

type SharedCsv = Arc<Mutex<Option<io::BufWriter<std::fs::File>>>>;

struct ConsoleState {
    max_name_len: usize,
    csv: SharedCsv,
}

impl ConsoleState {
    fn write_plain(&mut self, s: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(s.as_bytes())?;
        stdout.flush()
    }

    fn write_run_start(&mut self, len: usize) -> io::Result<()> {
        let noun = if len != 1 { "checks" } else { "check" };
        self.write_plain(&format!("\nrunning {} leak {}\n", len, noun))
    }

    fn write_continuous_start(&mut self) -> io::Result<()> {
        self.write_plain("running 1 leak check continuously\n")
    }

    fn write_trial_start(&mut self, name: &str, attempt: usize, tries: usize) -> io::Result<()> {
        // trailing blank line gives the first progress write something to
        // erase
        self.write_plain(&format!("testing {} ... ({}/{})\n\n", name, attempt, tries))
    }

    fn write_progress(&mut self, report: &Report) -> io::Result<()> {
        self.write_plain(&format!("\x1b[A\x1b[2K{}\n", report.fmt()))
    }

    fn write_trial_end(&mut self) -> io::Result<()> {
        self.write_plain("\x1b[A\x1b[2K\x1b[A\x1b[2K")
    }

    fn write_result(&mut self, name: &str, report: &Report, state: TrialState) -> io::Result<()> {
        let padded = padded_name(name, self.max_name_len);
        let grade = match (state, report.verdict) {
            (TrialState::Passed, _) => "ok, no leak detected",
            (_, Verdict::Leak(Severity::Overwhelming)) => "LEAKED, definitely not constant time",
            (_, Verdict::Leak(Severity::Moderate)) => "LEAKED, probably not constant time",
            (_, Verdict::Insufficient { .. }) => "inconclusive, not enough measurements",
            // structural measurement failure with clean statistics
            (_, Verdict::ConstantTimeLikely) => "FAILED, measurement did not complete",
        };
        self.write_plain(&format!("check {} ... {}: {}\n", padded, grade, report.fmt()))
    }

    fn write_run_finish(&mut self) -> io::Result<()> {
        self.write_plain("\nleak checks complete\n\n")
    }

    fn dump_samples(&mut self, name: &str, samples: &[(Class, i64)]) -> io::Result<()> {
        let mut guard = match self.csv.lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(()),
        };
        if let Some(writer) = guard.as_mut() {
            for &(class, time) in samples {
                writeln!(writer, "{},{},{}", name, class as u8, time)?;
            }
        }
        Ok(())
    }
}

fn padded_name(name: &str, column_count: usize) -> String {
    let mut padded = name.to_string();
    let fill = column_count.saturating_sub(padded.len());
    let pad = repeat(" ").take(fill).collect::<String>();
    padded.push_str(&pad);
    padded
}

/// Runs the registered operations under the given options and prints the
/// results to the console.
pub fn run_benches_console(opts: BenchOpts, registry: Registry, cfg: &Config) -> io::Result<()> {
    let csv: SharedCsv = Arc::new(Mutex::new(match &opts.file_out {
        Some(path) => {
            let file = OpenOptions::new().append(true).create(true).open(path)?;
            Some(io::BufWriter::new(file))
        }
        None => None,
    }));

    let registry = registry.filter(opts.filter.as_deref());
    let mut st = ConsoleState {
        max_name_len: registry
            .entries()
            .iter()
            .map(|e| e.name.len())
            .max()
            .unwrap_or(0),
        csv: Arc::clone(&csv),
    };

    if opts.continuous {
        // Flush the sample dump before dying, so an interrupted continuous
        // run doesn't truncate the output file mid-row.
        let handler_csv = Arc::clone(&csv);
        ctrlc::set_handler(move || {
            if let Ok(mut guard) = handler_csv.lock() {
                if let Some(writer) = guard.as_mut() {
                    let _ = writer.flush();
                }
            }
            process::exit(0);
        })
        .map_err(|e| io::Error::other(e))?;

        st.write_continuous_start()?;

        let mut entries = registry.into_entries();
        if entries.is_empty() {
            match opts.filter {
                Some(f) => panic!("no operation matching '{}' was registered", f),
                None => return Ok(()),
            }
        }
        let mut entry = entries.remove(0);
        let name = entry.name.clone();

        loop {
            let mut dump_err = None;
            let result = run_entry(&mut entry, cfg, |event| {
                let outcome = match event {
                    TrialEvent::TrialStart { attempt, tries } => {
                        let erase = if attempt > 1 { st.write_trial_end() } else { Ok(()) };
                        erase.and_then(|_| st.write_trial_start(&name, attempt, tries))
                    }
                    TrialEvent::Round { report, samples } => st
                        .write_progress(report)
                        .and_then(|_| st.dump_samples(&name, samples)),
                };
                if let Err(e) = outcome {
                    dump_err.get_or_insert(e);
                }
            });
            if let Some(e) = dump_err {
                return Err(e);
            }
            st.write_trial_end()?;
            st.write_result(&name, &result.report, result.state())?;
        }
    } else {
        st.write_run_start(registry.len())?;

        for mut entry in registry.into_entries() {
            let name = entry.name.clone();
            let mut dump_err = None;
            let result = run_entry(&mut entry, cfg, |event| {
                let outcome = match event {
                    TrialEvent::TrialStart { attempt, tries } => {
                        let erase = if attempt > 1 { st.write_trial_end() } else { Ok(()) };
                        erase.and_then(|_| st.write_trial_start(&name, attempt, tries))
                    }
                    TrialEvent::Round { report, samples } => st
                        .write_progress(report)
                        .and_then(|_| st.dump_samples(&name, samples)),
                };
                if let Err(e) = outcome {
                    dump_err.get_or_insert(e);
                }
            });
            if let Some(e) = dump_err {
                return Err(e);
            }
            st.write_trial_end()?;
            st.write_result(&name, &result.report, result.state())?;
        }

        if let Ok(mut guard) = csv.lock() {
            if let Some(writer) = guard.as_mut() {
                writer.flush()?;
            }
        }
        st.write_run_finish()
    }
}

/// Parses command-line arguments and runs the registry; intended as the whole
/// body of a leak-check binary's `main`.
pub fn main_with_registry(registry: Registry, cfg: &Config) {
    let matches = App::new("ctleak")
        .arg_from_usage(
            "--filter [NAME] \
             'Only run the leak checks whose name contains NAME'",
        )
        .arg_from_usage(
            "--continuous [NAME] \
             'Runs a continuous leak check on the first check matching NAME'",
        )
        .arg_from_usage(
            "--out [FILE] \
             'Appends raw measurement data in CSV format to FILE'",
        )
        .get_matches();

    let mut opts = BenchOpts::default();
    opts.filter = matches
        .value_of("continuous")
        .or(matches.value_of("filter"))
        .map(|s| s.to_string());
    opts.continuous = matches.is_present("continuous");
    opts.file_out = matches.value_of("out").map(PathBuf::from);

    if let Err(e) = run_benches_console(opts, registry, cfg) {
        eprintln!("console output failed: {}", e);
        process::exit(1);
    }
}
