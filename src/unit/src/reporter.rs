use std::io;
use std::time::{Duration, Instant};

use enum_map::EnumMap;

use crate::*;

// Report output is best-effort; a closed stdout shouldn't abort the run.
macro_rules! out {
    ($dst:expr$(, $($args:tt)*)?) => {
        { let _ = std::writeln!($dst$(, $($args)*)?); }
    }
}

impl Outcome {
    /// Lowercase name used in the totals line.
    pub fn name(self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::Xpassed => "xpassed",
            Outcome::Xfailed => "xfailed",
            Outcome::Ignored => "ignored",
            Outcome::Filtered => "filtered",
            Outcome::Skipped => "skipped",
        }
    }

    /// Verdict printed after each test name. Critical outcomes shout.
    fn verdict(self) -> &'static str {
        match self {
            Outcome::Passed => "ok",
            Outcome::Failed => "FAILED",
            Outcome::Xpassed => "XPASSED",
            other => other.name(),
        }
    }

    /// One-character progress mark for quiet mode.
    fn mark(self) -> char {
        match self {
            Outcome::Passed => '.',
            Outcome::Failed => 'F',
            Outcome::Xpassed => 'X',
            Outcome::Xfailed => 'x',
            Outcome::Ignored => 'i',
            Outcome::Filtered => ' ',
            Outcome::Skipped => 's',
        }
    }
}

/// Indices into the result list, grouped by what needs reporting.
#[derive(Debug)]
struct Tally {
    started: Instant,
    elapsed: Duration,
    counts: EnumMap<Outcome, usize>,
    critical: Vec<usize>,
    skipped: Vec<usize>,
}

impl Default for Tally {
    fn default() -> Self {
        Tally {
            started: Instant::now(),
            elapsed: Duration::default(),
            counts: Default::default(),
            critical: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl Tally {
    fn total(&self) -> usize {
        self.counts.values().sum()
    }

    fn record(&mut self, outcome: Outcome) {
        let idx = self.total();
        if outcome.is_critical() {
            self.critical.push(idx);
        } else if outcome == Outcome::Skipped {
            self.skipped.push(idx);
        }
        self.counts[outcome] += 1;
    }

    fn stop(&mut self) {
        self.elapsed = self.started.elapsed();
    }
}

/// Prints results in roughly the same format as libtest, plus a
/// section for skipped scenarios.
#[derive(Debug)]
pub struct StandardTestReporter<W: io::Write + std::fmt::Debug> {
    out: W,
    tally: Tally,
    name_width: usize,
    quiet: bool,
}

impl StandardTestReporter<io::Stdout> {
    pub fn stdout() -> Self {
        StandardTestReporter::with_output(io::stdout())
    }
}

impl<W: io::Write + std::fmt::Debug> StandardTestReporter<W> {
    pub fn with_output(out: W) -> Self {
        StandardTestReporter {
            out,
            tally: Tally::default(),
            name_width: 0,
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_failures<D>(&mut self, tests: &[Test<D>], results: &[TestResult])
    {
        if self.tally.critical.is_empty() {
            return;
        }

        out!(self.out, "failures:\n");
        for &i in self.tally.critical.iter() {
            out!(self.out, "---- {} ----", tests[i].name());
            match (results[i].outcome, results[i].output()) {
                (Outcome::Xpassed, _) => {
                    out!(self.out, "test changed from failing to passing");
                },
                (_, Some(msg)) => out!(self.out, "{}", msg),
                _ => {},
            }
        }
        out!(self.out);

        out!(self.out, "failures:\n");
        for &i in self.tally.critical.iter() {
            out!(self.out, "    {}", tests[i].name());
        }
        out!(self.out);
    }

    /// Quiet runs only show marks, so the reasons are listed at the end.
    fn write_skips<D>(&mut self, tests: &[Test<D>], results: &[TestResult]) {
        if !self.quiet || self.tally.skipped.is_empty() {
            return;
        }
        out!(self.out, "skipped:");
        for &i in self.tally.skipped.iter() {
            let reason = results[i].output().unwrap_or("");
            out!(self.out, "    {} ({})", tests[i].name(), reason);
        }
        out!(self.out);
    }

    fn write_totals(&mut self) {
        let verdict = if self.tally.critical.is_empty() { "ok" } else {
            "FAILED"
        };
        out!(self.out, "test result: {}", verdict);
        out!(
            self.out,
            "finished {} tests in {:.3}s",
            self.tally.total(),
            self.tally.elapsed.as_secs_f64(),
        );
        let totals: String = self.tally.counts.iter()
            .map(|(outcome, n)| format!("{} {}; ", n, outcome.name()))
            .collect();
        out!(self.out, "{}", totals);
    }
}

impl<D, W: io::Write + std::fmt::Debug> TestReporter<Test<D>>
    for StandardTestReporter<W>
{
    fn before_all(&mut self, tests: &[Test<D>]) {
        self.name_width = tests.iter()
            .map(|test| test.name().chars().count())
            .max()
            .unwrap_or(0);
        out!(self.out, "running {} tests", tests.len());
        self.tally = Tally::default();
    }

    fn before_each(&mut self, test: &Test<D>) {
        if !self.quiet {
            let _ = write!(
                self.out,
                "test {:width$} ... ",
                test.name(),
                width = self.name_width,
            );
        }
    }

    fn after_each(&mut self, _test: &Test<D>, result: &TestResult) {
        let outcome = result.outcome;
        if self.quiet {
            let _ = write!(self.out, "{}", outcome.mark());
        } else if let (Outcome::Skipped, Some(reason)) =
            (outcome, result.output())
        {
            out!(self.out, "skipped ({})", reason);
        } else {
            out!(self.out, "{}", outcome.verdict());
        }
        let _ = self.out.flush();
        self.tally.record(outcome);
    }

    fn after_all(&mut self, tests: &[Test<D>], results: &[TestResult]) {
        self.tally.stop();
        out!(self.out);
        self.write_failures(tests, results);
        self.write_skips(tests, results);
        self.write_totals();
    }
}
