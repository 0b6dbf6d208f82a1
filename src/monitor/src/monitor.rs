use std::fmt;
use std::sync::Arc;

use derive_more::{Display, From};
use log::{debug, trace};
use parking_lot::Mutex;

use crate::*;

/// A diagnostic that must be reported before the next verification.
#[derive(Clone, Debug, Display)]
#[display(fmt = "{} {}", severity, pattern)]
pub struct Expectation {
    pub severity: Severity,
    pub pattern: Pattern,
}

impl Expectation {
    pub fn new(severity: Severity, pattern: impl Into<Pattern>) -> Self {
        Expectation { severity, pattern: pattern.into() }
    }

    pub fn matches(&self, diagnostic: &Diagnostic) -> bool {
        self.severity == diagnostic.severity && self.pattern.matches(diagnostic)
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    pending: Vec<Expectation>,
    allowed: Vec<Expectation>,
    unexpected: Vec<Diagnostic>,
    matched: u32,
    tolerated: u32,
    ignored: u32,
}

impl MonitorState {
    fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Expectations that were never reported together with diagnostics
/// nobody expected.
#[derive(Clone, Debug, Default)]
pub struct VerifyFailure {
    pub unmatched: Vec<Expectation>,
    pub unexpected: Vec<Diagnostic>,
}

impl std::error::Error for VerifyFailure {}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.unmatched.is_empty() {
            write!(f, "{} expected diagnostic(s) not reported:",
                self.unmatched.len())?;
            for exp in self.unmatched.iter() {
                write!(f, "\n  {}", exp)?;
            }
        }
        if !self.unexpected.is_empty() {
            if !self.unmatched.is_empty() {
                writeln!(f)?;
            }
            write!(f, "{} unexpected diagnostic(s) reported:",
                self.unexpected.len())?;
            for diag in self.unexpected.iter() {
                let text = diag.to_string().replace('\n', "\n  ");
                write!(f, "\n  {}", text)?;
            }
        }
        Ok(())
    }
}

/// Counts gathered over one successful verification period.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VerifySummary {
    pub matched: u32,
    pub tolerated: u32,
    pub ignored: u32,
}

#[derive(Debug, Display, From)]
pub enum VerifyError {
    #[display(fmt = "{}", _0)]
    Mismatch(VerifyFailure),
    #[display(fmt = "{}", _0)]
    Barrier(BarrierError),
}

impl std::error::Error for VerifyError {}

/// Tracks pending expectations and checks incoming diagnostics
/// against them.
///
/// Clones share state, so one handle can be attached to a dispatcher
/// while another is used to declare and verify.
#[derive(Clone, Debug)]
pub struct ExpectationMonitor {
    state: Arc<Mutex<MonitorState>>,
    config: Arc<MonitorConfig>,
}

impl Default for ExpectationMonitor {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl ExpectationMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        ExpectationMonitor {
            state: Default::default(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn declare_expected(
        &self,
        severity: Severity,
        pattern: impl Into<Pattern>,
    ) {
        let exp = Expectation::new(severity, pattern);
        trace!("expecting {}", exp);
        self.state.lock().pending.push(exp);
    }

    /// Tolerates matching diagnostics until the next verification.
    /// They neither satisfy an expectation nor fail verification.
    pub fn allow(&self, severity: Severity, pattern: impl Into<Pattern>) {
        self.state.lock().allowed.push(Expectation::new(severity, pattern));
    }

    pub fn on_diagnostic(&self, diagnostic: Diagnostic) {
        let mut state = self.state.lock();
        let state = &mut *state;

        let idx = state.pending.iter().position(|exp| exp.matches(&diagnostic));
        if let Some(idx) = idx {
            // Preserve declaration order for failure reports
            let exp = state.pending.remove(idx);
            debug!("matched {}: {}", exp, diagnostic);
            state.matched += 1;
        } else if state.allowed.iter().any(|exp| exp.matches(&diagnostic)) {
            debug!("tolerated: {}", diagnostic);
            state.tolerated += 1;
        } else if self.config.monitors(diagnostic.severity) {
            debug!("unexpected: {}", diagnostic);
            state.unexpected.push(diagnostic);
        } else {
            trace!("ignored: {}", diagnostic);
            state.ignored += 1;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn unexpected_count(&self) -> usize {
        self.state.lock().unexpected.len()
    }

    /// True if verifying now would pass.
    pub fn is_clear(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && state.unexpected.is_empty()
    }

    /// Discards all state without judging it.
    pub fn reset(&self) {
        self.state.lock().take();
    }

    /// Checks that every declared expectation was reported and nothing
    /// unexpected was. State is cleared whatever the result.
    pub fn verify_all_found(&self) -> Result<VerifySummary, VerifyFailure> {
        let state = self.state.lock().take();
        if state.pending.is_empty() && state.unexpected.is_empty() {
            Ok(VerifySummary {
                matched: state.matched,
                tolerated: state.tolerated,
                ignored: state.ignored,
            })
        } else {
            Err(VerifyFailure {
                unmatched: state.pending,
                unexpected: state.unexpected,
            })
        }
    }

    /// Flushes deferred work before verifying. A flush failure is fatal
    /// and still clears state.
    pub fn verify_all_found_after(&self, barrier: &dyn Barrier) ->
        Result<VerifySummary, VerifyError>
    {
        if let Err(e) = barrier.flush(self.config.flush_timeout) {
            self.reset();
            return Err(e.into());
        }
        Ok(self.verify_all_found()?)
    }
}

impl DiagnosticSink for ExpectationMonitor {
    fn handle(&self, diagnostic: Diagnostic) {
        self.on_diagnostic(diagnostic);
    }
}


#[cfg(test)]
unit::collect_tests![tests];
