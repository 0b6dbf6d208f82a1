//! Drives one scenario through its phases. Each phase is its own type,
//! so declaring, performing and verifying can only happen in order:
//!
//! ```text
//! Idle --negotiate--> Ready --expect--> Armed --perform--> Performed
//!                       ^                                      |
//!                       +---------------- verify --------------+
//! ```
use std::sync::Arc;

use log::debug;
use monitor::{
    Dispatcher, ExpectationMonitor, MonitorConfig, Pattern,
    Registration, Severity, VerifySummary,
};

use crate::*;

/// Nothing is running yet; the monitor is attached and waiting.
#[derive(Debug)]
pub struct Idle;

/// The environment is up and no expectations are pending.
#[derive(Debug)]
pub struct Ready<E> {
    env: E,
}

/// Expectations are declared and the operation has not run yet.
#[derive(Debug)]
pub struct Armed<E> {
    env: E,
}

/// The operation ran; what it reported is still unjudged.
#[derive(Debug)]
pub struct Performed<E, T> {
    env: E,
    output: T,
}

#[derive(Debug)]
pub struct Scenario<S> {
    name: String,
    state: S,
    monitor: ExpectationMonitor,
    registration: Registration,
}

impl<S> Scenario<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn monitor(&self) -> &ExpectationMonitor {
        &self.monitor
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.registration.dispatcher()
    }

    fn map<T>(self, f: impl FnOnce(S) -> T) -> Scenario<T> {
        Scenario {
            name: self.name,
            state: f(self.state),
            monitor: self.monitor,
            registration: self.registration,
        }
    }
}

impl Scenario<Idle> {
    /// Creates a scenario monitoring the severities named by the
    /// process environment.
    pub fn new(name: impl Into<String>) -> Result<Self, ScenarioError> {
        let config = MonitorConfig::from_env()
            .map_err(|e| ScenarioError::Setup(e.into()))?;
        Self::with_config(name, config)
    }

    pub fn with_config(name: impl Into<String>, config: MonitorConfig) ->
        Result<Self, ScenarioError>
    {
        let monitor = ExpectationMonitor::new(config);
        let dispatcher = Dispatcher::new();
        let registration = dispatcher.attach(Arc::new(monitor.clone()))?;
        Ok(Scenario {
            name: name.into(),
            state: Idle,
            monitor,
            registration,
        })
    }

    pub fn negotiate<E: Environment>(self, negotiation: &Negotiation) ->
        Result<Scenario<Ready<E>>, ScenarioError>
    {
        let dispatcher = Arc::clone(self.dispatcher());
        self.negotiate_with(|| E::negotiate(negotiation, dispatcher))
    }

    /// Like `negotiate`, but with a custom constructor for the
    /// environment. Anything it reports while coming up must be
    /// expected or tolerated, or the scenario fails here.
    pub fn negotiate_with<E: Environment>(
        self,
        create: impl FnOnce() -> Result<E, ScenarioError>,
    ) -> Result<Scenario<Ready<E>>, ScenarioError> {
        let env = create()?;
        debug!("{}: negotiated {}", self.name, env.capabilities().api_version);
        self.monitor.verify_all_found_after(env.barrier())?;
        Ok(self.map(|Idle| Ready { env }))
    }
}

impl<E: Environment> Scenario<Ready<E>> {
    pub fn env(&self) -> &E {
        &self.state.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.state.env
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.state.env.capabilities()
    }

    /// Skips the scenario unless the environment meets `req`.
    pub fn require(self, req: &Requirements) -> Result<Self, ScenarioError> {
        self.capabilities().check(req)?;
        Ok(self)
    }

    /// Tolerates matching diagnostics until the next verification.
    pub fn allow(self, severity: Severity, pattern: impl Into<Pattern>) ->
        Self
    {
        self.monitor.allow(severity, pattern);
        self
    }

    pub fn expect(self, severity: Severity, pattern: impl Into<Pattern>) ->
        Scenario<Armed<E>>
    {
        self.expect_none().expect(severity, pattern)
    }

    pub fn expect_error(self, pattern: impl Into<Pattern>) ->
        Scenario<Armed<E>>
    {
        self.expect(Severity::Error, pattern)
    }

    /// Arms the scenario with no expectations: the operation must not
    /// report anything monitored.
    pub fn expect_none(self) -> Scenario<Armed<E>> {
        self.map(|Ready { env }| Armed { env })
    }

    /// Runs one full declare, perform and verify cycle.
    pub fn check(
        self,
        severity: Severity,
        pattern: impl Into<Pattern>,
        op: impl FnOnce(&mut E),
    ) -> Result<Self, ScenarioError> {
        self.expect(severity, pattern).perform(op).verify()
    }

    /// Checks that nothing arrived since the last verification, then
    /// tears the environment down. Diagnostics raised during teardown
    /// are judged too.
    pub fn finish(self) -> Result<(), ScenarioError> {
        let Scenario { name, state: Ready { env }, monitor, registration } =
            self;
        monitor.verify_all_found_after(env.barrier())?;
        drop(env);
        let summary = monitor.verify_all_found()?;
        debug!("{}: finished ({:?})", name, summary);
        registration.detach();
        Ok(())
    }
}

impl<E: Environment> Scenario<Armed<E>> {
    pub fn env(&self) -> &E {
        &self.state.env
    }

    pub fn expect(self, severity: Severity, pattern: impl Into<Pattern>) ->
        Self
    {
        self.monitor.declare_expected(severity, pattern);
        self
    }

    pub fn expect_error(self, pattern: impl Into<Pattern>) -> Self {
        self.expect(Severity::Error, pattern)
    }

    pub fn allow(self, severity: Severity, pattern: impl Into<Pattern>) ->
        Self
    {
        self.monitor.allow(severity, pattern);
        self
    }

    /// Runs the operation expected to trigger the declared
    /// diagnostics.
    pub fn perform<T>(self, op: impl FnOnce(&mut E) -> T) ->
        Scenario<Performed<E, T>>
    {
        self.map(|Armed { mut env }| {
            let output = op(&mut env);
            Performed { env, output }
        })
    }
}

impl<E: Environment, T> Scenario<Performed<E, T>> {
    pub fn env(&self) -> &E {
        &self.state.env
    }

    pub fn output(&self) -> &T {
        &self.state.output
    }

    /// Flushes deferred work, then judges everything reported since the
    /// scenario was armed. On success the scenario can be armed again.
    pub fn verify(self) -> Result<Scenario<Ready<E>>, ScenarioError> {
        self.verify_output().map(|(scenario, _)| scenario)
    }

    /// Like `verify`, but hands back what the operation returned.
    pub fn verify_output(self) ->
        Result<(Scenario<Ready<E>>, T), ScenarioError>
    {
        let summary = self.verify_summary()?;
        let Scenario { name, state, monitor, registration } = self;
        debug!("{}: verified ({:?})", name, summary);
        let Performed { env, output } = state;
        let scenario = Scenario {
            name,
            state: Ready { env },
            monitor,
            registration,
        };
        Ok((scenario, output))
    }

    fn verify_summary(&self) -> Result<VerifySummary, ScenarioError> {
        let barrier = self.state.env.barrier();
        Ok(self.monitor.verify_all_found_after(barrier)?)
    }
}
