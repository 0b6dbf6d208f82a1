//! A small custom test runner. Test binaries opt out of libtest
//! (`harness = false`) and drive their tests through `TestDriver`,
//! which adds outcomes libtest lacks: expected failures and tests
//! skipped because the environment cannot run them.
use std::fmt;

use derive_more::Display;
use enum_map::Enum;

mod config;
mod context;
mod filter;
#[macro_use]
mod macros;
mod reporter;

pub use config::*;
pub use context::*;
pub use filter::*;
pub use reporter::*;

/// Provides the environment in which tests are run.
pub trait TestContext<T>: fmt::Debug {
    fn run(&mut self, test: &T) -> Result<(), Failure>;
}

/// Why a test did not pass.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum Failure {
    /// The test failed, with whatever output it produced.
    #[display(fmt = "failed")]
    Failed(Option<String>),
    /// The test could not run in this environment. Skips are excluded
    /// from pass/fail accounting.
    #[display(fmt = "skipped: {}", _0)]
    Skipped(String),
}

impl Failure {
    pub fn failed(msg: impl Into<String>) -> Self {
        Failure::Failed(Some(msg.into()))
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Failure::Skipped(reason.into())
    }
}

/// The interpretation of the results of an executed test.
#[derive(Clone, Copy, Debug, Enum, Eq, PartialEq)]
pub enum Outcome {
    Passed,
    Failed,
    Xpassed,
    Xfailed,
    Ignored,
    Filtered,
    Skipped,
}

impl Outcome {
    pub fn is_critical(&self) -> bool {
        [Outcome::Failed, Outcome::Xpassed].contains(self)
    }
}

/// The output from a test.
#[derive(Clone, Debug)]
pub struct TestResult {
    outcome: Outcome,
    output: Option<String>,
}

impl TestResult {
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }
}

/// Exports or displays test results.
pub trait TestReporter<T>: fmt::Debug {
    /// Called at the beginning of testing.
    fn before_all(&mut self, tests: &[T]);

    /// Called in real time after each test is started.
    fn before_each(&mut self, test: &T);

    /// Called in real time after each test is completed.
    fn after_each(&mut self, test: &T, result: &TestResult);

    /// Called once all tests are finished.
    fn after_all(&mut self, tests: &[T], results: &[TestResult]);
}

macro_rules! test_attrs {
    ($($(#[$doc:meta])* $attr:ident,)*) => {
        /// Attributes attached to a test by `declare_tests!`.
        #[derive(Clone, Debug, Default)]
        pub struct TestAttrs {
            $($attr: bool,)*
        }

        impl TestAttrs {
            pub fn new() -> Self {
                Default::default()
            }

            $(
                $(#[$doc])*
                pub fn $attr(mut self) -> Self {
                    self.$attr = true;
                    self
                }
            )*

            pub fn build_test<D>(self, name: String, data: D) -> Test<D> {
                Test { name, attrs: self, data }
            }
        }

        impl<D> Test<D> {
            $(pub fn $attr(&self) -> bool { self.attrs.$attr })*
        }
    }
}

test_attrs! {
    /// Skipped unless ignored tests are included in the run.
    ignore,
    /// Failing is the expected result; passing is reported as critical.
    xfail,
    /// Passes only if the test body fails.
    should_err,
}

/// A named test and the data its context needs to run it.
#[derive(Clone, Debug)]
pub struct Test<D> {
    name: String,
    attrs: TestAttrs,
    data: D,
}

impl<D> Test<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &D {
        &self.data
    }
}

/// Collects tests for execution and allows configuring how tests are
/// processed.
#[derive(Debug, Default)]
pub struct TestDriverBuilder<T> {
    tests: Vec<T>,
    reporter: Option<Box<dyn TestReporter<T>>>,
    config: RunnerConfig,
}

impl<T> TestDriverBuilder<T> {
    pub fn new() -> Self {
        TestDriverBuilder {
            tests: Vec::new(),
            reporter: None,
            config: Default::default(),
        }
    }

    /// Creates a builder configured from the process command line.
    pub fn parse_args() -> Self {
        let mut builder = Self::new();
        builder.set_config(RunnerConfig::from_args(std::env::args_os()));
        builder
    }

    pub fn add_test(&mut self, test: T) -> &mut Self {
        self.tests.push(test);
        self
    }

    pub fn add_tests(&mut self, tests: impl IntoIterator<Item = T>) ->
        &mut Self
    {
        self.tests.extend(tests);
        self
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn TestReporter<T>>) ->
        &mut Self
    {
        self.reporter = Some(reporter);
        self
    }

    pub fn set_config(&mut self, config: RunnerConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

impl<D> TestDriverBuilder<Test<D>> {
    pub fn build(self, context: Box<dyn TestContext<Test<D>>>) ->
        TestDriver<D>
    {
        let quiet = self.config.quiet;
        let reporter = self.reporter.unwrap_or_else(|| {
            Box::new(StandardTestReporter::stdout().quiet(quiet))
        });
        TestDriver {
            tests: self.tests,
            results: Vec::new(),
            reporter,
            context,
            filter: self.config.filter,
            include_ignored: self.config.include_ignored,
        }
    }
}

impl TestDriverBuilder<PlainTest> {
    /// Builds a driver for plain `fn()` tests that fail by panicking.
    pub fn build_basic(self) -> TestDriver<fn()> {
        let capture = !self.config.disable_capture;
        let context = PanicTestContext::new(PlainTestInvoker, capture);
        self.build(Box::new(context))
    }
}

/// Executes tests and reports results.
#[derive(Debug)]
pub struct TestDriver<D> {
    tests: Vec<Test<D>>,
    results: Vec<TestResult>,
    reporter: Box<dyn TestReporter<Test<D>>>,
    context: Box<dyn TestContext<Test<D>>>,
    filter: Option<NameFilter>,
    include_ignored: bool,
}

impl<D> TestDriver<D> {
    /// Runs every collected test. Returns `true` if no outcome was
    /// critical.
    pub fn run(&mut self) -> bool {
        self.results.clear();
        self.reporter.before_all(&self.tests);
        for test in self.tests.iter() {
            self.reporter.before_each(test);

            let result = if !self.filter.is_match(test) {
                TestResult { outcome: Outcome::Filtered, output: None }
            } else if test.ignore() && !self.include_ignored {
                TestResult { outcome: Outcome::Ignored, output: None }
            } else {
                judge(test, self.context.run(test))
            };

            self.reporter.after_each(test, &result);
            self.results.push(result);
        }
        self.reporter.after_all(&self.tests[..], &self.results[..]);
        !self.results.iter().any(|res| res.outcome.is_critical())
    }

    /// Runs every test and exits the process with a failing status if
    /// any outcome was critical.
    pub fn run_and_exit(&mut self) -> ! {
        let passed = self.run();
        std::process::exit(if passed { 0 } else { 101 })
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|res| res.outcome == outcome).count()
    }
}

fn judge<D>(test: &Test<D>, res: Result<(), Failure>) -> TestResult {
    let outcomes = if test.xfail() {
        [Outcome::Xfailed, Outcome::Xpassed]
    } else {
        [Outcome::Failed, Outcome::Passed]
    };
    match res {
        Err(Failure::Skipped(reason)) => TestResult {
            outcome: Outcome::Skipped,
            output: Some(reason),
        },
        res => {
            let passed = res.is_ok() ^ test.should_err();
            let output = match res {
                Err(Failure::Failed(output)) => output,
                _ => None,
            };
            TestResult { outcome: outcomes[passed as usize], output }
        },
    }
}
