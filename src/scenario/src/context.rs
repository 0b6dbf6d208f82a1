use log::info;
use unit::{Failure, PanicTestContext, Test, TestDriverBuilder};

use crate::*;

pub type ScenarioFn = fn() -> Result<(), ScenarioError>;
pub type ScenarioTest = Test<ScenarioFn>;

/// Runs scenario functions, turning the skip signal into a skipped
/// outcome and any other error into a failure carrying its report.
#[derive(Debug, Default)]
pub struct ScenarioInvoker;

impl unit::PanicTestInvoker<ScenarioFn> for ScenarioInvoker {
    fn invoke(&self, test: &ScenarioTest) -> Result<(), Failure> {
        match (test.data())() {
            Ok(()) => Ok(()),
            Err(e) if e.is_skip() => {
                info!("{}: {}", test.name(), e);
                Err(Failure::skipped(e.to_string()))
            },
            Err(e) => Err(Failure::failed(e.to_string())),
        }
    }
}

pub type CollectFn = fn(&mut TestDriverBuilder<ScenarioTest>);

/// Entry point for scenario test binaries. Parses the command line,
/// runs every collected scenario, and exits with the verdict.
pub fn run_scenarios(collect: CollectFn) -> ! {
    let mut builder = TestDriverBuilder::<ScenarioTest>::parse_args();
    collect(&mut builder);
    let capture = !builder.config().disable_capture;
    let context = PanicTestContext::new(ScenarioInvoker, capture);
    builder.build(Box::new(context)).run_and_exit()
}


#[cfg(test)]
unit::collect_tests![tests];
