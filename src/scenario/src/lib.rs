//! Negative test scenarios: bring up an environment, declare the
//! diagnostics an invalid operation must trigger, perform it, and
//! verify that exactly those were reported.

#[cfg(test)]
macro_rules! test_type {
    () => { unit::PlainTest }
}

mod capability;
mod context;
mod environment;
mod error;
mod scenario;

pub use capability::*;
pub use context::*;
pub use environment::*;
pub use error::*;
pub use scenario::*;

pub mod testing;

unit::collect_tests![
    capability,
    context,
    environment,
    testing,
];

#[cfg(test)]
fn main() {
    env_logger::init();
    let mut builder = unit::TestDriverBuilder::parse_args();
    __collect_tests(&mut builder);
    builder.build_basic().run_and_exit();
}
