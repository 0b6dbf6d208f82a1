//! Collects diagnostics reported by a validation layer and checks them
//! against what a test declared it expects.

#![allow(clippy::new_ret_no_self)]

#[cfg(test)]
macro_rules! test_type {
    () => { unit::PlainTest }
}

mod barrier;
mod config;
mod diagnostic;
mod matcher;
mod monitor;
mod sink;

pub use barrier::*;
pub use config::*;
pub use diagnostic::*;
pub use matcher::*;
pub use monitor::*;
pub use sink::*;

#[cfg(test)]
unit::collect_tests![
    config,
    diagnostic,
    matcher,
    monitor,
    sink,
];

#[cfg(test)]
fn main() {
    env_logger::init();
    let mut builder = unit::TestDriverBuilder::parse_args();
    __collect_tests(&mut builder);
    builder.build_basic().run_and_exit();
}
