//! Vulkan environment for negative test scenarios: an instance with the
//! validation layer enabled, a device negotiated against the scenario's
//! needs, and a debug messenger feeding layer reports to the monitor.

#[cfg(test)]
macro_rules! test_type {
    () => { unit::PlainTest }
}

mod barrier;
mod debug;
mod device;
mod environment;
mod object;
mod shader;
pub mod testing;

pub use barrier::*;
pub use debug::*;
pub use device::*;
pub use environment::*;
pub use object::*;
pub use shader::*;

#[cfg(test)]
unit::collect_tests![debug, device, object, shader];

#[cfg(test)]
fn main() {
    env_logger::init();
    let mut builder = unit::TestDriverBuilder::parse_args();
    __collect_tests(&mut builder);
    builder.build_basic().run_and_exit();
}
