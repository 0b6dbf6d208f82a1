use std::io;
use std::sync::{Arc, Mutex};

use vigil_unit::*;

/// Report sink the test binaries can read back after a run.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.inner.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs plain tests with the report captured instead of printed.
pub fn run_captured(mut builder: TestDriverBuilder<PlainTest>) ->
    (TestDriver<fn()>, String)
{
    let buffer = SharedBuffer::default();
    let reporter = StandardTestReporter::with_output(buffer.clone());
    builder.set_reporter(Box::new(reporter));
    let mut driver = builder.build_basic();
    driver.run();
    (driver, buffer.contents())
}

pub fn outcomes<D>(driver: &TestDriver<D>) -> Vec<Outcome> {
    driver.results().iter().map(|res| res.outcome()).collect()
}
