use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe, RefUnwindSafe};

use crate::*;

/// Implementors of this trait are responsible for running individual
/// tests which may be caught panicking. It is automatically implemented
/// for most types that implement `Fn(&D)`. If this type uses internal
/// mutability, it must be marked as `RefUnwindSafe`, as it will be
/// referenced from inside `catch_unwind`.
pub trait PanicTestInvoker<D>: RefUnwindSafe + std::fmt::Debug {
    /// Runs the test. Returning an error reports a failure (or a skip)
    /// without unwinding.
    fn invoke(&self, test: &Test<D>) -> Result<(), Failure>;
}

impl<D, F> PanicTestInvoker<D> for F
    where F: Fn(&D) + RefUnwindSafe + std::fmt::Debug
{
    fn invoke(&self, test: &Test<D>) -> Result<(), Failure> {
        self(test.data());
        Ok(())
    }
}

/// The test type of the vanilla Rust test runner.
pub type PlainTest = Test<fn()>;

#[derive(Debug, Default)]
pub struct PlainTestInvoker;

impl PanicTestInvoker<fn()> for PlainTestInvoker {
    fn invoke(&self, test: &PlainTest) -> Result<(), Failure> {
        (test.data())();
        Ok(())
    }
}

/// Runs tests where failure is signaled by panicking. This type wraps a
/// "test invocation helper", which is at minimum responsible for
/// running the test, but may optionally do things such as
/// setup/teardown or observing the test's side effects.
///
/// The helper is borrowed immutably inside `catch_unwind`, so stateful
/// setup/teardown must go through internal mutability.
#[derive(Debug, Default)]
pub struct PanicTestContext<F> {
    inner: F,
    capture: bool,
}

impl<F> PanicTestContext<F> {
    pub fn new(inner: F, capture: bool) -> Self {
        PanicTestContext { inner, capture }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

thread_local! {
    static CAPTURED: RefCell<Option<String>> = RefCell::new(None);
}

/// Routes panic messages raised on this thread into a buffer for the
/// duration of the guard. The previous hook is restored on drop.
struct CaptureGuard {
    previous: Option<Box<dyn Fn(&panic::PanicInfo<'_>) + Sync + Send>>,
}

impl CaptureGuard {
    fn install() -> Self {
        let previous = panic::take_hook();
        CAPTURED.with(|buf| *buf.borrow_mut() = Some(String::new()));
        panic::set_hook(Box::new(|info| {
            let msg = format!("{}\n", info);
            let captured = CAPTURED.with(|buf| match *buf.borrow_mut() {
                Some(ref mut buf) => { buf.push_str(&msg); true },
                None => false,
            });
            // Panics on other threads are not ours to swallow
            if !captured {
                eprint!("{}", msg);
            }
        }));
        CaptureGuard { previous: Some(previous) }
    }

    fn take_output(&self) -> Option<String> {
        CAPTURED.with(|buf| buf.borrow_mut().take())
            .filter(|s| !s.is_empty())
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURED.with(|buf| buf.borrow_mut().take());
        if let Some(previous) = self.previous.take() {
            panic::set_hook(previous);
        }
    }
}

impl<D, F> TestContext<Test<D>> for PanicTestContext<F>
where
    D: RefUnwindSafe,
    F: PanicTestInvoker<D>,
{
    fn run(&mut self, test: &Test<D>) -> Result<(), Failure> {
        let guard = self.capture.then(CaptureGuard::install);
        let inner = &self.inner;
        let res = panic::catch_unwind(AssertUnwindSafe(|| inner.invoke(test)));
        let output = guard.as_ref().and_then(CaptureGuard::take_output);
        drop(guard);

        match res {
            Ok(res) => res,
            Err(_) => Err(Failure::Failed(output)),
        }
    }
}
