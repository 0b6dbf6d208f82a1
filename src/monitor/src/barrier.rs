use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;

/// Forces deferred work to finish so that every diagnostic it would
/// produce has been emitted by the time `flush` returns.
pub trait Barrier: fmt::Debug {
    fn flush(&self, timeout: Duration) -> Result<(), BarrierError>;
}

#[derive(Debug, Display)]
pub enum BarrierError {
    #[display(fmt = "deferred work did not complete within {:?}", _0)]
    TimedOut(Duration),
    #[display(fmt = "failed to flush deferred work: {}", _0)]
    Failed(anyhow::Error),
}

impl std::error::Error for BarrierError {}

/// For environments where every diagnostic is emitted synchronously.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBarrier;

impl Barrier for NoBarrier {
    fn flush(&self, _timeout: Duration) -> Result<(), BarrierError> {
        Ok(())
    }
}

impl<B: Barrier + ?Sized> Barrier for &B {
    fn flush(&self, timeout: Duration) -> Result<(), BarrierError> {
        (**self).flush(timeout)
    }
}

impl<B: Barrier + ?Sized> Barrier for Arc<B> {
    fn flush(&self, timeout: Duration) -> Result<(), BarrierError> {
        (**self).flush(timeout)
    }
}

impl<B: Barrier + ?Sized> Barrier for Box<B> {
    fn flush(&self, timeout: Duration) -> Result<(), BarrierError> {
        (**self).flush(timeout)
    }
}
