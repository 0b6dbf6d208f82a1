use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use derivative::Derivative;
use derive_more::Display;
use log::warn;
use parking_lot::Mutex;

use crate::Diagnostic;

/// Receives every diagnostic emitted while it is attached.
pub trait DiagnosticSink: fmt::Debug + Send + Sync {
    fn handle(&self, diagnostic: Diagnostic);
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SinkError {
    #[display(fmt = "a diagnostic sink is already attached")]
    AlreadyAttached,
}

impl std::error::Error for SinkError {}

/// The endpoint the external layer reports into. Forwards each event,
/// in emission order, to the currently attached sink.
///
/// Events are delivered while holding the dispatcher lock, so events
/// raised concurrently on different threads are serialized. A sink must
/// not dispatch from inside `handle`.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct Dispatcher {
    #[derivative(Debug = "ignore")]
    sink: Mutex<Option<(u64, Arc<dyn DiagnosticSink>)>>,
    generation: AtomicU64,
    delivered: AtomicU64,
    stray: AtomicU32,
}

impl Dispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Default::default())
    }

    /// Attaches `sink` until the returned registration is dropped.
    pub fn attach(self: &Arc<Self>, sink: Arc<dyn DiagnosticSink>) ->
        Result<Registration, SinkError>
    {
        let mut slot = self.sink.lock();
        if slot.is_some() {
            return Err(SinkError::AlreadyAttached);
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        *slot = Some((generation, sink));
        Ok(Registration {
            dispatcher: Arc::clone(self),
            generation,
        })
    }

    pub fn dispatch(&self, diagnostic: Diagnostic) {
        let slot = self.sink.lock();
        match *slot {
            Some((_, ref sink)) => {
                sink.handle(diagnostic);
                self.delivered.fetch_add(1, Ordering::Relaxed);
            },
            None => {
                warn!("diagnostic with no sink attached: {}", diagnostic);
                self.stray.fetch_add(1, Ordering::Relaxed);
            },
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Number of events forwarded to a sink.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of events that arrived while nothing was attached.
    pub fn stray_count(&self) -> u32 {
        self.stray.load(Ordering::Relaxed)
    }

    fn detach(&self, generation: u64) {
        let mut slot = self.sink.lock();
        if matches!(*slot, Some((current, _)) if current == generation) {
            *slot = None;
        }
    }
}

/// Keeps a sink attached to a dispatcher. Detaches on drop.
#[derive(Debug)]
#[must_use = "the sink is detached as soon as the registration is dropped"]
pub struct Registration {
    dispatcher: Arc<Dispatcher>,
    generation: u64,
}

impl Registration {
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn detach(self) {}
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.dispatcher.detach(self.generation);
    }
}


#[cfg(test)]
unit::collect_tests![tests];
