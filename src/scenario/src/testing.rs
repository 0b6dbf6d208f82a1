//! An in-process stand-in for an external validation layer, for
//! exercising the scenario machinery without a driver.
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use derivative::Derivative;
use log::trace;
use monitor::{Barrier, BarrierError, Diagnostic, Dispatcher};
use parking_lot::Mutex;

use crate::*;

/// Reports diagnostics either as soon as an operation raises them or
/// once deferred work is flushed.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SimulatedLayer {
    #[derivative(Debug = "ignore")]
    dispatcher: Arc<Dispatcher>,
    deferred: Mutex<VecDeque<Diagnostic>>,
    stalled: AtomicBool,
}

impl SimulatedLayer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        SimulatedLayer {
            dispatcher,
            deferred: Default::default(),
            stalled: AtomicBool::new(false),
        }
    }

    /// Reports during the call that caused it.
    pub fn emit(&self, diagnostic: Diagnostic) {
        self.dispatcher.dispatch(diagnostic);
    }

    /// Reports once the queue is flushed, like validation of work that
    /// a device executes asynchronously.
    pub fn defer(&self, diagnostic: Diagnostic) {
        self.deferred.lock().push_back(diagnostic);
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.lock().len()
    }

    /// While stalled, flushing never completes.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::Relaxed);
    }
}

impl Barrier for SimulatedLayer {
    fn flush(&self, timeout: Duration) -> Result<(), BarrierError> {
        if self.stalled.load(Ordering::Relaxed) {
            return Err(BarrierError::TimedOut(timeout));
        }
        // Release the queue before dispatching so a sink may defer more
        let drained: Vec<_> = self.deferred.lock().drain(..).collect();
        trace!("flushing {} deferred diagnostic(s)", drained.len());
        for diagnostic in drained {
            self.dispatcher.dispatch(diagnostic);
        }
        Ok(())
    }
}

/// A device with the given capabilities whose layer is simulated.
#[derive(Debug)]
pub struct SimulatedEnvironment {
    layer: SimulatedLayer,
    capabilities: Capabilities,
}

impl SimulatedEnvironment {
    /// A device roughly like a desktop GPU that supports everything the
    /// sampler and sparse scenarios ask for.
    pub fn default_device() -> Capabilities {
        let features = [
            "samplerAnisotropy",
            "samplerMirrorClampToEdge",
            "sparseBinding",
            "sparseResidencyBuffer",
            "sparseResidencyImage2D",
            "sparseResidencyImage3D",
            "sparseResidencyAliased",
        ];
        let mut caps = Capabilities::new(ApiVersion::new(1, 3, 0))
            .with_extension("VK_KHR_sampler_mirror_clamp_to_edge")
            .with_limit("maxSamplerAnisotropy", 16.0)
            .with_limit("maxSamplerLodBias", 15.0);
        for &feature in features.iter() {
            caps = caps.with_feature(feature);
        }
        caps
    }

    /// Negotiates against an explicitly described device.
    pub fn with_device(
        device: &Capabilities,
        negotiation: &Negotiation,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, ScenarioError> {
        let capabilities = negotiation.resolve(device)?;
        Ok(SimulatedEnvironment {
            layer: SimulatedLayer::new(dispatcher),
            capabilities,
        })
    }

    pub fn layer(&self) -> &SimulatedLayer {
        &self.layer
    }
}

impl Environment for SimulatedEnvironment {
    fn negotiate(negotiation: &Negotiation, dispatcher: Arc<Dispatcher>) ->
        Result<Self, ScenarioError>
    {
        Self::with_device(&Self::default_device(), negotiation, dispatcher)
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn barrier(&self) -> &dyn Barrier {
        &self.layer
    }
}


#[cfg(test)]
unit::collect_tests![tests];
