use std::fmt;
use std::sync::Arc;

use fnv::FnvHashSet;
use monitor::{Barrier, Dispatcher};

use crate::*;

/// What a scenario asks of the environment before it comes up.
#[derive(Clone, Debug)]
pub struct Negotiation {
    pub api_version: ApiVersion,
    /// Extensions the environment must enable or report unsupported.
    pub required_extensions: Vec<String>,
    /// Extensions enabled when available.
    pub optional_extensions: Vec<String>,
    /// Features forced off even when the device supports them, so that
    /// scenarios can exercise the "feature not enabled" rules.
    pub disabled_features: FnvHashSet<String>,
}

impl Default for Negotiation {
    fn default() -> Self {
        Negotiation {
            api_version: ApiVersion::new(1, 1, 0),
            required_extensions: Vec::new(),
            optional_extensions: Vec::new(),
            disabled_features: Default::default(),
        }
    }
}

impl Negotiation {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn api_version(self, api_version: ApiVersion) -> Self {
        Negotiation { api_version, ..self }
    }

    pub fn require_extension(mut self, name: impl Into<String>) -> Self {
        self.required_extensions.push(name.into());
        self
    }

    pub fn optional_extension(mut self, name: impl Into<String>) -> Self {
        self.optional_extensions.push(name.into());
        self
    }

    pub fn disable_feature(mut self, name: impl Into<String>) -> Self {
        self.disabled_features.insert(name.into());
        self
    }

    pub fn is_disabled(&self, feature: &str) -> bool {
        self.disabled_features.contains(feature)
    }

    /// Settles what gets enabled given what is available: required
    /// extensions must all be present, optional ones are dropped when
    /// absent, and disabled features are masked out.
    pub fn resolve(&self, available: &Capabilities) ->
        Result<Capabilities, Unsupported>
    {
        let mut req = Requirements::new();
        for ext in self.required_extensions.iter() {
            req = req.extension(ext.clone());
        }
        available.check(&req)?;

        let extensions = self.required_extensions.iter()
            .chain(self.optional_extensions.iter())
            .filter(|ext| available.has_extension(ext))
            .cloned()
            .collect();
        let features = available.features.iter()
            .filter(|name| !self.is_disabled(name))
            .cloned()
            .collect();
        Ok(Capabilities {
            api_version: self.api_version.min(available.api_version),
            features,
            extensions,
            limits: available.limits.clone(),
        })
    }
}

/// The external system a scenario runs against. It reports its
/// diagnostics to the dispatcher it was negotiated with.
pub trait Environment: fmt::Debug + Sized {
    /// Brings the environment up. Returns `Unsupported` when the host
    /// cannot provide it at all.
    fn negotiate(negotiation: &Negotiation, dispatcher: Arc<Dispatcher>) ->
        Result<Self, ScenarioError>;

    fn capabilities(&self) -> &Capabilities;

    /// Forces deferred work to finish before verification.
    fn barrier(&self) -> &dyn Barrier;
}


#[cfg(test)]
unit::collect_tests![tests];
