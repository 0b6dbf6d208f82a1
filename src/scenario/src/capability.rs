use std::fmt;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;

/// A `major.minor.patch` API version.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ApiVersion(pub [u32; 3]);

impl ApiVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        ApiVersion([major, minor, patch])
    }

    pub fn major(self) -> u32 {
        self.0[0]
    }

    pub fn minor(self) -> u32 {
        self.0[1]
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [major, minor, patch] = self.0;
        write!(f, "{}.{}.{}", major, minor, patch)
    }
}

/// What an environment can do once negotiation has settled.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    pub api_version: ApiVersion,
    pub features: FnvHashSet<String>,
    pub extensions: FnvHashSet<String>,
    pub limits: FnvHashMap<String, f64>,
}

impl Capabilities {
    pub fn new(api_version: ApiVersion) -> Self {
        Capabilities { api_version, ..Default::default() }
    }

    pub fn with_feature(mut self, name: impl Into<String>) -> Self {
        self.features.insert(name.into());
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.insert(name.into());
        self
    }

    pub fn with_limit(mut self, name: impl Into<String>, value: f64) -> Self
    {
        self.limits.insert(name.into(), value);
        self
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains(name)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    pub fn limit(&self, name: &str) -> Option<f64> {
        self.limits.get(name).copied()
    }

    /// Succeeds if every requirement is met. Otherwise lists all of
    /// the unmet ones, not only the first.
    pub fn check(&self, req: &Requirements) -> Result<(), Unsupported> {
        let mut missing = Vec::new();

        if let Some(required) = req.api_version {
            if self.api_version < required {
                missing.push(Missing::ApiVersion {
                    required,
                    available: self.api_version,
                });
            }
        }

        missing.extend(req.features.iter()
            .filter(|name| !self.has_feature(name))
            .map(|name| Missing::Feature(name.clone())));
        missing.extend(req.extensions.iter()
            .filter(|name| !self.has_extension(name))
            .map(|name| Missing::Extension(name.clone())));

        for &(ref name, required) in req.limits.iter() {
            let available = self.limit(name);
            if !available.map_or(false, |value| value >= required) {
                missing.push(Missing::Limit {
                    name: name.clone(),
                    required,
                    available,
                });
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Unsupported { missing })
        }
    }
}

/// What a scenario needs from its environment in order to run.
#[derive(Clone, Debug, Default)]
pub struct Requirements {
    api_version: Option<ApiVersion>,
    features: Vec<String>,
    extensions: Vec<String>,
    limits: Vec<(String, f64)>,
}

impl Requirements {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn api_version(self, version: ApiVersion) -> Self {
        Requirements { api_version: Some(version), ..self }
    }

    pub fn feature(mut self, name: impl Into<String>) -> Self {
        self.features.push(name.into());
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    pub fn limit_at_least(mut self, name: impl Into<String>, value: f64) ->
        Self
    {
        self.limits.push((name.into(), value));
        self
    }
}

/// One requirement the environment failed to meet.
#[derive(Clone, Debug, PartialEq)]
pub enum Missing {
    ApiVersion { required: ApiVersion, available: ApiVersion },
    Feature(String),
    Extension(String),
    Limit { name: String, required: f64, available: Option<f64> },
    /// The environment itself could not be brought up.
    Environment(String),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Missing::ApiVersion { required, available } => write!(
                f, "API version {} required (have {})", required, available,
            ),
            Missing::Feature(name) => write!(f, "feature `{}`", name),
            Missing::Extension(name) => write!(f, "extension `{}`", name),
            Missing::Limit { name, required, available: Some(value) } =>
                write!(f, "limit `{}` >= {} (have {})", name, required, value),
            Missing::Limit { name, required, available: None } =>
                write!(f, "limit `{}` >= {} (not reported)", name, required),
            Missing::Environment(reason) => f.write_str(reason),
        }
    }
}

/// The skip signal: the scenario cannot run here, which is neither a
/// pass nor a failure.
#[derive(Clone, Debug, PartialEq)]
pub struct Unsupported {
    pub missing: Vec<Missing>,
}

impl Unsupported {
    pub fn because(reason: impl Into<String>) -> Self {
        Unsupported { missing: vec![Missing::Environment(reason.into())] }
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.missing.iter().format(", "))
    }
}

impl std::error::Error for Unsupported {}


#[cfg(test)]
unit::collect_tests![tests];
