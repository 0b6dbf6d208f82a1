use std::time::Duration;

use derive_more::Display;
use enum_map::EnumMap;

use crate::{ParseSeverityError, Severity};

pub const SEVERITIES_VAR: &str = "VIGIL_MONITOR_SEVERITIES";
pub const FLUSH_TIMEOUT_VAR: &str = "VIGIL_FLUSH_TIMEOUT_MS";

const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Which diagnostics count as failures when nobody expected them, and
/// how long verification waits for deferred work.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub monitored: EnumMap<Severity, bool>,
    pub flush_timeout: Duration,
}

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display(fmt = "{}: {}", SEVERITIES_VAR, _0)]
    Severity(ParseSeverityError),
    #[display(fmt = "{}: invalid timeout `{}`", FLUSH_TIMEOUT_VAR, _0)]
    Timeout(String),
}

impl std::error::Error for ConfigError {}

impl Default for MonitorConfig {
    /// Warnings and errors are monitored. Informational and verbose
    /// output is chatter unless a test asks for it.
    fn default() -> Self {
        MonitorConfig::with_monitored(&[Severity::Warning, Severity::Error])
    }
}

impl MonitorConfig {
    pub fn with_monitored(severities: &[Severity]) -> Self {
        let mut monitored = EnumMap::default();
        for &severity in severities {
            monitored[severity] = true;
        }
        MonitorConfig {
            monitored,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    pub fn flush_timeout(self, flush_timeout: Duration) -> Self {
        MonitorConfig { flush_timeout, ..self }
    }

    pub fn monitors(&self, severity: Severity) -> bool {
        self.monitored[severity]
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) ->
        Result<Self, ConfigError>
    {
        let mut config = MonitorConfig::default();
        if let Some(list) = lookup(SEVERITIES_VAR) {
            config.monitored = parse_severities(&list)?;
        }
        if let Some(ms) = lookup(FLUSH_TIMEOUT_VAR) {
            let ms: u64 = ms.trim().parse()
                .map_err(|_| ConfigError::Timeout(ms.clone()))?;
            config.flush_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

/// Parses a comma-separated severity list. `all` and `none` are
/// accepted as shorthands.
pub fn parse_severities(list: &str) -> Result<EnumMap<Severity, bool>, ConfigError>
{
    let mut monitored = EnumMap::default();
    match list.trim() {
        "all" => return Ok(EnumMap::from_fn(|_| true)),
        "none" | "" => return Ok(monitored),
        _ => {},
    }
    for item in list.split(',') {
        let severity: Severity = item.parse().map_err(ConfigError::Severity)?;
        monitored[severity] = true;
    }
    Ok(monitored)
}


#[cfg(test)]
unit::collect_tests![tests];
