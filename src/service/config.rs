//! Service configuration: which layers open transactional boundaries.

use std::fmt;
use std::str::FromStr;

/// Marks the log message that the demo log store refuses to save.
pub const DEFAULT_FAILURE_MARKER: &str = "log-exception";

/// Which participants of a join are transactional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// The service method opens a boundary around both saves.
    pub service_transactional: bool,
    /// The member repository opens its own boundary around `save`.
    pub member_repository_transactional: bool,
    /// The log repository opens its own boundary around `save`.
    pub log_repository_transactional: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::outer_tx_on()
    }
}

impl ServiceConfig {
    /// Service off, repositories on: each save is its own transaction.
    pub fn outer_tx_off() -> Self {
        Self {
            service_transactional: false,
            member_repository_transactional: true,
            log_repository_transactional: true,
        }
    }

    /// Service on, repositories off: one transaction opened by the service.
    pub fn single_tx() -> Self {
        Self {
            service_transactional: true,
            member_repository_transactional: false,
            log_repository_transactional: false,
        }
    }

    /// Everything on: repositories join the service's transaction.
    pub fn outer_tx_on() -> Self {
        Self {
            service_transactional: true,
            member_repository_transactional: true,
            log_repository_transactional: true,
        }
    }

    /// Set service_transactional flag.
    pub fn service_transactional(mut self, value: bool) -> Self {
        self.service_transactional = value;
        self
    }

    /// Set member_repository_transactional flag.
    pub fn member_repository_transactional(mut self, value: bool) -> Self {
        self.member_repository_transactional = value;
        self
    }

    /// Set log_repository_transactional flag.
    pub fn log_repository_transactional(mut self, value: bool) -> Self {
        self.log_repository_transactional = value;
        self
    }
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool| if on { "on" } else { "off" };
        write!(
            f,
            "service={} member_repository={} log_repository={}",
            flag(self.service_transactional),
            flag(self.member_repository_transactional),
            flag(self.log_repository_transactional)
        )
    }
}

/// Parse a preset name.
impl FromStr for ServiceConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "outer-off" | "outer_tx_off" => Ok(Self::outer_tx_off()),
            "single" | "single_tx" => Ok(Self::single_tx()),
            "outer-on" | "outer_tx_on" => Ok(Self::outer_tx_on()),
            _ => Err(format!("unknown service configuration: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(ServiceConfig::default(), ServiceConfig::outer_tx_on());
        assert_eq!("single".parse::<ServiceConfig>().unwrap(), ServiceConfig::single_tx());
        assert_eq!(
            "OUTER-OFF".parse::<ServiceConfig>().unwrap(),
            ServiceConfig::outer_tx_off()
        );
        assert!("nested".parse::<ServiceConfig>().is_err());
    }

    #[test]
    fn test_builder_and_display() {
        let config = ServiceConfig::outer_tx_on().log_repository_transactional(false);
        assert_eq!(
            config.to_string(),
            "service=on member_repository=on log_repository=off"
        );
    }
}
