//! Propagation behavior and transaction definitions.
//!
//! Four behaviors are supported, all of them flat: a participant either joins
//! the physical transaction already active on its context, begins one, or
//! runs without one. Suspending an outer transaction is not supported.

use std::fmt;

/// Decides whether a participant joins, begins, or skips a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Join the active transaction, or begin one if none is active.
    #[default]
    Required,

    /// Join the active transaction, or run non-transactionally.
    Supports,

    /// Join the active transaction; fail if none is active.
    Mandatory,

    /// Run non-transactionally; fail if a transaction is active.
    Never,
}

impl Propagation {
    /// Check if this behavior may begin a new physical transaction.
    pub fn may_begin(&self) -> bool {
        matches!(self, Propagation::Required)
    }

    /// Check if this behavior joins a transaction that is already active.
    pub fn joins_existing(&self) -> bool {
        !matches!(self, Propagation::Never)
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Propagation::Required => write!(f, "REQUIRED"),
            Propagation::Supports => write!(f, "SUPPORTS"),
            Propagation::Mandatory => write!(f, "MANDATORY"),
            Propagation::Never => write!(f, "NEVER"),
        }
    }
}

impl std::str::FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "REQUIRED" => Ok(Propagation::Required),
            "SUPPORTS" => Ok(Propagation::Supports),
            "MANDATORY" => Ok(Propagation::Mandatory),
            "NEVER" => Ok(Propagation::Never),
            _ => Err(format!("unknown propagation: {}", s)),
        }
    }
}

/// How a participant wants to take part in a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionDefinition {
    /// Name used in logs and in the active-transaction registry.
    pub name: Option<String>,
    /// Propagation behavior.
    pub propagation: Propagation,
    /// Only honored when this participant begins the transaction; a joining
    /// participant sees the outer transaction's flag.
    pub read_only: bool,
}

impl TransactionDefinition {
    /// A read-write definition with `Required` propagation.
    pub fn required() -> Self {
        Self::default()
    }

    /// A definition with the given propagation.
    pub fn with_propagation(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Default::default()
        }
    }

    /// Set the name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the read-only flag.
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_propagation() {
        assert_eq!(Propagation::default(), Propagation::Required);
        assert!(Propagation::Required.may_begin());
        assert!(!Propagation::Mandatory.may_begin());
        assert!(!Propagation::Never.joins_existing());
    }

    #[test]
    fn test_parse_propagation() {
        assert_eq!("required".parse::<Propagation>().unwrap(), Propagation::Required);
        assert_eq!("MANDATORY".parse::<Propagation>().unwrap(), Propagation::Mandatory);
        assert!("nested".parse::<Propagation>().is_err());
        assert_eq!(Propagation::Supports.to_string(), "SUPPORTS");
    }

    #[test]
    fn test_definition_builder() {
        let def = TransactionDefinition::required().named("level.read").read_only(true);
        assert_eq!(def.name.as_deref(), Some("level.read"));
        assert_eq!(def.propagation, Propagation::Required);
        assert!(def.read_only);
    }
}
