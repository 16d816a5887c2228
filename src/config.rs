use crate::propagation::Propagation;
use crate::{Error, Result};

/// Environment variable read by [`TransactionConfig::from_env`] for the
/// default propagation.
pub const ENV_DEFAULT_PROPAGATION: &str = "TX_DEFAULT_PROPAGATION";

/// Environment variable read by [`TransactionConfig::from_env`] for the
/// savepoint name prefix.
pub const ENV_SAVEPOINT_PREFIX: &str = "TX_SAVEPOINT_PREFIX";

/// Settings shared by every context of a [`crate::TransactionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    default_propagation: Propagation,
    savepoint_prefix: String,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_propagation: Propagation::Required,
            savepoint_prefix: "SAVEPOINT_".to_string(),
        }
    }
}

impl TransactionConfig {
    /// Same as [`TransactionConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from the environment, falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unknown propagation name or
    /// an invalid savepoint prefix.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(ENV_DEFAULT_PROPAGATION) {
            config.default_propagation = value.parse()?;
        }
        if let Ok(value) = std::env::var(ENV_SAVEPOINT_PREFIX) {
            config = config.with_savepoint_prefix(value)?;
        }
        Ok(config)
    }

    /// Propagation used by [`crate::TransactionManager::run`].
    pub fn default_propagation(&self) -> Propagation {
        self.default_propagation
    }

    /// Prefix of the savepoint names created for `NESTED` calls.
    pub fn savepoint_prefix(&self) -> &str {
        &self.savepoint_prefix
    }

    /// Sets the propagation used by [`crate::TransactionManager::run`].
    pub fn with_default_propagation(mut self, propagation: Propagation) -> Self {
        self.default_propagation = propagation;
        self
    }

    /// Sets the prefix of generated savepoint names.
    ///
    /// The prefix ends up in SQL text, so it must be a plain identifier:
    /// ASCII letters, digits and underscores, not starting with a digit.
    pub fn with_savepoint_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        let valid = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::InvalidConfig(format!(
                "savepoint prefix {prefix:?} is not a valid identifier"
            )));
        }
        self.savepoint_prefix = prefix;
        Ok(self)
    }
}
