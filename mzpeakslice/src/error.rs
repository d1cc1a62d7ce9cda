use thiserror::Error;

/// An error that prevents a feature finding run from starting.
///
/// Empty inputs and signals that fall below a threshold are not errors,
/// they simply produce no features.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureFinderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Inconsistent input for {context}: expected {expected} entries, found {found}")]
    InconsistentInput {
        context: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl FeatureFinderError {
    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}
