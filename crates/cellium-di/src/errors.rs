use thiserror::Error;

/// Dependency injection failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiError {
    #[error("No provider registered for {key}")]
    NotRegistered { key: String },

    #[error("Circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    #[error("Container is sealed, cannot register {key}")]
    Sealed { key: String },

    #[error("Provider for {key} failed: {message}")]
    ProviderFailed { key: String, message: String },

    #[error("Provider for {key} produced a value of the wrong type")]
    TypeMismatch { key: String },

    #[error("Global container already initialized")]
    AlreadyInitialized,

    #[error("Global container not initialized")]
    NotInitialized,
}

impl DiError {
    /// Wrap an arbitrary construction error raised inside a provider.
    pub fn provider(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::ProviderFailed {
            key: key.into(),
            message: err.to_string(),
        }
    }
}
