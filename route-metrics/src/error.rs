use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A metric could not be created or registered with the registry.
    #[error("failed to register metric {name}: {source}")]
    Registration {
        name: &'static str,
        #[source]
        source: prometheus::Error,
    },

    #[error("Failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true when registration failed because the metric name is
    /// already taken on the registry.
    #[must_use]
    pub fn is_already_registered(&self) -> bool {
        matches!(
            self,
            Self::Registration {
                source: prometheus::Error::AlreadyReg,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
