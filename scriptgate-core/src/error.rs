use std::path::PathBuf;

/// Errors produced by the `scriptgate-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid YAML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The top level of the document is not a key-value mapping.
    #[error("config document must be a key-value mapping")]
    NotAMapping,

    /// A required key is absent or empty.
    #[error("required config key '{key}' is missing or empty")]
    MissingKey { key: String },

    /// A key is present but its value cannot be used.
    #[error("invalid value '{value}' for config key '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
