use thiserror::Error;

#[derive(Debug, Error)]
pub enum LucidaError {
    #[error("invalid port '{0}': must be a number between 1 and 65535")]
    InvalidPort(String),

    #[error("invalid host '{0}': expected localhost, an IPv4 address or an http(s) URL")]
    InvalidHost(String),

    #[error("{kind} given twice: '{first}' and '{second}'")]
    DuplicateArgument {
        kind: &'static str,
        first: String,
        second: String,
    },

    #[error("too many arguments: expected at most a port and a host, got {0}")]
    TooManyArguments(usize),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, LucidaError>;
