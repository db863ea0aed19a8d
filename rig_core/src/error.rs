use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RigError {
    #[error("invalid axis: {0}")]
    InvalidAxis(String),
    #[error("no terminal response to '{command}' within {waited_ms} ms")]
    ProtocolTimeout { command: String, waited_ms: u64 },
    #[error("connection to {target} failed after {attempts} attempt(s): {reason}")]
    Connection {
        target: String,
        attempts: u32,
        reason: String,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing axes")]
    MissingAxes,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

impl From<BuildError> for RigError {
    fn from(e: BuildError) -> Self {
        RigError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RigError>;
