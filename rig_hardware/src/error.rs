use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial port {port}: {reason}")]
    Serial { port: String, reason: String },
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("link is closed")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
