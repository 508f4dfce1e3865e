use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("front-end bus error: {0}")]
    Bus(String),
    #[error("front-end timeout")]
    Timeout,
    #[error("conversion-complete timeout")]
    ConversionTimeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
