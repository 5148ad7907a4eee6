use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Line errors
    #[error("Line decode error: {0}")]
    Decode(String),

    #[error("Line too long: {size} bytes (max {max_size})")]
    LineTooLong { size: usize, max_size: usize },

    // Session errors
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
