//! Configuration and I/O error type shared by binaries

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configured URL that does not parse or is not http(s)
    #[error("Configuration error: {field} must be an http:// or https:// URL, got {value:?}")]
    InvalidUrl { field: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
