//! Error types for CareChain

use std::fmt;

#[derive(Debug, Clone)]
pub enum ChainError {
    InvalidBlockLinkage {
        index: u64,
        expected: String,
        found: String,
    },
    InvalidBlockIndex {
        position: usize,
        index: u64,
    },
    InvalidRecord(String),
    NetworkError(String),
    CryptoError(String),
    ConfigError(String),
    IoError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::InvalidBlockLinkage {
                index,
                expected,
                found,
            } => write!(
                f,
                "Invalid block linkage at index {}: expected previous hash {}, found {}",
                index, expected, found
            ),
            ChainError::InvalidBlockIndex { position, index } => write!(
                f,
                "Invalid block index {} at position {}: indices must be consecutive and below u64::MAX",
                index, position
            ),
            ChainError::InvalidRecord(msg) => write!(f, "Invalid record: {}", msg),
            ChainError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ChainError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ChainError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
