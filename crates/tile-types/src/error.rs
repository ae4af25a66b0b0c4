use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown data type code: {0}")]
    UnknownDataType(u8),

    #[error("unknown compression code: {0}")]
    UnknownCompression(u8),

    #[error("compression level {level} out of range for {scheme}")]
    InvalidLevel { scheme: &'static str, level: i32 },
}
