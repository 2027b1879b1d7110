//! Crate-wide error type.
//!
//! Per §7 of the design: errors during per-frame decoding never poison the
//! decoder context. A frame-level `Err` means "drop this picture, keep the
//! reference/CDF state from before this frame" — callers that sit above
//! [`crate::pipeline`] are expected to log and continue rather than abort
//! the whole session.

use thiserror::Error;

/// All error conditions the core can raise.
#[derive(Error, Debug)]
pub enum Av1Error {
    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid bitstream at offset {offset}: {message}")]
    InvalidBitstream { offset: u64, message: String },

    #[error("unsupported profile/feature: {0}")]
    UnsupportedProfile(String),

    #[error("reference frame slot {0} is empty")]
    ReferenceMissing(u8),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("unexpected end of bitstream at bit offset {0}")]
    UnexpectedEof(u64),

    #[error("invalid OBU type: {0}")]
    InvalidObuType(u8),
}

impl Av1Error {
    pub fn invalid_bitstream(offset: u64, message: impl Into<String>) -> Self {
        Av1Error::InvalidBitstream {
            offset,
            message: message.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Av1Error>;
