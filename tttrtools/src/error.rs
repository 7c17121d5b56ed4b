//! Error type shared by the decoder, the binning tables and the PTU codec

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A special record whose channel code falls in a reserved region
    #[error("malformed record {record:#010x} at index {index}")]
    MalformedRecord { index: usize, record: u32 },

    /// Channel/kind combination that can never match a record
    #[error("invalid record selection: {0}")]
    InvalidSelection(String),

    #[error("invalid bin configuration: {0}")]
    InvalidBinConfiguration(&'static str),

    /// Type code not understood by the tag codec
    #[error("unknown tag type code {0:#010x}")]
    UnknownTagType(u32),

    /// Tag id absent from the known-tag registry, so its type cannot be inferred
    #[error("unknown tag id {0:?}")]
    UnknownTag(String),

    #[error("tag id {0:?} is longer than 32 bytes")]
    TagIdTooLong(String),

    #[error("value for tag {id:?} does not fit type {typ}")]
    TagValueMismatch { id: String, typ: &'static str },

    #[error("not a PTU file (bad magic)")]
    BadMagic,

    #[error("truncated PTU file: {0}")]
    Truncated(&'static str),

    #[error("no record format for model {model:?} in mode {mode}")]
    UnknownRecordFormat { model: String, mode: i64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
