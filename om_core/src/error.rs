//! Error taxonomy for the OM format core.
//!
//! Structural errors (magic, version, trailer), bounds errors (request vs
//! dims), integrity errors (LUT, chunk sizes), codec errors, and propagated
//! I/O. Every variant carries enough context (axis, range, chunk index) for
//! the layer above to report without re-deriving state. Malformed file data
//! never panics; it surfaces here.

use std::ops::Range;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmError>;

#[derive(Debug, Error)]
pub enum OmError {
    /// The first two bytes are not the OM magic.
    #[error("not an OM file (bad magic bytes)")]
    NotAnOmFile,

    /// The version byte is outside the supported set {1, 2, 3}.
    #[error("unsupported OM format version {found} (supported: 1, 2, 3)")]
    UnsupportedVersion { found: u8 },

    /// A requested window exceeds the array bounds on `axis`.
    #[error("axis {axis}: requested range {range:?} outside of {allowed:?}")]
    DimensionOutOfBounds {
        axis: usize,
        range: Range<u64>,
        allowed: Range<u64>,
    },

    /// The chunk lookup table is internally inconsistent.
    #[error("corrupt chunk lookup table: {reason}")]
    CorruptLut { reason: String },

    /// The trailing metadata block is structurally invalid.
    #[error("corrupt metadata trailer: {reason}")]
    CorruptTrailer { reason: String },

    /// The entropy decoder consumed a different byte count than the LUT
    /// predicted for this chunk.
    #[error(
        "chunk {chunk_index}: decoder consumed {consumed} bytes, lookup table predicts {expected}"
    )]
    ChunkDecodeMismatch {
        chunk_index: u64,
        expected: u64,
        consumed: u64,
    },

    /// A supplied buffer window does not line up with the operation.
    #[error("window {window:?} incompatible with buffer dims {dims:?}: {reason}")]
    WindowShape {
        window: Vec<Range<u64>>,
        dims: Vec<u64>,
        reason: &'static str,
    },

    /// Request rank differs from the file's rank.
    #[error("rank mismatch: file has {file} dimensions, request has {request}")]
    RankMismatch { file: usize, request: usize },

    /// Dims/chunks/scale rejected at construction time.
    #[error("invalid array descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// The writer was finished before all chunks were supplied.
    #[error("only {written} of {expected} chunks were written before finish")]
    IncompleteWrite { written: u64, expected: u64 },

    /// More chunk data was supplied than the array holds.
    #[error("all {expected} chunks already written; no further data accepted")]
    WriteBeyondEnd { expected: u64 },

    #[error("chunk codec error: {0}")]
    Codec(#[from] om_codecs::CodecError),

    #[error("metadata trailer is not valid JSON: {0}")]
    TrailerJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
