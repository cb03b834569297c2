//! On-disk envelope: magic, versions, compression tags, trailer metadata,
//! and the legacy version-1 fixed header.
//!
//! Version 3 layout, from offset 0:
//!
//! ```text
//! [0x4F 0x4D 0x03]                      ── 3-byte header
//! [compressed chunk stream]             ── chunks in ascending index order
//! [LUT block]                           ── n_sub_chunks × lut_chunk_length
//! [metadata JSON]                       ── UTF-8, see TrailerMeta
//! [json byte length: u64 LE]            ── 8-byte tail
//! ```
//!
//! A reader locates the metadata by reading the tail at `file_len − 8`.
//! The metadata sits at the end because `lut_offset` and `lut_chunk_length`
//! are unknown until every chunk has been written, which keeps the sink
//! strictly append-only (pipes and network uploads included).
//!
//! Versions 1 and 2 instead carry a fixed 40-byte header followed by an
//! uncompressed `u64` offset table and then the chunk stream.

use serde::{Deserialize, Serialize};

use crate::error::{OmError, Result};

/// File magic: `"OM"`.
pub const MAGIC: [u8; 2] = [0x4F, 0x4D];

/// Version written by this implementation.
pub const FORMAT_VERSION: u8 = 3;

/// Byte length of the version-3 header.
pub const HEADER_LEN: u64 = 3;

/// Byte length of the version-1/2 fixed header.
pub const LEGACY_HEADER_LEN: usize = 40;

/// Byte length of the trailing JSON-length field.
pub const TRAILER_LEN: u64 = 8;

/// Default number of LUT entries compressed per sub-chunk.
pub const DEFAULT_LUT_SUB_CHUNK_SIZE: u64 = 256;

/// Per-chunk compression pipeline variant.
///
/// The three modes differ only in the quantize and delta stages; dispatch
/// is a plain match, resolved once per chunk outside the element loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// `round(v · scale)` into i16, 2D delta, zigzag bitpack.
    IntQuantizedDelta,
    /// Raw f32, 2D XOR-delta over bit patterns, bitpack.
    FloatXorDelta,
    /// `round(log10(1 + v) · scale)` into i16, 2D delta, zigzag bitpack.
    LogIntQuantizedDelta,
}

impl Compression {
    /// Stable name used by the CLI and the trailer JSON.
    pub fn name(self) -> &'static str {
        match self {
            Compression::IntQuantizedDelta => "int_quantized_delta",
            Compression::FloatXorDelta => "float_xor_delta",
            Compression::LogIntQuantizedDelta => "log_int_quantized_delta",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata blob appended after the LUT block, serialized as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailerMeta {
    /// Array dimensions, outermost first.
    pub dims: Vec<u64>,
    /// Chunk extents, same rank as `dims`.
    pub chunks: Vec<u64>,
    /// Multiplier applied before integer quantization.
    pub scale_factor: f32,
    pub compression: Compression,
    /// Total chunk count; `Π ⌈dims[i] / chunks[i]⌉`.
    pub n_chunks: u64,
    /// Absolute file offset of the LUT block.
    pub lut_offset: u64,
    /// On-disk stride of one compressed LUT sub-chunk.
    pub lut_chunk_length: u64,
    /// LUT entries per sub-chunk.
    pub lut_sub_chunk_size: u64,
}

/// Fixed header of version-1/2 files.
///
/// ```text
/// magic[2] version:u8 compression:u8 scale:f32 LE
/// dim0:u64 dim1:u64 chunk0:u64 chunk1:u64        (all LE)
/// ```
///
/// The uncompressed LUT (`n_chunks` × u64 cumulative end offsets) follows
/// at byte 40, then the chunk stream.
#[derive(Debug, Clone)]
pub struct LegacyHeader {
    pub version: u8,
    pub compression: Compression,
    pub scale_factor: f32,
    pub dims: [u64; 2],
    pub chunks: [u64; 2],
}

impl LegacyHeader {
    /// Parse and validate a 40-byte legacy header.
    ///
    /// The stored compression byte is ignored: version-1 writers emitted the
    /// field uninitialized, so it is forced to `IntQuantizedDelta`.
    pub fn from_bytes(buf: &[u8; LEGACY_HEADER_LEN]) -> Result<Self> {
        if buf[..2] != MAGIC {
            return Err(OmError::NotAnOmFile);
        }
        let version = buf[2];
        if !matches!(version, 1 | 2) {
            return Err(OmError::UnsupportedVersion { found: version });
        }
        Ok(Self {
            version,
            compression: Compression::IntQuantizedDelta,
            scale_factor: f32::from_le_bytes(buf[4..8].try_into().expect("4-byte slice")),
            dims: [
                u64::from_le_bytes(buf[8..16].try_into().expect("8-byte slice")),
                u64::from_le_bytes(buf[16..24].try_into().expect("8-byte slice")),
            ],
            chunks: [
                u64::from_le_bytes(buf[24..32].try_into().expect("8-byte slice")),
                u64::from_le_bytes(buf[32..40].try_into().expect("8-byte slice")),
            ],
        })
    }

    /// Serialize to exactly 40 bytes.
    pub fn to_bytes(&self) -> [u8; LEGACY_HEADER_LEN] {
        let mut buf = [0u8; LEGACY_HEADER_LEN];
        buf[..2].copy_from_slice(&MAGIC);
        buf[2] = self.version;
        buf[3] = 0; // compression field, uninitialized in v1 writers
        buf[4..8].copy_from_slice(&self.scale_factor.to_le_bytes());
        buf[8..16].copy_from_slice(&self.dims[0].to_le_bytes());
        buf[16..24].copy_from_slice(&self.dims[1].to_le_bytes());
        buf[24..32].copy_from_slice(&self.chunks[0].to_le_bytes());
        buf[32..40].copy_from_slice(&self.chunks[1].to_le_bytes());
        buf
    }
}
