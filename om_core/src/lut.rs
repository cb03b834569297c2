//! Chunk lookup table: compressed fixed-stride sub-chunks.
//!
//! The LUT is the sequence of `n_chunks + 1` cumulative byte offsets into
//! the chunk stream (`lut[0] = 0`). On disk it is split into groups of
//! `sub_chunk_size` entries, each group compressed independently and padded
//! to the largest compressed group size (`lut_chunk_length`), so entry `k`
//! lives in slot `k / sub_chunk_size` at a fixed stride. Locating one
//! chunk's byte range therefore costs at most two sub-chunk decodes, with
//! no need to touch the rest of the table — files with millions of chunks
//! keep O(1) lookups.
//!
//! Version-1/2 files store the table uncompressed (`n_chunks` × u64
//! cumulative end offsets at byte 40); those tables are small enough to
//! load whole on open.

use om_codecs::lutcodec;

use crate::backend::ReadBackend;
use crate::error::{OmError, Result};

/// Compress cumulative `offsets` into padded sub-chunk slots.
///
/// Returns the on-disk block and the uniform slot stride
/// (`lut_chunk_length`). Slot padding bytes are zero; readers never look
/// at them.
pub fn compress_lut(offsets: &[u64], sub_chunk_size: u64) -> (Vec<u8>, u64) {
    let e = sub_chunk_size as usize;
    let mut compressed: Vec<Vec<u8>> = Vec::with_capacity(offsets.len().div_ceil(e));
    let mut stride = 0usize;
    for group in offsets.chunks(e) {
        let mut buf = vec![0u8; lutcodec::max_compressed_len(group.len())];
        let n = lutcodec::compress(group, &mut buf);
        buf.truncate(n);
        stride = stride.max(n);
        compressed.push(buf);
    }

    let mut block = vec![0u8; compressed.len() * stride];
    for (slot, sub) in compressed.iter().enumerate() {
        block[slot * stride..slot * stride + sub.len()].copy_from_slice(sub);
    }
    (block, stride as u64)
}

enum LutKind {
    /// Compressed sub-chunks located by the trailer metadata.
    SubChunked {
        lut_offset: u64,
        stride: u64,
        sub_chunk_size: u64,
    },
    /// Fully resident table (legacy v1/v2 path).
    Resident(Vec<u64>),
}

/// Decode-side access to the LUT with a one-slot cache.
///
/// Sequential chunk visits — the common read pattern — hit the cache for
/// every entry pair inside a sub-chunk and decompress each slot once.
pub struct LutReader {
    kind: LutKind,
    /// Logical entry count, `n_chunks + 1`.
    n_entries: u64,
    cached_slot: Option<u64>,
    cache: Vec<u64>,
    io_buf: Vec<u8>,
}

impl LutReader {
    /// Sub-chunked LUT described by a version-3 trailer.
    pub fn sub_chunked(
        lut_offset: u64,
        stride: u64,
        sub_chunk_size: u64,
        n_chunks: u64,
    ) -> Result<Self> {
        if stride == 0 || sub_chunk_size == 0 {
            return Err(OmError::CorruptLut {
                reason: format!(
                    "lut_chunk_length {stride} / lut_sub_chunk_size {sub_chunk_size} must be positive"
                ),
            });
        }
        Ok(Self {
            kind: LutKind::SubChunked {
                lut_offset,
                stride,
                sub_chunk_size,
            },
            n_entries: n_chunks + 1,
            cached_slot: None,
            cache: Vec::new(),
            io_buf: vec![0u8; stride as usize],
        })
    }

    /// Legacy uncompressed table, loaded eagerly from `offset`.
    ///
    /// Entry 0 of the cumulative view is synthesized: legacy files store
    /// only the `n_chunks` end offsets.
    pub fn legacy<R: ReadBackend>(backend: &mut R, offset: u64, n_chunks: u64) -> Result<Self> {
        let mut raw = vec![0u8; (n_chunks as usize) * 8];
        backend.read_range(offset, &mut raw)?;
        let mut table = Vec::with_capacity(n_chunks as usize + 1);
        table.push(0u64);
        for entry in raw.chunks_exact(8) {
            table.push(u64::from_le_bytes(entry.try_into().expect("8-byte slice")));
        }
        Ok(Self {
            kind: LutKind::Resident(table),
            n_entries: n_chunks + 1,
            cached_slot: None,
            cache: Vec::new(),
            io_buf: Vec::new(),
        })
    }

    /// Number of sub-chunk slots on disk (0 for the resident kind).
    pub fn n_sub_chunks(&self) -> u64 {
        match &self.kind {
            LutKind::SubChunked { sub_chunk_size, .. } => {
                self.n_entries.div_ceil(*sub_chunk_size)
            }
            LutKind::Resident(_) => 0,
        }
    }

    /// Cumulative entry `k` (chunk-stream-relative byte offset).
    pub fn entry<R: ReadBackend>(&mut self, backend: &mut R, k: u64) -> Result<u64> {
        if k >= self.n_entries {
            return Err(OmError::CorruptLut {
                reason: format!("entry {k} out of range ({} entries)", self.n_entries),
            });
        }
        match &self.kind {
            LutKind::Resident(table) => Ok(table[k as usize]),
            LutKind::SubChunked {
                lut_offset,
                stride,
                sub_chunk_size,
            } => {
                let slot = k / sub_chunk_size;
                if self.cached_slot != Some(slot) {
                    let count = (*sub_chunk_size).min(self.n_entries - slot * sub_chunk_size);
                    backend.read_range(lut_offset + slot * stride, &mut self.io_buf)?;
                    self.cache.resize(count as usize, 0);
                    lutcodec::decompress(&self.io_buf, &mut self.cache).map_err(|e| {
                        OmError::CorruptLut {
                            reason: format!("sub-chunk {slot}: {e}"),
                        }
                    })?;
                    self.cached_slot = Some(slot);
                }
                Ok(self.cache[(k % sub_chunk_size) as usize])
            }
        }
    }

    /// The compressed byte range of `chunk_index`, relative to the chunk
    /// stream start. Fails with `CorruptLut` on non-monotonic entries.
    pub fn chunk_byte_range<R: ReadBackend>(
        &mut self,
        backend: &mut R,
        chunk_index: u64,
    ) -> Result<std::ops::Range<u64>> {
        let start = self.entry(backend, chunk_index)?;
        let end = self.entry(backend, chunk_index + 1)?;
        if end < start {
            return Err(OmError::CorruptLut {
                reason: format!(
                    "non-monotonic entries for chunk {chunk_index}: {start} > {end}"
                ),
            });
        }
        Ok(start..end)
    }
}
