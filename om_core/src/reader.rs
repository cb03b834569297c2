//! Random-access reader for OM files.
//!
//! Opening parses the envelope (version-3 trailer or legacy fixed header)
//! without touching the chunk stream. Each read enumerates exactly the
//! chunks intersecting the requested hyper-rectangle, locates their bytes
//! through the LUT, decodes each chunk once into owned scratch, and
//! scatters the clamped overlap into the caller's buffer with the strides
//! the caller's dims imply.

use std::ops::Range;

use tracing::debug;

use om_codecs::{delta2d, fpxcodec, intcodec, quantize};

use crate::backend::ReadBackend;
use crate::error::{OmError, Result};
use crate::format::{
    Compression, LegacyHeader, TrailerMeta, HEADER_LEN, LEGACY_HEADER_LEN, MAGIC, TRAILER_LEN,
};
use crate::geometry::{for_each_overlap_run, ChunkGrid};
use crate::lut::LutReader;

/// Random-access reader over any [`ReadBackend`].
pub struct OmReader<R: ReadBackend> {
    backend: R,
    grid: ChunkGrid,
    version: u8,
    compression: Compression,
    scale_factor: f32,
    trailer: Option<TrailerMeta>,
    lut: LutReader,
    /// Absolute offset of the first compressed chunk byte.
    chunk_stream_start: u64,
    /// Absolute offset one past the last valid chunk byte; LUT entries
    /// pointing beyond it are corrupt.
    chunk_stream_end: u64,
    scratch_i16: Vec<i16>,
    scratch_f32: Vec<f32>,
    io_buf: Vec<u8>,
}

impl<R: ReadBackend> OmReader<R> {
    /// Open a byte source: validate the magic, dispatch on the version,
    /// and parse enough metadata to serve reads.
    pub fn open(mut backend: R) -> Result<Self> {
        let file_len = backend.len();
        if file_len < HEADER_LEN {
            return Err(OmError::NotAnOmFile);
        }
        let mut head = [0u8; HEADER_LEN as usize];
        backend.read_range(0, &mut head)?;
        if head[..2] != MAGIC {
            return Err(OmError::NotAnOmFile);
        }
        match head[2] {
            3 => Self::open_v3(backend, file_len),
            1 | 2 => Self::open_legacy(backend, file_len),
            found => Err(OmError::UnsupportedVersion { found }),
        }
    }

    fn open_v3(mut backend: R, file_len: u64) -> Result<Self> {
        if file_len < HEADER_LEN + TRAILER_LEN {
            return Err(OmError::CorruptTrailer {
                reason: format!("file of {file_len} bytes cannot hold a trailer"),
            });
        }
        let mut tail = [0u8; TRAILER_LEN as usize];
        backend.read_range(file_len - TRAILER_LEN, &mut tail)?;
        let json_len = u64::from_le_bytes(tail);
        if json_len == 0 || json_len > file_len - HEADER_LEN - TRAILER_LEN {
            return Err(OmError::CorruptTrailer {
                reason: format!("metadata length {json_len} impossible in {file_len}-byte file"),
            });
        }
        let mut json = vec![0u8; json_len as usize];
        backend.read_range(file_len - TRAILER_LEN - json_len, &mut json)?;
        let meta: TrailerMeta = serde_json::from_slice(&json)?;

        let grid = ChunkGrid::new(&meta.dims, &meta.chunks)?;
        if meta.n_chunks != grid.n_chunks() {
            return Err(OmError::CorruptTrailer {
                reason: format!(
                    "metadata claims {} chunks, geometry implies {}",
                    meta.n_chunks,
                    grid.n_chunks()
                ),
            });
        }
        if meta.lut_offset < HEADER_LEN || meta.lut_offset > file_len {
            return Err(OmError::CorruptTrailer {
                reason: format!("lut_offset {} outside file", meta.lut_offset),
            });
        }
        debug!(
            version = 3,
            dims = ?meta.dims,
            chunks = ?meta.chunks,
            compression = %meta.compression,
            "opened OM file"
        );

        let lut = LutReader::sub_chunked(
            meta.lut_offset,
            meta.lut_chunk_length,
            meta.lut_sub_chunk_size,
            meta.n_chunks,
        )?;
        Ok(Self::assemble(
            backend,
            grid,
            3,
            meta.compression,
            meta.scale_factor,
            Some(meta.clone()),
            lut,
            HEADER_LEN,
            meta.lut_offset,
        ))
    }

    fn open_legacy(mut backend: R, file_len: u64) -> Result<Self> {
        let mut head = [0u8; LEGACY_HEADER_LEN];
        backend.read_range(0, &mut head)?;
        let header = LegacyHeader::from_bytes(&head)?;
        let grid = ChunkGrid::new(&header.dims, &header.chunks)?;
        let n_chunks = grid.n_chunks();
        let lut = LutReader::legacy(&mut backend, LEGACY_HEADER_LEN as u64, n_chunks)?;
        debug!(
            version = header.version,
            dims = ?header.dims,
            chunks = ?header.chunks,
            "opened legacy OM file"
        );
        Ok(Self::assemble(
            backend,
            grid,
            header.version,
            header.compression,
            header.scale_factor,
            None,
            lut,
            LEGACY_HEADER_LEN as u64 + 8 * n_chunks,
            file_len,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        backend: R,
        grid: ChunkGrid,
        version: u8,
        compression: Compression,
        scale_factor: f32,
        trailer: Option<TrailerMeta>,
        lut: LutReader,
        chunk_stream_start: u64,
        chunk_stream_end: u64,
    ) -> Self {
        let max_elems = grid.max_chunk_elements() as usize;
        let (scratch_i16, scratch_f32, bound) = match compression {
            Compression::FloatXorDelta => (
                Vec::new(),
                vec![0.0; max_elems],
                fpxcodec::max_compressed_len(max_elems),
            ),
            _ => (
                vec![0; max_elems],
                Vec::new(),
                intcodec::max_compressed_len(max_elems),
            ),
        };
        Self {
            backend,
            grid,
            version,
            compression,
            scale_factor,
            trailer,
            lut,
            chunk_stream_start,
            chunk_stream_end,
            scratch_i16,
            scratch_f32,
            io_buf: vec![0u8; bound],
        }
    }

    pub fn dims(&self) -> &[u64] {
        self.grid.dims()
    }

    pub fn chunks(&self) -> &[u64] {
        self.grid.chunks()
    }

    pub fn n_chunks(&self) -> u64 {
        self.grid.n_chunks()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Version-3 trailer metadata; `None` for legacy files.
    pub fn trailer(&self) -> Option<&TrailerMeta> {
        self.trailer.as_ref()
    }

    pub fn backend(&self) -> &R {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut R {
        &mut self.backend
    }

    /// Total compressed chunk stream length in bytes (the final LUT entry).
    pub fn chunk_stream_len(&mut self) -> Result<u64> {
        let n = self.grid.n_chunks();
        self.lut.entry(&mut self.backend, n)
    }

    /// Read the full array into a fresh buffer.
    pub fn read_all(&mut self) -> Result<Vec<f32>> {
        let window: Vec<Range<u64>> = self.grid.dims().iter().map(|&d| 0..d).collect();
        self.read(&window)
    }

    /// Read a hyper-rectangle into a fresh, tightly shaped buffer.
    pub fn read(&mut self, file_window: &[Range<u64>]) -> Result<Vec<f32>> {
        self.grid.validate_window(file_window)?;
        let extents: Vec<u64> = file_window.iter().map(|r| r.end - r.start).collect();
        let len: u64 = extents.iter().product();
        let mut out = vec![0.0f32; len as usize];
        let out_window: Vec<Range<u64>> = extents.iter().map(|&e| 0..e).collect();
        self.read_into(&mut out, &extents, &out_window, file_window)?;
        Ok(out)
    }

    /// Read `file_window` and place it at `array_window` inside `out`,
    /// whose row-major shape is `array_dims`.
    pub fn read_into(
        &mut self,
        out: &mut [f32],
        array_dims: &[u64],
        array_window: &[Range<u64>],
        file_window: &[Range<u64>],
    ) -> Result<()> {
        self.grid.validate_window(file_window)?;
        let rank = self.grid.rank();
        if array_dims.len() != rank || array_window.len() != rank {
            return Err(OmError::RankMismatch {
                file: rank,
                request: array_dims.len(),
            });
        }
        let buf_len: u64 = array_dims.iter().product();
        if out.len() as u64 != buf_len {
            return Err(OmError::WindowShape {
                window: array_window.to_vec(),
                dims: array_dims.to_vec(),
                reason: "output length does not match buffer dims",
            });
        }
        for (axis, (r, &d)) in array_window.iter().zip(array_dims).enumerate() {
            if r.start > r.end || r.end > d {
                return Err(OmError::DimensionOutOfBounds {
                    axis,
                    range: r.clone(),
                    allowed: 0..d,
                });
            }
        }
        for (r, f) in array_window.iter().zip(file_window) {
            if r.end - r.start != f.end - f.start {
                return Err(OmError::WindowShape {
                    window: array_window.to_vec(),
                    dims: array_dims.to_vec(),
                    reason: "output window extents must equal the file window extents",
                });
            }
        }
        if file_window.iter().any(|r| r.start == r.end) {
            return Ok(());
        }

        if self.backend.needs_prefetch() {
            self.prefetch_window(file_window)?;
        }

        let chunk_iter = self.grid.chunks_in_window(file_window);
        let mut visited = 0u64;
        for coord in chunk_iter {
            self.decode_chunk_into(&coord, out, array_dims, array_window, file_window)?;
            visited += 1;
        }
        debug!(chunks = visited, "read window served");
        Ok(())
    }

    /// Issue advisory prefetch hints, coalescing byte ranges of chunks
    /// that are adjacent in the stream into single hints.
    fn prefetch_window(&mut self, file_window: &[Range<u64>]) -> Result<()> {
        let mut pending: Option<Range<u64>> = None;
        for coord in self.grid.chunks_in_window(file_window) {
            let index = self.grid.chunk_index(&coord);
            let rel = self.lut.chunk_byte_range(&mut self.backend, index)?;
            let Some(abs) = self
                .chunk_stream_start
                .checked_add(rel.start)
                .zip(self.chunk_stream_start.checked_add(rel.end))
                .map(|(s, e)| s..e)
            else {
                continue; // decode pass reports the corruption with context
            };
            pending = match pending {
                Some(p) if p.end == abs.start => Some(p.start..abs.end),
                Some(p) => {
                    self.backend.prefetch(p.start, p.end - p.start);
                    Some(abs)
                }
                None => Some(abs),
            };
        }
        if let Some(p) = pending {
            self.backend.prefetch(p.start, p.end - p.start);
        }
        Ok(())
    }

    fn decode_chunk_into(
        &mut self,
        coord: &[u64],
        out: &mut [f32],
        array_dims: &[u64],
        array_window: &[Range<u64>],
        file_window: &[Range<u64>],
    ) -> Result<()> {
        let index = self.grid.chunk_index(coord);
        let rel = self.lut.chunk_byte_range(&mut self.backend, index)?;
        let (start, end) = match (
            self.chunk_stream_start.checked_add(rel.start),
            self.chunk_stream_start.checked_add(rel.end),
        ) {
            (Some(start), Some(end)) if end <= self.chunk_stream_end => (start, end),
            _ => {
                return Err(OmError::CorruptLut {
                    reason: format!(
                        "chunk {index}: byte range {rel:?} exceeds chunk stream end {}",
                        self.chunk_stream_end
                    ),
                });
            }
        };
        if (end - start) as usize > self.io_buf.len() {
            return Err(OmError::CorruptLut {
                reason: format!(
                    "chunk {index}: compressed size {} exceeds the one-chunk bound {}",
                    end - start,
                    self.io_buf.len()
                ),
            });
        }
        let compressed_len = (end - start) as usize;
        self.backend
            .read_range(start, &mut self.io_buf[..compressed_len])?;

        let chunk_range = self.grid.chunk_global_range(coord);
        let n_elems = self.grid.chunk_len(coord) as usize;
        let cols = (chunk_range[chunk_range.len() - 1].end
            - chunk_range[chunk_range.len() - 1].start) as usize;
        let rows = n_elems / cols;

        let scale = self.scale_factor;
        match self.compression {
            Compression::IntQuantizedDelta => {
                let scratch = &mut self.scratch_i16[..n_elems];
                let consumed =
                    intcodec::decompress(&self.io_buf[..compressed_len], scratch)?;
                if consumed != compressed_len {
                    return Err(OmError::ChunkDecodeMismatch {
                        chunk_index: index,
                        expected: compressed_len as u64,
                        consumed: consumed as u64,
                    });
                }
                delta2d::decode_i16(rows, cols, scratch);
                for_each_overlap_run(
                    &chunk_range,
                    file_window,
                    array_dims,
                    array_window,
                    |boff, coff, run| {
                        for (dst, &src) in
                            out[boff..boff + run].iter_mut().zip(&scratch[coff..coff + run])
                        {
                            *dst = quantize::decode_linear(src, scale);
                        }
                    },
                );
            }
            Compression::LogIntQuantizedDelta => {
                let scratch = &mut self.scratch_i16[..n_elems];
                let consumed =
                    intcodec::decompress(&self.io_buf[..compressed_len], scratch)?;
                if consumed != compressed_len {
                    return Err(OmError::ChunkDecodeMismatch {
                        chunk_index: index,
                        expected: compressed_len as u64,
                        consumed: consumed as u64,
                    });
                }
                delta2d::decode_i16(rows, cols, scratch);
                for_each_overlap_run(
                    &chunk_range,
                    file_window,
                    array_dims,
                    array_window,
                    |boff, coff, run| {
                        for (dst, &src) in
                            out[boff..boff + run].iter_mut().zip(&scratch[coff..coff + run])
                        {
                            *dst = quantize::decode_log10(src, scale);
                        }
                    },
                );
            }
            Compression::FloatXorDelta => {
                let scratch = &mut self.scratch_f32[..n_elems];
                let consumed =
                    fpxcodec::decompress(&self.io_buf[..compressed_len], scratch)?;
                if consumed != compressed_len {
                    return Err(OmError::ChunkDecodeMismatch {
                        chunk_index: index,
                        expected: compressed_len as u64,
                        consumed: consumed as u64,
                    });
                }
                delta2d::decode_f32(rows, cols, scratch);
                for_each_overlap_run(
                    &chunk_range,
                    file_window,
                    array_dims,
                    array_window,
                    |boff, coff, run| {
                        out[boff..boff + run].copy_from_slice(&scratch[coff..coff + run]);
                    },
                );
            }
        }
        Ok(())
    }
}
