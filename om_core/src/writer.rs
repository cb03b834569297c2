//! Buffered streaming writer.
//!
//! Owns the sink, a fixed-capacity byte buffer, the growing lookup table,
//! and one chunk of scratch. Chunks are encoded straight into the buffer;
//! the buffer is flushed to the sink only when it cannot hold another
//! worst-case chunk, which keeps sink writes large and strictly
//! sequential: header, chunks in ascending index order, LUT block,
//! metadata JSON, 8-byte length tail.
//!
//! A writer that errors mid-stream has emitted a prefix of the chunk
//! stream and no LUT or trailer; such a file is unreadable and should be
//! discarded (write to a temporary path and rename on success if atomic
//! publication matters).

use std::ops::Range;

use tracing::debug;

use om_codecs::{delta2d, fpxcodec, intcodec, quantize};

use crate::backend::WriteBackend;
use crate::error::{OmError, Result};
use crate::format::{
    Compression, TrailerMeta, DEFAULT_LUT_SUB_CHUNK_SIZE, FORMAT_VERSION, HEADER_LEN, MAGIC,
};
use crate::geometry::{for_each_overlap_run, ChunkGrid};
use crate::lut::compress_lut;

/// Floor for the output buffer so tiny chunks still flush in large writes.
const MIN_BUFFER_CAPACITY: usize = 64 * 1024;

/// Streaming writer for OM version-3 files.
///
/// Chunk data is supplied through [`write_data`](Self::write_data) in
/// ascending chunk order as one or more slabs along the first axis;
/// [`finish`](Self::finish) seals the file with the LUT and trailer.
pub struct OmWriter<W: WriteBackend> {
    sink: W,
    grid: ChunkGrid,
    compression: Compression,
    scale_factor: f32,
    lut_sub_chunk_size: u64,
    buffer: Vec<u8>,
    write_pos: usize,
    /// Cumulative chunk-stream offsets; `lut[next_chunk]` is the running
    /// total of compressed bytes.
    lut: Vec<u64>,
    next_chunk: u64,
    scratch_i16: Vec<i16>,
    scratch_f32: Vec<f32>,
    chunk_bound: usize,
}

impl<W: WriteBackend> OmWriter<W> {
    /// Create a writer and emit the 3-byte header.
    pub fn new(
        sink: W,
        dims: &[u64],
        chunks: &[u64],
        compression: Compression,
        scale_factor: f32,
    ) -> Result<Self> {
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            return Err(OmError::InvalidDescriptor {
                reason: format!("scale_factor {scale_factor} must be a finite positive float"),
            });
        }
        let grid = ChunkGrid::new(dims, chunks)?;
        let max_elems = grid.max_chunk_elements() as usize;
        let chunk_bound = match compression {
            Compression::IntQuantizedDelta | Compression::LogIntQuantizedDelta => {
                intcodec::max_compressed_len(max_elems)
            }
            Compression::FloatXorDelta => fpxcodec::max_compressed_len(max_elems),
        };
        let (scratch_i16, scratch_f32) = match compression {
            Compression::FloatXorDelta => (Vec::new(), vec![0.0; max_elems]),
            _ => (vec![0; max_elems], Vec::new()),
        };

        let mut writer = Self {
            sink,
            grid,
            compression,
            scale_factor,
            lut_sub_chunk_size: DEFAULT_LUT_SUB_CHUNK_SIZE,
            buffer: vec![0u8; MIN_BUFFER_CAPACITY.max(chunk_bound)],
            write_pos: 0,
            lut: vec![0],
            next_chunk: 0,
            scratch_i16,
            scratch_f32,
            chunk_bound,
        };
        writer.buffered_write(&[MAGIC[0], MAGIC[1], FORMAT_VERSION])?;
        Ok(writer)
    }

    /// Chunks encoded so far; equals `n_chunks` once the array is complete.
    pub fn chunks_written(&self) -> u64 {
        self.next_chunk
    }

    /// Encode the entire array in one call.
    pub fn write_all(&mut self, data: &[f32]) -> Result<()> {
        let dims = self.grid.dims().to_vec();
        let window: Vec<Range<u64>> = dims.iter().map(|&d| 0..d).collect();
        self.write_data(data, &dims, &window)
    }

    /// Encode the next slab of chunks.
    ///
    /// `data` is a row-major buffer of shape `array_dims`; `array_window`
    /// selects the region of it holding the payload, so slabs can be cut
    /// out of larger (padded) staging buffers. The selected extents must
    /// equal the array dims on every axis but the first; the first-axis
    /// extent must be a whole number of chunk rows or run exactly to the
    /// array edge. Each call continues where the previous one stopped:
    /// together the calls must cover every chunk exactly once, in order.
    pub fn write_data(
        &mut self,
        data: &[f32],
        array_dims: &[u64],
        array_window: &[Range<u64>],
    ) -> Result<()> {
        let rank = self.grid.rank();
        if array_dims.len() != rank || array_window.len() != rank {
            return Err(OmError::RankMismatch {
                file: rank,
                request: array_dims.len(),
            });
        }
        let buf_len: u64 = array_dims.iter().product();
        if data.len() as u64 != buf_len {
            return Err(OmError::WindowShape {
                window: array_window.to_vec(),
                dims: array_dims.to_vec(),
                reason: "data length does not match buffer dims",
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

        let dims = self.grid.dims();
        let chunks = self.grid.chunks();
        for axis in 1..rank {
            if array_window[axis].end - array_window[axis].start != dims[axis] {
                return Err(OmError::WindowShape {
                    window: array_window.to_vec(),
                    dims: array_dims.to_vec(),
                    reason: "slab must span the full array on every axis but the first",
                });
            }
        }

        // Where this slab lands in file coordinates, from the chunk cursor.
        let chunk_rows_per_slab: u64 = (1..rank).map(|a| self.grid.n_chunks_per_dim(a)).product();
        if self.next_chunk >= self.grid.n_chunks() {
            return Err(OmError::WriteBeyondEnd {
                expected: self.grid.n_chunks(),
            });
        }
        debug_assert_eq!(self.next_chunk % chunk_rows_per_slab, 0);
        let row0 = (self.next_chunk / chunk_rows_per_slab) * chunks[0];
        let rows = array_window[0].end - array_window[0].start;
        if row0 + rows > dims[0] {
            return Err(OmError::DimensionOutOfBounds {
                axis: 0,
                range: row0..row0 + rows,
                allowed: 0..dims[0],
            });
        }
        if rows % chunks[0] != 0 && row0 + rows != dims[0] {
            return Err(OmError::WindowShape {
                window: array_window.to_vec(),
                dims: array_dims.to_vec(),
                reason: "first-axis extent must be chunk-aligned or reach the array edge",
            });
        }

        let mut file_window: Vec<Range<u64>> = dims.iter().map(|&d| 0..d).collect();
        file_window[0] = row0..row0 + rows;

        let chunk_iter = self.grid.chunks_in_window(&file_window);
        for coord in chunk_iter {
            debug_assert_eq!(self.grid.chunk_index(&coord), self.next_chunk);
            self.encode_chunk(&coord, data, array_dims, array_window, &file_window)?;
        }
        Ok(())
    }

    fn encode_chunk(
        &mut self,
        coord: &[u64],
        data: &[f32],
        array_dims: &[u64],
        array_window: &[Range<u64>],
        file_window: &[Range<u64>],
    ) -> Result<()> {
        let chunk_range = self.grid.chunk_global_range(coord);
        let n_elems = self.grid.chunk_len(coord) as usize;
        let cols = (chunk_range[chunk_range.len() - 1].end
            - chunk_range[chunk_range.len() - 1].start) as usize;
        let rows = n_elems / cols;

        // Make room first so the encode below always has a full worst-case
        // bound of buffer available.
        self.reserve_chunk_space()?;

        // Gather the chunk from the user buffer into scratch, quantizing in
        // the same pass for the integer modes.
        let scale = self.scale_factor;
        let encoded_len = match self.compression {
            Compression::IntQuantizedDelta => {
                let scratch = &mut self.scratch_i16[..n_elems];
                for_each_overlap_run(
                    &chunk_range,
                    file_window,
                    array_dims,
                    array_window,
                    |boff, coff, run| {
                        for (dst, &src) in
                            scratch[coff..coff + run].iter_mut().zip(&data[boff..boff + run])
                        {
                            *dst = quantize::encode_linear(src, scale);
                        }
                    },
                );
                delta2d::encode_i16(rows, cols, scratch);
                intcodec::compress(scratch, &mut self.buffer[self.write_pos..])
            }
            Compression::LogIntQuantizedDelta => {
                let scratch = &mut self.scratch_i16[..n_elems];
                for_each_overlap_run(
                    &chunk_range,
                    file_window,
                    array_dims,
                    array_window,
                    |boff, coff, run| {
                        for (dst, &src) in
                            scratch[coff..coff + run].iter_mut().zip(&data[boff..boff + run])
                        {
                            *dst = quantize::encode_log10(src, scale);
                        }
                    },
                );
                delta2d::encode_i16(rows, cols, scratch);
                intcodec::compress(scratch, &mut self.buffer[self.write_pos..])
            }
            Compression::FloatXorDelta => {
                let scratch = &mut self.scratch_f32[..n_elems];
                for_each_overlap_run(
                    &chunk_range,
                    file_window,
                    array_dims,
                    array_window,
                    |boff, coff, run| {
                        scratch[coff..coff + run].copy_from_slice(&data[boff..boff + run]);
                    },
                );
                delta2d::encode_f32(rows, cols, scratch);
                fpxcodec::compress(scratch, &mut self.buffer[self.write_pos..])
            }
        };

        self.write_pos += encoded_len;
        let total = self.lut[self.lut.len() - 1] + encoded_len as u64;
        self.lut.push(total);
        self.next_chunk += 1;
        Ok(())
    }

    /// Flush the buffer if it cannot hold one more worst-case chunk.
    fn reserve_chunk_space(&mut self) -> Result<()> {
        if self.buffer.len() - self.write_pos < self.chunk_bound {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.write_pos > 0 {
            debug!(bytes = self.write_pos, "flushing write buffer");
            self.sink.write(&self.buffer[..self.write_pos])?;
            self.write_pos = 0;
        }
        Ok(())
    }

    /// Copy arbitrary bytes through the buffer, flushing as needed.
    fn buffered_write(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let free = self.buffer.len() - self.write_pos;
            if free == 0 {
                self.flush()?;
                continue;
            }
            let take = free.min(bytes.len());
            self.buffer[self.write_pos..self.write_pos + take].copy_from_slice(&bytes[..take]);
            self.write_pos += take;
            bytes = &bytes[take..];
        }
        Ok(())
    }

    /// Compress the LUT, emit the metadata trailer, flush, and return the
    /// sink together with the metadata that was written.
    pub fn finish(mut self) -> Result<(W, TrailerMeta)> {
        let n_chunks = self.grid.n_chunks();
        if self.next_chunk != n_chunks {
            return Err(OmError::IncompleteWrite {
                written: self.next_chunk,
                expected: n_chunks,
            });
        }

        let lut_offset = HEADER_LEN + self.lut[self.lut.len() - 1];
        let (lut_block, lut_chunk_length) = compress_lut(&self.lut, self.lut_sub_chunk_size);
        debug!(
            sub_chunks = self.lut.len().div_ceil(self.lut_sub_chunk_size as usize),
            stride = lut_chunk_length,
            "sealing lookup table"
        );
        self.buffered_write(&lut_block)?;

        let meta = TrailerMeta {
            dims: self.grid.dims().to_vec(),
            chunks: self.grid.chunks().to_vec(),
            scale_factor: self.scale_factor,
            compression: self.compression,
            n_chunks,
            lut_offset,
            lut_chunk_length,
            lut_sub_chunk_size: self.lut_sub_chunk_size,
        };
        let json = serde_json::to_vec(&meta)?;
        self.buffered_write(&json)?;
        self.buffered_write(&(json.len() as u64).to_le_bytes())?;
        self.flush()?;
        Ok((self.sink, meta))
    }
}
