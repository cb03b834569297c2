//! Chunk grid arithmetic: pure functions over dimension and chunk vectors.
//!
//! Chunk indices are flat, row-major, last dimension fastest — the same
//! order in which the writer emits chunks and the reader visits them. All
//! arithmetic is u64 so multi-terabyte arrays index without overflow.

use std::ops::Range;

use crate::error::{OmError, Result};

/// Immutable array descriptor geometry: `dims` and `chunks` of equal rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    dims: Vec<u64>,
    chunks: Vec<u64>,
}

impl ChunkGrid {
    /// Validate and build. Every dimension must be ≥ 1 and every chunk
    /// extent in `[1, dims[i]]`.
    pub fn new(dims: &[u64], chunks: &[u64]) -> Result<Self> {
        if dims.is_empty() {
            return Err(OmError::InvalidDescriptor {
                reason: "rank must be at least 1".into(),
            });
        }
        if dims.len() != chunks.len() {
            return Err(OmError::InvalidDescriptor {
                reason: format!(
                    "dims rank {} != chunks rank {}",
                    dims.len(),
                    chunks.len()
                ),
            });
        }
        for (axis, (&d, &c)) in dims.iter().zip(chunks).enumerate() {
            if d == 0 {
                return Err(OmError::InvalidDescriptor {
                    reason: format!("axis {axis}: dimension must be positive"),
                });
            }
            if c == 0 || c > d {
                return Err(OmError::InvalidDescriptor {
                    reason: format!("axis {axis}: chunk extent {c} outside [1, {d}]"),
                });
            }
        }
        Ok(Self {
            dims: dims.to_vec(),
            chunks: chunks.to_vec(),
        })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn chunks(&self) -> &[u64] {
        &self.chunks
    }

    /// Total element count, `Π dims[i]`.
    pub fn n_elements(&self) -> u64 {
        self.dims.iter().product()
    }

    /// Number of chunks along `axis`, `⌈dims / chunks⌉`.
    pub fn n_chunks_per_dim(&self, axis: usize) -> u64 {
        self.dims[axis].div_ceil(self.chunks[axis])
    }

    /// Total chunk count across all axes.
    pub fn n_chunks(&self) -> u64 {
        (0..self.rank()).map(|a| self.n_chunks_per_dim(a)).product()
    }

    /// Element count of a full (interior) chunk; edge chunks are smaller.
    pub fn max_chunk_elements(&self) -> u64 {
        self.chunks.iter().product()
    }

    /// Flat chunk index → per-axis chunk coordinate.
    pub fn chunk_coord(&self, chunk_index: u64) -> Vec<u64> {
        let mut coord = vec![0u64; self.rank()];
        let mut rest = chunk_index;
        for axis in (0..self.rank()).rev() {
            let n = self.n_chunks_per_dim(axis);
            coord[axis] = rest % n;
            rest /= n;
        }
        coord
    }

    /// Per-axis chunk coordinate → flat chunk index.
    pub fn chunk_index(&self, coord: &[u64]) -> u64 {
        let mut index = 0u64;
        for (axis, &c) in coord.iter().enumerate() {
            index = index * self.n_chunks_per_dim(axis) + c;
        }
        index
    }

    /// The half-open global coordinate range a chunk covers, clamped to
    /// the array edge.
    pub fn chunk_global_range(&self, coord: &[u64]) -> Vec<Range<u64>> {
        coord
            .iter()
            .zip(&self.chunks)
            .zip(&self.dims)
            .map(|((&c, &ext), &dim)| {
                let lo = c * ext;
                lo..(lo + ext).min(dim)
            })
            .collect()
    }

    /// Element count of the chunk at `coord` (edge chunks clamped).
    pub fn chunk_len(&self, coord: &[u64]) -> u64 {
        self.chunk_global_range(coord)
            .iter()
            .map(|r| r.end - r.start)
            .product()
    }

    /// Check a request window against the array bounds.
    pub fn validate_window(&self, window: &[Range<u64>]) -> Result<()> {
        if window.len() != self.rank() {
            return Err(OmError::RankMismatch {
                file: self.rank(),
                request: window.len(),
            });
        }
        for (axis, (r, &dim)) in window.iter().zip(&self.dims).enumerate() {
            if r.start > r.end || r.end > dim {
                return Err(OmError::DimensionOutOfBounds {
                    axis,
                    range: r.clone(),
                    allowed: 0..dim,
                });
            }
        }
        Ok(())
    }

    /// Iterate the chunk coordinates intersecting `window`, row-major.
    ///
    /// The iterator owns its state; it does not borrow the grid. An empty
    /// window yields nothing.
    pub fn chunks_in_window(&self, window: &[Range<u64>]) -> ChunkWindowIter {
        debug_assert_eq!(window.len(), self.rank());
        let mut coord_ranges = Vec::with_capacity(self.rank());
        let mut empty = false;
        for (r, &chunk) in window.iter().zip(&self.chunks) {
            if r.start >= r.end {
                empty = true;
            }
            let lo = r.start / chunk;
            let hi = if r.end == 0 { 0 } else { (r.end - 1) / chunk + 1 };
            coord_ranges.push(lo..hi);
        }
        ChunkWindowIter::new(coord_ranges, empty)
    }
}

/// Row-major odometer over a hyper-rectangle of chunk coordinates.
pub struct ChunkWindowIter {
    ranges: Vec<Range<u64>>,
    next: Option<Vec<u64>>,
}

impl ChunkWindowIter {
    fn new(ranges: Vec<Range<u64>>, empty: bool) -> Self {
        let next = if empty {
            None
        } else {
            Some(ranges.iter().map(|r| r.start).collect())
        };
        Self { ranges, next }
    }
}

impl Iterator for ChunkWindowIter {
    type Item = Vec<u64>;

    fn next(&mut self) -> Option<Vec<u64>> {
        let current = self.next.clone()?;
        // Advance, last axis fastest.
        let mut carried = true;
        if let Some(coord) = self.next.as_mut() {
            for axis in (0..coord.len()).rev() {
                coord[axis] += 1;
                if coord[axis] < self.ranges[axis].end {
                    carried = false;
                    break;
                }
                coord[axis] = self.ranges[axis].start;
            }
        }
        if carried {
            self.next = None;
        }
        Some(current)
    }
}

/// Visit the overlap of a chunk and a request window as contiguous runs.
///
/// `chunk_range` is the chunk's global coordinate range; `file_window` is
/// the request in file coordinates; `buf_dims` describes the user buffer
/// and `buf_window` places `file_window` inside it (equal extents). The
/// callback receives `(buf_offset, chunk_offset, run_len)` where both
/// offsets are flat element indices (user buffer resp. chunk-local
/// row-major layout).
///
/// Runs always span the full overlap along the last dimension; trailing
/// dimensions that are covered completely on both sides collapse into the
/// same run, so a chunk that lines up with the buffer is visited in one
/// call per outer row block instead of element by element.
pub fn for_each_overlap_run(
    chunk_range: &[Range<u64>],
    file_window: &[Range<u64>],
    buf_dims: &[u64],
    buf_window: &[Range<u64>],
    mut f: impl FnMut(usize, usize, usize),
) {
    let rank = chunk_range.len();
    debug_assert_eq!(file_window.len(), rank);
    debug_assert_eq!(buf_dims.len(), rank);
    debug_assert_eq!(buf_window.len(), rank);

    // Per-axis overlap in file coordinates.
    let mut o_lo = vec![0u64; rank];
    let mut o_ext = vec![0u64; rank];
    for d in 0..rank {
        let lo = chunk_range[d].start.max(file_window[d].start);
        let hi = chunk_range[d].end.min(file_window[d].end);
        if lo >= hi {
            return;
        }
        o_lo[d] = lo;
        o_ext[d] = hi - lo;
    }

    // Row-major strides for the user buffer and the chunk-local layout.
    let mut b_stride = vec![1u64; rank];
    let mut c_stride = vec![1u64; rank];
    for d in (0..rank - 1).rev() {
        b_stride[d] = b_stride[d + 1] * buf_dims[d + 1];
        c_stride[d] = c_stride[d + 1] * (chunk_range[d + 1].end - chunk_range[d + 1].start);
    }

    // Fold trailing axes into one linear run while the axes below the fold
    // are fully covered in both the buffer and the chunk.
    let mut split = rank - 1;
    let mut run = o_ext[rank - 1];
    while split > 0
        && (split..rank).all(|d| {
            o_ext[d] == buf_dims[d] && o_ext[d] == chunk_range[d].end - chunk_range[d].start
        })
    {
        split -= 1;
        run *= o_ext[split];
    }
    let run = run as usize;

    let mut idx = vec![0u64; split];
    loop {
        let mut boff = 0u64;
        let mut coff = 0u64;
        for d in 0..rank {
            let i = if d < split { idx[d] } else { 0 };
            let file_pos = o_lo[d] + i;
            boff += (buf_window[d].start + (file_pos - file_window[d].start)) * b_stride[d];
            coff += (file_pos - chunk_range[d].start) * c_stride[d];
        }
        f(boff as usize, coff as usize, run);

        let mut axis = split;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < o_ext[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}
