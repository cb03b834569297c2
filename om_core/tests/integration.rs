//! End-to-end coverage of the OM format core: write → seal → reopen → read.
//!
//! Everything round-trips through real serialized bytes — mostly in-memory
//! `Vec<u8>` sinks, plus one pass over actual temp files to exercise the
//! file backend. A counting backend wrapper proves the access-pattern
//! claims: partial reads touch only the chunks and LUT sub-chunks they
//! need, and rejected requests touch nothing at all.

use std::ops::Range;

use om_codecs::{delta2d, intcodec, quantize};
use om_core::format::{LegacyHeader, LEGACY_HEADER_LEN};
use om_core::lut::LutReader;
use om_core::{
    Compression, FileBackend, OmError, OmReader, OmWriter, ReadBackend, TrailerMeta,
};

// ── helpers ────────────────────────────────────────────────────────────────

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("om_test_{}.om", name))
}

/// Deterministic smooth field; smooth in every axis so the delta stages
/// have something to chew on.
fn field_value(coord: &[u64]) -> f32 {
    let mut acc = 0.0f32;
    for (axis, &c) in coord.iter().enumerate() {
        acc += ((c as f32) / (10.0 + axis as f32)).sin() * 10.0;
    }
    acc
}

fn fill_field(dims: &[u64]) -> Vec<f32> {
    let len: u64 = dims.iter().product();
    let mut data = vec![0.0f32; len as usize];
    let mut coord = vec![0u64; dims.len()];
    for slot in data.iter_mut() {
        *slot = field_value(&coord);
        for axis in (0..dims.len()).rev() {
            coord[axis] += 1;
            if coord[axis] < dims[axis] {
                break;
            }
            coord[axis] = 0;
        }
    }
    data
}

fn write_to_vec(
    data: &[f32],
    dims: &[u64],
    chunks: &[u64],
    compression: Compression,
    scale: f32,
) -> Vec<u8> {
    let mut writer = OmWriter::new(Vec::new(), dims, chunks, compression, scale).unwrap();
    writer.write_all(data).unwrap();
    let (sink, _meta) = writer.finish().unwrap();
    sink
}

/// Parse the trailer metadata straight from serialized bytes.
fn parse_trailer(bytes: &[u8]) -> TrailerMeta {
    let tail: [u8; 8] = bytes[bytes.len() - 8..].try_into().unwrap();
    let json_len = u64::from_le_bytes(tail) as usize;
    let json = &bytes[bytes.len() - 8 - json_len..bytes.len() - 8];
    serde_json::from_slice(json).unwrap()
}

/// Backend wrapper that records every `read_range` call.
struct CountingBackend<R> {
    inner: R,
    reads: Vec<Range<u64>>,
}

impl<R> CountingBackend<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            reads: Vec::new(),
        }
    }
}

impl<R: ReadBackend> ReadBackend for CountingBackend<R> {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> om_core::Result<()> {
        self.reads.push(offset..offset + buf.len() as u64);
        self.inner.read_range(offset, buf)
    }
}

// ── §8 scenarios ───────────────────────────────────────────────────────────

/// dims=[5], chunks=[2], scale=100: saturation stays below the NaN
/// sentinel and NaN survives the round trip. Three chunks: 2 + 2 + 1.
#[test]
fn scenario_1d_saturation_and_nan() {
    let input = [0.00f32, 1.23, -0.50, f32::NAN, 327.68];
    let bytes = write_to_vec(&input, &[5], &[2], Compression::IntQuantizedDelta, 100.0);

    let meta = parse_trailer(&bytes);
    assert_eq!(meta.n_chunks, 3);

    let mut reader = OmReader::open(bytes).unwrap();
    let out = reader.read_all().unwrap();
    assert_eq!(out[0], 0.00);
    assert_eq!(out[1], 1.23);
    assert_eq!(out[2], -0.50);
    assert!(out[3].is_nan(), "NaN must round-trip through the sentinel");
    // 327.68 · 100 saturates to i16::MAX − 1 = 32766.
    assert_eq!(out[4], 32766.0f32 / 100.0);
}

/// dims=[3,4], chunks=[2,4]: a [0..3, 1..3] window returns the projected
/// subarray and fetches exactly the two intersecting chunks.
#[test]
fn scenario_2d_window_fetches_only_needed_chunks() {
    let dims = [3u64, 4];
    let scale = 10.0;
    let data: Vec<f32> = (0..3)
        .flat_map(|r| (0..4).map(move |c| r as f32 * 10.0 + c as f32 * 0.1))
        .collect();
    let bytes = write_to_vec(&data, &dims, &[2, 4], Compression::IntQuantizedDelta, scale);
    let meta = parse_trailer(&bytes);

    let mut reader = OmReader::open(CountingBackend::new(bytes)).unwrap();
    reader.backend_mut().reads.clear();
    let out = reader.read(&[0..3, 1..3]).unwrap();

    assert_eq!(out.len(), 6);
    for r in 0..3usize {
        for c in 1..3usize {
            let original = r as f32 * 10.0 + c as f32 * 0.1;
            let expected =
                quantize::decode_linear(quantize::encode_linear(original, scale), scale);
            assert_eq!(out[r * 2 + (c - 1)], expected, "row {r} col {c}");
        }
    }

    // Every chunk intersects the window on axis 1, so both chunks load.
    let chunk_reads = count_reads_in(&reader, 3, meta.lut_offset);
    assert_eq!(chunk_reads, 2, "exactly chunks (0,0) and (1,0) fetched");
}

fn count_reads_in<R: ReadBackend>(
    reader: &OmReader<CountingBackend<R>>,
    from: u64,
    to: u64,
) -> usize {
    reader
        .backend()
        .reads
        .iter()
        .filter(|r| r.start >= from && r.end <= to)
        .count()
}

/// 100×100 sinusoid in float mode: bit-exact full read.
#[test]
fn scenario_float_sinusoid_is_bit_exact() {
    let dims = [100u64, 100];
    let data: Vec<f32> = (0..100)
        .flat_map(|i| (0..100).map(move |j| (i as f32 / 10.0).sin() * (j as f32 / 10.0).cos()))
        .collect();
    let bytes = write_to_vec(&data, &dims, &[20, 20], Compression::FloatXorDelta, 1.0);

    let mut reader = OmReader::open(bytes).unwrap();
    let out = reader.read_all().unwrap();
    for (i, (a, b)) in data.iter().zip(&out).enumerate() {
        assert_eq!(a.to_bits(), b.to_bits(), "element {i}");
    }
}

/// dims=[1000], chunks=[16] → 63 chunks, 64 LUT entries, one sub-chunk:
/// the LUT block on disk is exactly one stride long.
#[test]
fn scenario_single_lut_sub_chunk() {
    let data = fill_field(&[1000]);
    let bytes = write_to_vec(&data, &[1000], &[16], Compression::IntQuantizedDelta, 20.0);
    let meta = parse_trailer(&bytes);

    assert_eq!(meta.n_chunks, 63);
    let json_len = meta_json_len(&bytes);
    let lut_block_len = bytes.len() as u64 - 8 - json_len - meta.lut_offset;
    assert_eq!(lut_block_len, meta.lut_chunk_length);
}

/// dims=[100000], chunks=[64] → 1563 chunks → 7 padded LUT sub-chunks;
/// a one-element read costs at most 2 LUT fetches and exactly 1 chunk.
#[test]
fn scenario_seven_lut_sub_chunks_and_single_element_read() {
    let data = fill_field(&[100_000]);
    let bytes = write_to_vec(&data, &[100_000], &[64], Compression::IntQuantizedDelta, 20.0);
    let meta = parse_trailer(&bytes);

    assert_eq!(meta.n_chunks, 1563);
    let json_len = meta_json_len(&bytes);
    let lut_block_len = bytes.len() as u64 - 8 - json_len - meta.lut_offset;
    assert_eq!(lut_block_len, 7 * meta.lut_chunk_length);

    let lut_end = meta.lut_offset + lut_block_len;
    let mut reader = OmReader::open(CountingBackend::new(bytes)).unwrap();
    reader.backend_mut().reads.clear();
    let out = reader.read(&[500..501]).unwrap();
    assert_eq!(out.len(), 1);

    let lut_reads = count_reads_in(&reader, meta.lut_offset, lut_end);
    let chunk_reads = count_reads_in(&reader, 3, meta.lut_offset);
    assert!(lut_reads <= 2, "LUT fetches: {lut_reads}");
    assert_eq!(chunk_reads, 1, "data chunk fetches");
}

fn meta_json_len(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().unwrap())
}

/// Precipitation-style log mode: log-domain error bounded by 1/scale.
#[test]
fn scenario_log_mode_error_bound() {
    let input = [0.0f32, 0.1, 10.0, 100.0];
    let scale = 1000.0;
    let bytes = write_to_vec(&input, &[4], &[4], Compression::LogIntQuantizedDelta, scale);

    let mut reader = OmReader::open(bytes).unwrap();
    assert_eq!(reader.compression(), Compression::LogIntQuantizedDelta);
    let out = reader.read_all().unwrap();
    for (v, d) in input.iter().zip(&out) {
        let log_err = ((1.0 + v).log10() - (1.0 + d).log10()).abs();
        assert!(log_err <= 1.0 / scale, "v={v} decoded={d} log_err={log_err}");
    }
}

// ── universal properties ───────────────────────────────────────────────────

/// Float mode round-trips bit-exactly for ranks 1–4, with uneven chunk
/// edges on every axis.
#[test]
fn float_roundtrip_ranks_1_to_4() {
    let cases: [(&[u64], &[u64]); 4] = [
        (&[37], &[5]),
        (&[13, 9], &[4, 4]),
        (&[7, 6, 11], &[3, 2, 4]),
        (&[5, 4, 3, 7], &[2, 3, 1, 4]),
    ];
    for (dims, chunks) in cases {
        let data = fill_field(dims);
        let bytes = write_to_vec(&data, dims, chunks, Compression::FloatXorDelta, 1.0);
        let mut reader = OmReader::open(bytes).unwrap();
        let out = reader.read_all().unwrap();
        assert_eq!(data.len(), out.len());
        for (a, b) in data.iter().zip(&out) {
            assert_eq!(a.to_bits(), b.to_bits(), "dims {dims:?} chunks {chunks:?}");
        }
    }
}

/// Integer mode honours the quantization error bound everywhere and
/// restores NaN exactly.
#[test]
fn int_mode_quantization_bound() {
    let dims = [24u64, 18];
    let scale = 50.0;
    let mut data = fill_field(&dims);
    data[7] = f32::NAN;
    data[200] = f32::NAN;

    let bytes = write_to_vec(&data, &dims, &[5, 6], Compression::IntQuantizedDelta, scale);
    let mut reader = OmReader::open(bytes).unwrap();
    let out = reader.read_all().unwrap();
    for (i, (v, d)) in data.iter().zip(&out).enumerate() {
        if v.is_nan() {
            assert!(d.is_nan(), "element {i}");
        } else {
            assert!((v - d).abs() <= 1.0 / scale, "element {i}: {v} vs {d}");
        }
    }
}

/// Any window read equals the projection of the full decode.
#[test]
fn partial_read_equals_full_read_projection() {
    let dims = [9u64, 10, 7];
    let data = fill_field(&dims);
    let bytes = write_to_vec(&data, &dims, &[4, 3, 2], Compression::FloatXorDelta, 1.0);
    let mut reader = OmReader::open(bytes).unwrap();
    let full = reader.read_all().unwrap();

    let windows: [[Range<u64>; 3]; 4] = [
        [0..9, 0..10, 0..7],
        [2..5, 1..9, 3..4],
        [8..9, 9..10, 6..7],
        [0..1, 0..10, 0..7],
    ];
    for window in windows {
        let out = reader.read(&window).unwrap();
        let mut expected = Vec::new();
        for i in window[0].clone() {
            for j in window[1].clone() {
                for k in window[2].clone() {
                    expected.push(full[((i * dims[1] + j) * dims[2] + k) as usize]);
                }
            }
        }
        assert_eq!(out.len(), expected.len());
        for (a, b) in expected.iter().zip(&out) {
            assert_eq!(a.to_bits(), b.to_bits(), "window {window:?}");
        }
    }
}

/// Changing the values of one chunk leaves every other chunk's compressed
/// bytes untouched.
#[test]
fn chunk_independence() {
    let dims = [8u64, 8];
    let chunks = [4u64, 4];
    let data_a = fill_field(&dims);
    let mut data_b = data_a.clone();
    // Perturb only chunk (1, 1): rows 4.., cols 4..
    for r in 4..8usize {
        for c in 4..8usize {
            data_b[r * 8 + c] += 100.0;
        }
    }

    let bytes_a = write_to_vec(&data_a, &dims, &chunks, Compression::IntQuantizedDelta, 10.0);
    let bytes_b = write_to_vec(&data_b, &dims, &chunks, Compression::IntQuantizedDelta, 10.0);
    let meta = parse_trailer(&bytes_a);

    let mut lut_a = LutReader::sub_chunked(
        meta.lut_offset,
        meta.lut_chunk_length,
        meta.lut_sub_chunk_size,
        meta.n_chunks,
    )
    .unwrap();
    let meta_b = parse_trailer(&bytes_b);
    let mut lut_b = LutReader::sub_chunked(
        meta_b.lut_offset,
        meta_b.lut_chunk_length,
        meta_b.lut_sub_chunk_size,
        meta_b.n_chunks,
    )
    .unwrap();

    let mut backend_a = bytes_a.clone();
    let mut backend_b = bytes_b.clone();
    for chunk in 0..meta.n_chunks {
        let ra = lut_a.chunk_byte_range(&mut backend_a, chunk).unwrap();
        let rb = lut_b.chunk_byte_range(&mut backend_b, chunk).unwrap();
        let slice_a = &bytes_a[(3 + ra.start) as usize..(3 + ra.end) as usize];
        let slice_b = &bytes_b[(3 + rb.start) as usize..(3 + rb.end) as usize];
        if chunk == 3 {
            assert_ne!(slice_a, slice_b, "perturbed chunk must differ");
        } else {
            assert_eq!(slice_a, slice_b, "chunk {chunk} must be unaffected");
        }
    }
}

/// Every produced LUT is non-decreasing and its final entry is the chunk
/// stream length.
#[test]
fn lut_is_monotonic_and_complete() {
    let dims = [50u64, 11];
    let data = fill_field(&dims);
    let bytes = write_to_vec(&data, &dims, &[7, 4], Compression::IntQuantizedDelta, 20.0);
    let meta = parse_trailer(&bytes);

    let mut lut = LutReader::sub_chunked(
        meta.lut_offset,
        meta.lut_chunk_length,
        meta.lut_sub_chunk_size,
        meta.n_chunks,
    )
    .unwrap();
    let mut backend = bytes.clone();
    let mut prev = lut.entry(&mut backend, 0).unwrap();
    assert_eq!(prev, 0, "lut[0] is the chunk stream origin");
    for k in 1..=meta.n_chunks {
        let e = lut.entry(&mut backend, k).unwrap();
        assert!(e >= prev, "lut[{k}] = {e} < lut[{}] = {prev}", k - 1);
        prev = e;
    }
    assert_eq!(
        prev,
        meta.lut_offset - 3,
        "final entry equals chunk stream length"
    );
}

/// Writing in several chunk-aligned slabs produces the same file as one
/// whole-array write.
#[test]
fn multi_slab_write_matches_single_write() {
    let dims = [10u64, 6];
    let chunks = [2u64, 3];
    let data = fill_field(&dims);

    let whole = write_to_vec(&data, &dims, &chunks, Compression::IntQuantizedDelta, 10.0);

    let mut writer =
        OmWriter::new(Vec::new(), &dims, &chunks, Compression::IntQuantizedDelta, 10.0).unwrap();
    // 4 rows, then 6: both chunk-aligned on axis 0.
    writer
        .write_data(&data[..24], &[4, 6], &[0..4, 0..6])
        .unwrap();
    assert_eq!(writer.chunks_written(), 4);
    writer
        .write_data(&data[24..], &[6, 6], &[0..6, 0..6])
        .unwrap();
    assert_eq!(writer.chunks_written(), 10);
    let (slabbed, _) = writer.finish().unwrap();

    assert_eq!(whole, slabbed);
}

/// `read_into` places the window at an offset inside a larger buffer and
/// leaves the padding untouched.
#[test]
fn read_into_padded_buffer() {
    let dims = [6u64, 6];
    let data = fill_field(&dims);
    let bytes = write_to_vec(&data, &dims, &[2, 2], Compression::FloatXorDelta, 1.0);
    let mut reader = OmReader::open(bytes).unwrap();

    // 8×8 output with the 2×3 window placed at (1, 2).
    let mut out = vec![-1.0f32; 64];
    reader
        .read_into(&mut out, &[8, 8], &[1..3, 2..5], &[2..4, 1..4])
        .unwrap();
    for r in 0..8usize {
        for c in 0..8usize {
            let inside = (1..3).contains(&r) && (2..5).contains(&c);
            let got = out[r * 8 + c];
            if inside {
                let expected = data[(r + 1) * 6 + (c - 1)];
                assert_eq!(got.to_bits(), expected.to_bits(), "({r}, {c})");
            } else {
                assert_eq!(got, -1.0, "padding at ({r}, {c}) must be untouched");
            }
        }
    }
}

/// Whole write/read cycle through real files and the file backend.
#[test]
fn file_backend_roundtrip() {
    let dims = [40u64, 30];
    let data = fill_field(&dims);
    let path = temp_path("file_roundtrip");

    let file = std::fs::File::create(&path).unwrap();
    let mut writer =
        OmWriter::new(file, &dims, &[16, 16], Compression::IntQuantizedDelta, 100.0).unwrap();
    writer.write_all(&data).unwrap();
    writer.finish().unwrap();

    let mut reader = OmReader::open(FileBackend::open(&path).unwrap()).unwrap();
    assert_eq!(reader.dims(), &dims);
    assert_eq!(reader.n_chunks(), 6);
    let out = reader.read(&[10..20, 5..25]).unwrap();
    for (i, r) in (10..20u64).enumerate() {
        for (j, c) in (5..25u64).enumerate() {
            let v = data[(r * 30 + c) as usize];
            assert!(
                (out[i * 20 + j] - v).abs() <= 1.0 / 100.0,
                "({r}, {c}): {} vs {v}",
                out[i * 20 + j]
            );
        }
    }
    std::fs::remove_file(&path).ok();
}

// ── error paths ────────────────────────────────────────────────────────────

#[test]
fn bad_magic_is_not_an_om_file() {
    let bytes = vec![b'X', b'M', 3, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(matches!(
        OmReader::open(bytes),
        Err(OmError::NotAnOmFile)
    ));
}

#[test]
fn unknown_version_is_rejected() {
    let bytes = vec![0x4F, 0x4D, 9, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(matches!(
        OmReader::open(bytes),
        Err(OmError::UnsupportedVersion { found: 9 })
    ));
}

/// An out-of-bounds window fails before a single backend read happens.
#[test]
fn out_of_bounds_read_touches_nothing() {
    let data = fill_field(&[10, 10]);
    let bytes = write_to_vec(&data, &[10, 10], &[5, 5], Compression::IntQuantizedDelta, 10.0);

    let mut reader = OmReader::open(CountingBackend::new(bytes)).unwrap();
    reader.backend_mut().reads.clear();

    let err = reader.read(&[0..10, 4..11]).unwrap_err();
    match err {
        OmError::DimensionOutOfBounds { axis, range, allowed } => {
            assert_eq!(axis, 1);
            assert_eq!(range, 4..11);
            assert_eq!(allowed, 0..10);
        }
        other => panic!("expected DimensionOutOfBounds, got {other:?}"),
    }
    assert!(
        reader.backend().reads.is_empty(),
        "bounds failure must not read from the backend"
    );
}

#[test]
fn writer_rejects_misuse() {
    // Non-positive scale.
    assert!(matches!(
        OmWriter::new(Vec::new(), &[4], &[2], Compression::IntQuantizedDelta, 0.0),
        Err(OmError::InvalidDescriptor { .. })
    ));

    // Finish before all chunks are written.
    let writer =
        OmWriter::new(Vec::new(), &[4, 4], &[2, 4], Compression::IntQuantizedDelta, 1.0).unwrap();
    assert!(matches!(
        writer.finish(),
        Err(OmError::IncompleteWrite { written: 0, expected: 2 })
    ));

    // Slab not spanning the full trailing axes.
    let data = vec![0.0f32; 8];
    let mut writer =
        OmWriter::new(Vec::new(), &[4, 4], &[2, 4], Compression::IntQuantizedDelta, 1.0).unwrap();
    assert!(matches!(
        writer.write_data(&data, &[4, 2], &[0..4, 0..2]),
        Err(OmError::WindowShape { .. })
    ));

    // Unaligned first-axis extent.
    let data = vec![0.0f32; 12];
    let mut writer =
        OmWriter::new(Vec::new(), &[4, 4], &[2, 4], Compression::IntQuantizedDelta, 1.0).unwrap();
    assert!(matches!(
        writer.write_data(&data, &[3, 4], &[0..3, 0..4]),
        Err(OmError::WindowShape { .. })
    ));

    // More data than the array holds.
    let data = vec![0.0f32; 16];
    let mut writer =
        OmWriter::new(Vec::new(), &[4, 4], &[2, 4], Compression::IntQuantizedDelta, 1.0).unwrap();
    writer.write_all(&data).unwrap();
    assert!(matches!(
        writer.write_data(&data, &[4, 4], &[0..4, 0..4]),
        Err(OmError::WriteBeyondEnd { expected: 2 })
    ));
}

// ── legacy version 1 ───────────────────────────────────────────────────────

/// Hand-assemble a byte-level version-1 file: 40-byte fixed header,
/// uncompressed u64 LUT of cumulative chunk end offsets, chunk stream.
fn build_v1_fixture(data: &[f32], scale: f32) -> Vec<u8> {
    // dims [3, 4], chunks [2, 4] → chunk 0 is rows 0..2, chunk 1 is row 2.
    let header = LegacyHeader {
        version: 1,
        compression: Compression::IntQuantizedDelta,
        scale_factor: scale,
        dims: [3, 4],
        chunks: [2, 4],
    };
    let mut head = header.to_bytes();
    head[3] = 0xAB; // uninitialized compression byte, as v1 writers left it

    let mut stream = Vec::new();
    let mut ends = Vec::new();
    for (rows, elems) in [(2usize, &data[..8]), (1usize, &data[8..12])] {
        let mut q: Vec<i16> = elems
            .iter()
            .map(|&v| quantize::encode_linear(v, scale))
            .collect();
        delta2d::encode_i16(rows, 4, &mut q);
        let mut buf = vec![0u8; intcodec::max_compressed_len(q.len())];
        let n = intcodec::compress(&q, &mut buf);
        stream.extend_from_slice(&buf[..n]);
        ends.push(stream.len() as u64);
    }

    let mut file = Vec::with_capacity(LEGACY_HEADER_LEN + 16 + stream.len());
    file.extend_from_slice(&head);
    for e in &ends {
        file.extend_from_slice(&e.to_le_bytes());
    }
    file.extend_from_slice(&stream);
    file
}

#[test]
fn version_1_fixture_decodes() {
    let scale = 10.0;
    let data: Vec<f32> = (0..3)
        .flat_map(|r| (0..4).map(move |c| r as f32 * 2.5 - c as f32 * 0.3))
        .collect();
    let fixture = build_v1_fixture(&data, scale);

    let mut reader = OmReader::open(fixture).unwrap();
    assert_eq!(reader.version(), 1);
    assert_eq!(reader.dims(), &[3, 4]);
    // The garbage compression byte is overridden.
    assert_eq!(reader.compression(), Compression::IntQuantizedDelta);
    assert!(reader.trailer().is_none());

    let out = reader.read_all().unwrap();
    for (v, d) in data.iter().zip(&out) {
        let expected = quantize::decode_linear(quantize::encode_linear(*v, scale), scale);
        assert_eq!(*d, expected);
    }

    // Windowed reads work through the legacy LUT too.
    let row2 = reader.read(&[2..3, 0..4]).unwrap();
    assert_eq!(row2.len(), 4);
    for (c, d) in row2.iter().enumerate() {
        let v = data[8 + c];
        let expected = quantize::decode_linear(quantize::encode_linear(v, scale), scale);
        assert_eq!(*d, expected);
    }
}

#[test]
fn lut_pointing_past_eof_is_corrupt() {
    let data: Vec<f32> = (0..12).map(|i| i as f32).collect();
    let mut fixture = build_v1_fixture(&data, 10.0);
    // Overwrite chunk 1's end offset (second LUT entry) with a huge value.
    let entry = LEGACY_HEADER_LEN + 8;
    fixture[entry..entry + 8].copy_from_slice(&u64::MAX.to_le_bytes());

    let mut reader = OmReader::open(fixture).unwrap();
    assert!(matches!(
        reader.read(&[2..3, 0..4]),
        Err(OmError::CorruptLut { .. })
    ));
}

#[test]
fn chunk_size_mismatch_is_detected() {
    let data: Vec<f32> = (0..12).map(|i| (i % 5) as f32).collect();
    let mut fixture = build_v1_fixture(&data, 10.0);

    // Claim chunk 0 is one byte longer than it is and shift the stream so
    // the file stays self-consistent in length.
    let entry0 = LEGACY_HEADER_LEN;
    let end0 = u64::from_le_bytes(fixture[entry0..entry0 + 8].try_into().unwrap());
    let end1 = u64::from_le_bytes(fixture[entry0 + 8..entry0 + 16].try_into().unwrap());
    fixture[entry0..entry0 + 8].copy_from_slice(&(end0 + 1).to_le_bytes());
    fixture[entry0 + 8..entry0 + 16].copy_from_slice(&(end1 + 1).to_le_bytes());
    let insert_at = LEGACY_HEADER_LEN + 16 + end0 as usize;
    fixture.insert(insert_at, 0);

    let mut reader = OmReader::open(fixture).unwrap();
    let err = reader.read(&[0..2, 0..4]).unwrap_err();
    assert!(
        matches!(err, OmError::ChunkDecodeMismatch { chunk_index: 0, .. }),
        "got {err:?}"
    );
}

#[test]
fn empty_window_reads_nothing() {
    let data = fill_field(&[6, 6]);
    let bytes = write_to_vec(&data, &[6, 6], &[3, 3], Compression::FloatXorDelta, 1.0);
    let mut reader = OmReader::open(CountingBackend::new(bytes)).unwrap();
    reader.backend_mut().reads.clear();
    let out = reader.read(&[2..2, 0..6]).unwrap();
    assert!(out.is_empty());
    assert!(reader.backend().reads.is_empty());
}
