//! OM format walkthrough.
//!
//! Generates a synthetic 721×1440 global field (a plausible 0.25° weather
//! grid), writes it as an OM file with integer quantization, then shows the
//! core random-access claim: a small window decodes in a fraction of the
//! full-file time because only the chunks under the window are touched.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use om_core::{Compression, FileBackend, OmReader, OmWriter};

const DIMS: [u64; 2] = [721, 1440];
const CHUNKS: [u64; 2] = [20, 20];
const SCALE: f32 = 20.0; // 0.05 quantization step

/// Smooth synthetic temperature-like field over a lat/lon grid.
fn generate_field() -> Vec<f32> {
    let mut data = Vec::with_capacity((DIMS[0] * DIMS[1]) as usize);
    for lat in 0..DIMS[0] {
        for lon in 0..DIMS[1] {
            let y = lat as f32 / DIMS[0] as f32;
            let x = lon as f32 / DIMS[1] as f32;
            let v = 15.0 - 40.0 * (y - 0.5).powi(2) * 4.0
                + 6.0 * (x * 12.0).sin() * (y * 7.0).cos();
            data.push(v);
        }
    }
    data
}

fn main() -> Result<()> {
    let path = std::env::temp_dir().join("om_demo.om");
    let data = generate_field();
    let raw_size = data.len() as u64 * 4;

    // ── write ──────────────────────────────────────────────────────────────
    let t0 = Instant::now();
    let sink = std::fs::File::create(&path)?;
    let mut writer = OmWriter::new(sink, &DIMS, &CHUNKS, Compression::IntQuantizedDelta, SCALE)?;
    writer.write_all(&data)?;
    let (_, meta) = writer.finish()?;
    let write_elapsed = t0.elapsed();

    let file_size = std::fs::metadata(&path)?.len();
    println!("=== wrote {} ===", path.display());
    println!("  dims        : {:?}, chunks {:?} ({} total)", meta.dims, meta.chunks, meta.n_chunks);
    println!("  raw         : {:.2} MB", raw_size as f64 / 1e6);
    println!("  on disk     : {:.2} MB ({:.2}x)", file_size as f64 / 1e6, raw_size as f64 / file_size as f64);
    println!("  write time  : {:.1}ms", write_elapsed.as_secs_f64() * 1000.0);

    // ── full read ──────────────────────────────────────────────────────────
    let mut reader = OmReader::open(FileBackend::open(&path)?)?;
    let t0 = Instant::now();
    let full = reader.read_all()?;
    let full_elapsed = t0.elapsed();
    println!();
    println!("full read: {} values in {:.1}ms", full.len(), full_elapsed.as_secs_f64() * 1000.0);

    // ── windowed read: a 2°×2° patch ───────────────────────────────────────
    let window = [300..308u64, 700..708u64];
    let t0 = Instant::now();
    let patch = reader.read(&window)?;
    let patch_elapsed = t0.elapsed();
    println!(
        "patch read: {} values in {:.3}ms (touches 1 of {} chunks)",
        patch.len(),
        patch_elapsed.as_secs_f64() * 1000.0,
        meta.n_chunks
    );

    // Verify against the in-memory field.
    let mut worst = 0.0f32;
    for (i, lat) in (window[0].start..window[0].end).enumerate() {
        for (j, lon) in (window[1].start..window[1].end).enumerate() {
            let original = data[(lat * DIMS[1] + lon) as usize];
            let decoded = patch[i * 8 + j];
            worst = worst.max((original - decoded).abs());
        }
    }
    println!("max quantization error in patch: {:.4} (step {:.4})", worst, 1.0 / SCALE);

    cleanup(&path);
    Ok(())
}

fn cleanup(path: &Path) {
    std::fs::remove_file(path).ok();
}
