use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use om_core::lut::LutReader;
use om_core::{Compression, FileBackend, OmReader, OmWriter};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "om",
    about = "OM format — chunked, compressed, random-access numeric arrays",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress raw little-endian f32 values into an OM file
    Create {
        /// Source of raw f32 LE values ("-" reads stdin)
        input: PathBuf,
        /// Destination OM file
        output: PathBuf,
        /// Array dimensions, outermost first, e.g. "721,1440"
        #[arg(short, long)]
        dims: String,
        /// Chunk extents, same rank as --dims, e.g. "20,20"
        #[arg(short, long)]
        chunks: String,
        /// Scale factor for integer quantization
        #[arg(short, long, default_value_t = 20.0)]
        scale: f32,
        /// Compression mode: int | float | log
        #[arg(long, default_value = "int")]
        compression: String,
    },
    /// Print envelope metadata and chunk statistics
    Inspect {
        /// OM file to inspect
        file: PathBuf,
        /// Print the per-chunk offset table
        #[arg(long)]
        lut: bool,
    },
    /// Read a hyper-rectangle and write raw f32 LE values
    Read {
        /// OM file
        file: PathBuf,
        /// Destination for raw f32 LE values ("-" writes stdout)
        output: PathBuf,
        /// Window per axis, e.g. "0..100,250..300"; whole array if omitted
        #[arg(short, long)]
        window: Option<String>,
        /// Print values as text instead of raw bytes
        #[arg(long)]
        text: bool,
    },
}

// ── helpers ────────────────────────────────────────────────────────────────

fn parse_dims(spec: &str) -> anyhow::Result<Vec<u64>> {
    spec.split(',')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .with_context(|| format!("invalid dimension '{}'", part.trim()))
        })
        .collect()
}

fn parse_window(spec: &str) -> anyhow::Result<Vec<Range<u64>>> {
    spec.split(',')
        .map(|part| {
            let part = part.trim();
            let (lo, hi) = part
                .split_once("..")
                .with_context(|| format!("window axis '{part}' must look like 'lo..hi'"))?;
            Ok(lo.parse::<u64>()?..hi.parse::<u64>()?)
        })
        .collect()
}

fn compression_from_name(name: &str) -> anyhow::Result<Compression> {
    match name {
        "int" | "int_quantized_delta" => Ok(Compression::IntQuantizedDelta),
        "float" | "float_xor_delta" => Ok(Compression::FloatXorDelta),
        "log" | "log_int_quantized_delta" => Ok(Compression::LogIntQuantizedDelta),
        other => anyhow::bail!("unknown compression '{}'. Valid options: int, float, log", other),
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Read exactly `buf.len()` bytes unless the source ends first; returns the
/// bytes actually read.
fn read_up_to(src: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ── subcommand implementations ─────────────────────────────────────────────

fn run_create(
    input: PathBuf,
    output: PathBuf,
    dims: &str,
    chunks: &str,
    scale: f32,
    compression: &str,
) -> anyhow::Result<()> {
    let dims = parse_dims(dims)?;
    let chunks = parse_dims(chunks)?;
    let compression = compression_from_name(compression)?;

    let mut src: Box<dyn Read> = if input.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(&input).with_context(|| format!("opening input file {:?}", input))?,
        ))
    };

    let sink = File::create(&output)
        .with_context(|| format!("creating output file {:?}", output))?;
    let mut writer = OmWriter::new(sink, &dims, &chunks, compression, scale)?;

    // Stream slab by slab: one slab is a full row of chunks along axis 0.
    let trailing: u64 = dims[1..].iter().product();
    let slab_rows = chunks[0];
    let mut row = 0u64;
    let mut total_values = 0u64;
    let t0 = Instant::now();
    let mut byte_buf = vec![0u8; (slab_rows * trailing * 4) as usize];
    while row < dims[0] {
        let rows = slab_rows.min(dims[0] - row);
        let want = (rows * trailing * 4) as usize;
        let got = read_up_to(&mut src, &mut byte_buf[..want])?;
        if got < want {
            anyhow::bail!(
                "input ended early: expected {} f32 values, got {}",
                dims.iter().product::<u64>(),
                total_values + (got as u64 / 4)
            );
        }
        let values: Vec<f32> = byte_buf[..want]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(b.try_into().expect("4-byte chunk")))
            .collect();
        let mut slab_dims = dims.clone();
        slab_dims[0] = rows;
        let window: Vec<Range<u64>> = slab_dims.iter().map(|&d| 0..d).collect();
        writer.write_data(&values, &slab_dims, &window)?;
        total_values += rows * trailing;
        row += rows;
    }
    let (_, meta) = writer.finish()?;
    let elapsed = t0.elapsed();

    let out_size = std::fs::metadata(&output)?.len();
    let raw_size = total_values * 4;
    eprintln!("  compression : {}", meta.compression);
    eprintln!("  dims        : {:?}", meta.dims);
    eprintln!("  chunks      : {:?} ({} total)", meta.chunks, meta.n_chunks);
    eprintln!("  raw size    : {}", human_bytes(raw_size));
    eprintln!("  file size   : {}", human_bytes(out_size));
    eprintln!("  ratio       : {:.2}x", raw_size as f64 / out_size as f64);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_lut: bool) -> anyhow::Result<()> {
    let mut reader = OmReader::open(FileBackend::open(&file)?)?;
    let file_size = std::fs::metadata(&file)?.len();
    let raw_size = reader.dims().iter().product::<u64>() * 4;
    let payload = reader.chunk_stream_len()?;

    println!("=== OM file: {:?} ===", file);
    println!();
    println!("  format version : {}", reader.version());
    println!("  compression    : {}", reader.compression());
    println!("  scale factor   : {}", reader.scale_factor());
    println!("  dims           : {:?}", reader.dims());
    println!("  chunks         : {:?}", reader.chunks());
    println!("  chunk count    : {}", reader.n_chunks());
    println!("  raw size       : {}", human_bytes(raw_size));
    println!("  chunk stream   : {}", human_bytes(payload));
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.2}x", raw_size as f64 / file_size as f64);
    if let Some(meta) = reader.trailer() {
        let sub_chunks = (meta.n_chunks + 1).div_ceil(meta.lut_sub_chunk_size);
        println!(
            "  lut            : {} sub-chunks × {} entries, stride {}",
            sub_chunks,
            meta.lut_sub_chunk_size,
            human_bytes(meta.lut_chunk_length)
        );
    } else {
        println!("  lut            : legacy uncompressed table");
    }

    if show_lut {
        let Some(meta) = reader.trailer().cloned() else {
            anyhow::bail!("--lut is only supported for version-3 files");
        };
        let mut lut = LutReader::sub_chunked(
            meta.lut_offset,
            meta.lut_chunk_length,
            meta.lut_sub_chunk_size,
            meta.n_chunks,
        )?;
        let mut backend = FileBackend::open(&file)?;
        println!();
        println!("  {:>8}  {:>14}  {:>12}", "chunk", "stream offset", "compressed");
        println!("  {}", "-".repeat(40));
        for index in 0..meta.n_chunks {
            let range = lut.chunk_byte_range(&mut backend, index)?;
            println!(
                "  {:>8}  {:>14}  {:>12}",
                index,
                range.start,
                human_bytes(range.end - range.start)
            );
        }
    }

    Ok(())
}

fn run_read(
    file: PathBuf,
    output: PathBuf,
    window: Option<String>,
    text: bool,
) -> anyhow::Result<()> {
    let mut reader = OmReader::open(FileBackend::open(&file)?)?;
    let window = match window {
        Some(spec) => parse_window(&spec)?,
        None => reader.dims().iter().map(|&d| 0..d).collect(),
    };

    let t0 = Instant::now();
    let values = reader.read(&window)?;
    let elapsed = t0.elapsed();
    eprintln!(
        "  read {} values from {:?} in {:.3}ms",
        values.len(),
        window,
        elapsed.as_secs_f64() * 1000.0
    );

    let is_stdout = output.to_str() == Some("-");
    let mut dst: Box<dyn Write> = if is_stdout {
        Box::new(io::stdout().lock())
    } else {
        Box::new(
            File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
        )
    };

    if text {
        for v in &values {
            writeln!(dst, "{v}")?;
        }
    } else {
        for v in &values {
            dst.write_all(&v.to_le_bytes())?;
        }
    }
    dst.flush()?;
    Ok(())
}

// ── entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Create {
            input,
            output,
            dims,
            chunks,
            scale,
            compression,
        } => run_create(input, output, &dims, &chunks, scale, &compression),
        Commands::Inspect { file, lut } => run_inspect(file, lut),
        Commands::Read {
            file,
            output,
            window,
            text,
        } => run_read(file, output, window, text),
    }
}
