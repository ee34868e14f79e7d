//! binviz command line tool
//!
//! Streams a file (or an inline hex byte vector) through the visualization
//! sink and exports the resulting raster.
//!
//! Usage:
//!   binviz --input capture.bin --width 128 --start 01111110 --pgm out.pgm
//!   binviz --bytes "00 55 55" --width 16 --height 2 --skip-zero-bytes --text
//!   binviz --input capture.bin --config binviz.toml --gui

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use binviz::{BinvizConfig, FileSource, Pipeline, VectorSource, VizSink, logging};
use clap::{ArgGroup, Parser};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Lay out a bit stream as dots, one packet per line")]
#[command(group(ArgGroup::new("source").required(true).args(["input", "bytes"])))]
struct Args {
    /// File whose bytes are visualized
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Inline bytes as hex, e.g. "00 55 55" or "005555"
    #[arg(long, value_parser = parse_hex)]
    bytes: Option<HexBytes>,

    /// Skip this many bytes of the input file
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Read at most this many bytes of the input file
    #[arg(long)]
    limit: Option<usize>,

    /// TOML config file; command line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Raster width in dots
    #[arg(long)]
    width: Option<usize>,

    /// Raster height in dots
    #[arg(long)]
    height: Option<usize>,

    /// Bit pattern that starts a packet (new line before it)
    #[arg(long)]
    start: Option<String>,

    /// Bit pattern that ends a packet (new line after it)
    #[arg(long)]
    end: Option<String>,

    /// Bit pattern removed from the stream (ignored when both start and end are set)
    #[arg(long)]
    drop: Option<String>,

    /// Ignore 0x00 bytes
    #[arg(long)]
    skip_zero_bytes: bool,

    /// Paint bits still held for pattern matching at end of stream
    #[arg(long)]
    flush: bool,

    /// Write the raster as a binary PGM image
    #[arg(long)]
    pgm: Option<PathBuf>,

    /// Print the raster as text ('#' on, '.' off)
    #[arg(long)]
    text: bool,

    /// Show the raster in a live window
    #[cfg(feature = "gui")]
    #[arg(long)]
    gui: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Bytes given on the command line as hex
#[derive(Debug, Clone, PartialEq, Eq)]
struct HexBytes(Vec<u8>);

fn parse_hex(text: &str) -> Result<HexBytes, String> {
    let digits: String = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", text));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = digits.get(i..i + 2).ok_or_else(|| format!("invalid hex in '{}'", text))?;
            u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte '{}'", pair))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(HexBytes)
}

fn load_config(args: &Args) -> binviz::Result<BinvizConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Config: {}", path.display());
            BinvizConfig::from_file(path)?
        }
        None => BinvizConfig::default(),
    };

    let sink = &mut config.sink;
    if let Some(width) = args.width {
        sink.width = width;
    }
    if let Some(height) = args.height {
        sink.height = height;
    }
    if let Some(start) = &args.start {
        sink.start_pattern = start.clone();
    }
    if let Some(end) = &args.end {
        sink.end_pattern = end.clone();
    }
    if let Some(drop) = &args.drop {
        sink.drop_pattern = drop.clone();
    }
    sink.skip_zero_bytes |= args.skip_zero_bytes;
    sink.flush_on_close |= args.flush;

    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = load_config(&args)?;
    info!(
        "Raster {}x{}, start='{}' end='{}' drop='{}' skip_zero_bytes={}",
        config.sink.width,
        config.sink.height,
        config.sink.start_pattern,
        config.sink.end_pattern,
        config.sink.drop_pattern,
        config.sink.skip_zero_bytes
    );

    let mut pipeline = Pipeline::new()
        .with_default_buffer_size(config.runtime.buffer_size)
        .with_watchdog_threshold(config.runtime.watchdog_threshold());

    match (&args.input, &args.bytes) {
        (Some(path), _) => {
            let mut source = FileSource::open(path)?.with_offset(args.offset);
            if let Some(limit) = args.limit {
                source = source.with_limit(limit);
            }
            pipeline.add_process("source", source)?;
        }
        (None, Some(bytes)) => pipeline.add_process("source", VectorSource::new(bytes.0.clone()))?,
        (None, None) => return Err("one of --input or --bytes is required".into()),
    }

    let sink = VizSink::from_config(&config.sink)?;
    let raster = sink.raster();
    pipeline.add_process("sink", sink)?;
    pipeline.connect("source", "out", "sink", "in")?;

    info!("Running...");
    let scheduler = pipeline.build()?;

    #[cfg(feature = "gui")]
    if args.gui {
        binviz::viz::viewer::run(raster.clone(), &config.viewer)?;
        if !scheduler.is_finished() {
            info!("Viewer closed before end of stream, stopping");
            scheduler.stop();
        }
    }

    let report = scheduler.wait();
    for failure in report.failures() {
        error!("Node '{}' failed: {:?}", failure.name, failure.outcome);
    }

    let raster = raster.lock().map_err(|_| "raster lock poisoned")?;
    if let Some(path) = &args.pgm {
        raster.write_pgm(BufWriter::new(File::create(path)?))?;
        info!("Wrote {}", path.display());
    }
    if args.text {
        print!("{}", raster.render_text());
    }

    if !report.is_success() {
        return Err("flowgraph finished with errors".into());
    }
    info!("Done!");
    Ok(())
}
