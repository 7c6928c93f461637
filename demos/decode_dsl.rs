//! Example: Decode a DSLogic capture with a decoder stack
//!
//! Loads a .dsl file, decodes it with the built-in SPI or parallel decoder
//! and prints the annotations of every visible row.
//!
//! Usage:
//!   cargo run --release --example decode_dsl -- \
//!       --file scan.dsl spi --clk 7 --mosi 6 --cs 8 -n 100
//!
//!   cargo run --release --example decode_dsl -- \
//!       --file scan.dsl parallel --clk 7 --data 0,1,2,3 --clock-edge falling

use clap::{Parser, Subcommand};
use decode_stack::{
    CaptureState, CaptureStateCell, DecodeConfig, DecodeEvent, Decoder, DecoderStack, DslCapture, LogicSignal,
    NativeEngine,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to DSL file
    #[arg(short, long)]
    file: String,

    /// Number of annotations to print per row (0 = unlimited)
    #[arg(short, long, default_value = "100", global = true)]
    n: usize,

    /// Bytes of sample data per chunk handed to the engine
    #[arg(long, global = true)]
    chunk_bytes: Option<usize>,

    #[command(subcommand)]
    decoder: DecoderArgs,
}

#[derive(Subcommand, Debug)]
enum DecoderArgs {
    /// Serial Peripheral Interface
    Spi {
        /// SPI clock channel
        #[arg(long)]
        clk: usize,

        /// SPI MOSI channel
        #[arg(long)]
        mosi: Option<usize>,

        /// SPI MISO channel
        #[arg(long)]
        miso: Option<usize>,

        /// SPI chip select channel
        #[arg(long)]
        cs: Option<usize>,

        /// Clock polarity (0 or 1)
        #[arg(long, default_value = "0")]
        cpol: i64,

        /// Clock phase (0 or 1)
        #[arg(long, default_value = "0")]
        cpha: i64,

        /// Bits per word
        #[arg(long, default_value = "8")]
        wordsize: i64,

        /// Chip select polarity: active-low or active-high
        #[arg(long, default_value = "active-low")]
        cs_polarity: String,
    },
    /// Parallel sync bus
    Parallel {
        /// Clock channel
        #[arg(long)]
        clk: usize,

        /// Data channels, D0 first
        #[arg(long, value_delimiter = ',', required = true)]
        data: Vec<usize>,

        /// Clock edge: rising, falling or either
        #[arg(long, default_value = "rising")]
        clock_edge: String,
    },
}

fn signal(signals: &[LogicSignal], index: usize) -> Result<LogicSignal, String> {
    signals
        .get(index)
        .cloned()
        .ok_or_else(|| format!("Channel {} not in capture ({} probes)", index, signals.len()))
}

fn build_decoder(
    args: &DecoderArgs,
    engine: &NativeEngine,
    signals: &[LogicSignal],
) -> Result<Decoder, Box<dyn std::error::Error>> {
    let decoder = match args {
        DecoderArgs::Spi {
            clk,
            mosi,
            miso,
            cs,
            cpol,
            cpha,
            wordsize,
            cs_polarity,
        } => {
            let info = engine.decoder_info("spi").ok_or("spi decoder not registered")?;
            let mut decoder = Decoder::new(info)
                .with_channel("clk", signal(signals, *clk)?)
                .with_option("cpol", *cpol)
                .with_option("cpha", *cpha)
                .with_option("wordsize", *wordsize)
                .with_option("cs_polarity", cs_polarity.as_str());
            for (id, channel) in [("mosi", mosi), ("miso", miso), ("cs", cs)] {
                if let Some(channel) = channel {
                    decoder.set_channel(id, signal(signals, *channel)?);
                }
            }
            decoder
        }
        DecoderArgs::Parallel { clk, data, clock_edge } => {
            let info = engine
                .decoder_info("parallel")
                .ok_or("parallel decoder not registered")?;
            let mut decoder = Decoder::new(info)
                .with_channel("clk", signal(signals, *clk)?)
                .with_option("clock_edge", clock_edge.as_str());
            for (bit, channel) in data.iter().enumerate() {
                decoder.set_channel(format!("d{}", bit), signal(signals, *channel)?);
            }
            decoder
        }
    };
    Ok(decoder)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== Decode DSL Example ===");
    info!("File: {}", args.file);

    let capture = DslCapture::open(&args.file)?;
    info!(
        "Capture: {} probes, {} samples at {:.1} MHz",
        capture.total_probes(),
        capture.total_samples(),
        capture.samplerate_hz() / 1_000_000.0
    );
    let (_logic, signals) = capture.into_logic();

    let engine = NativeEngine::with_builtin_decoders();
    let decoder = build_decoder(&args.decoder, &engine, &signals)?;

    let mut config = DecodeConfig::default();
    if let Some(chunk_bytes) = args.chunk_bytes {
        config = config.with_chunk_bytes(chunk_bytes);
    }

    let stack = DecoderStack::new(
        Arc::new(CaptureStateCell::new(CaptureState::Stopped)),
        Arc::new(engine),
    )
    .with_config(config)
    .with_decoder(decoder);

    let events = stack.subscribe();
    stack.begin_decode();
    stack.wait();

    for event in events.try_iter() {
        if let DecodeEvent::Error(message) = event {
            error!("Decode failed: {}", message);
        }
    }
    if !stack.error_message().is_empty() {
        return Err(stack.error_message().into());
    }

    info!("Decoded {} samples", stack.samples_decoded());

    for row in stack.get_visible_rows() {
        let annotations = stack.get_annotation_subset(&row, 0, stack.max_sample_count());
        println!("== {} ({} annotations)", row.title(), annotations.len());

        let limit = if args.n == 0 { annotations.len() } else { args.n };
        for annotation in annotations.iter().take(limit) {
            let seconds = annotation.start_sample() as f64 / stack.samplerate() + stack.start_time();
            println!("{:>12.9}s  {}", seconds, annotation);
        }
    }

    Ok(())
}
