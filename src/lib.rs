//! Streaming protocol decoding of logic analyzer captures
//!
//! A [`DecoderStack`] feeds captured samples through an ordered chain of
//! protocol decoders and collects their output as time-indexed annotations,
//! grouped into display rows.
//!
//! # Architecture
//!
//! - **DecoderStack**: Owns the decoder chain and one background worker per
//!   decode run. Decodes while the capture is still growing.
//! - **DecodeEngine**: The (possibly non-reentrant) engine running the
//!   decoder algorithms. [`NativeEngine`] runs the built-in decoders.
//! - **Rows**: Annotations are classified per decoder and class into rows
//!   that consumers query by sample range.
//! - **DslCapture**: Loads DSLogic `.dsl` files into a logic source.
//!
//! # Example
//!
//! ```no_run
//! use decode_stack::{CaptureState, CaptureStateCell, Decoder, DecoderStack, DslCapture, NativeEngine};
//! use std::sync::Arc;
//!
//! let (_logic, signals) = DslCapture::open("capture.dsl")?.into_logic();
//! let engine = NativeEngine::with_builtin_decoders();
//! let spi = engine.decoder_info("spi").unwrap();
//!
//! let stack = DecoderStack::new(
//!     Arc::new(CaptureStateCell::new(CaptureState::Stopped)),
//!     Arc::new(engine),
//! )
//! .with_decoder(
//!     Decoder::new(spi)
//!         .with_channel("clk", signals[0].clone())
//!         .with_channel("mosi", signals[1].clone()),
//! );
//!
//! stack.begin_decode();
//! stack.wait();
//! for row in stack.get_visible_rows() {
//!     for annotation in stack.get_annotation_subset(&row, 0, u64::MAX) {
//!         println!("{}: {}", row.title(), annotation);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod decode;
pub mod decoders;
pub mod runtime;
pub mod sources;

pub use decode::{
    Annotation, ClassificationTable, DecodeConfig, Decoder, DecoderInfo, DecoderStack, Row, RowData,
};
pub use runtime::{
    CaptureSession, CaptureState, CaptureStateCell, DecodeEngine, DecodeEvent, EngineError, EngineLock,
    EngineSession, Logic, LogicSegment, LogicSignal, NativeEngine, OptionValue, ProtoData, Segment,
    StackError,
};
pub use sources::DslCapture;

/// Errors loading or assembling captured data
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Header parsing error: {0}")]
    ParseHeader(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid probe number: {0}")]
    InvalidProbe(usize),

    #[error("Invalid block number: {0}")]
    InvalidBlock(u64),

    #[error("Position out of bounds: {0}")]
    OutOfBounds(u64),

    #[error("Payload of {len} bytes is not a multiple of the unit size {unit_size}")]
    PartialUnit { len: usize, unit_size: usize },
}

pub type Result<T> = std::result::Result<T, CaptureError>;
