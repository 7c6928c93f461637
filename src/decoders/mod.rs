//! Protocol decoders for the native engine

pub mod parallel;
pub mod spi;
pub mod types;

use crate::decode::decoder::DecoderInfo;
use crate::runtime::native::DecoderEntry;
use std::sync::Arc;

pub use parallel::ParallelDecoder;
pub use spi::SpiDecoder;
pub use types::{CsPolarity, SpiMode, StrobeMode};

lazy_static::lazy_static! {
    static ref BUILTIN_DECODERS: Vec<DecoderEntry> = vec![spi::entry(), parallel::entry()];
}

/// All decoders shipped with this crate
pub fn builtin() -> &'static [DecoderEntry] {
    &BUILTIN_DECODERS
}

/// Metadata of a built-in decoder
pub fn decoder_info(id: &str) -> Option<Arc<DecoderInfo>> {
    builtin()
        .iter()
        .find(|entry| entry.info.id == id)
        .map(|entry| Arc::clone(&entry.info))
}
