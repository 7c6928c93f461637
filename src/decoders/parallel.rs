//! Parallel bus decoder
//!
//! Samples up to eight data lines on a clock trigger. A word is reported
//! once the next trigger arrives, so it spans from its own trigger to the
//! next one.

use super::types::{StrobeMode, hex_word};
use crate::decode::decoder::DecoderInfo;
use crate::runtime::engine::InstanceConfig;
use crate::runtime::errors::EngineError;
use crate::runtime::native::{AnnotationSink, DecoderEntry, LogicChunk, ProtocolDecoder};
use tracing::trace;

pub const CLASS_WORD: u32 = 0;

/// Number of data lines
pub const MAX_DATA_BITS: usize = 8;

pub fn info() -> DecoderInfo {
    let mut info = DecoderInfo::new("parallel", "Parallel")
        .with_longname("Parallel sync bus")
        .with_channel("clk", "CLK", "Clock line")
        .with_channel("d0", "D0", "Data line 0");
    for i in 1..MAX_DATA_BITS {
        let id = format!("d{}", i);
        let name = format!("D{}", i);
        let desc = format!("Data line {}", i);
        info = info.with_optional_channel(&id, &name, &desc);
    }
    info.with_annotation("word", "Word")
        .with_annotation_row("words", "Words", &[CLASS_WORD])
}

pub fn entry() -> DecoderEntry {
    DecoderEntry::new(info(), |config| Ok(Box::new(ParallelDecoder::from_config(config)?)))
}

/// Parallel bus decoder
pub struct ParallelDecoder {
    clk: usize,
    /// Bit index per data line, `None` for unassigned lines
    data: Vec<Option<usize>>,
    mode: StrobeMode,

    last_strobe_value: Option<bool>,
    /// Trigger sample and value of the word waiting for the next trigger
    pending: Option<(u64, u32)>,
}

impl ParallelDecoder {
    pub fn new(clk: usize, data: Vec<Option<usize>>, mode: StrobeMode) -> Self {
        assert!(
            !data.is_empty() && data.len() <= MAX_DATA_BITS,
            "Data bits must be 1-8"
        );
        Self {
            clk,
            data,
            mode,
            last_strobe_value: None,
            pending: None,
        }
    }

    pub fn from_config(config: &InstanceConfig) -> Result<Self, EngineError> {
        let clk = config.required_channel("clk")?;
        config.required_channel("d0")?;

        let mut data: Vec<_> = (0..MAX_DATA_BITS)
            .map(|i| config.channel(&format!("d{}", i)))
            .collect();
        while data.last().is_some_and(Option::is_none) {
            data.pop();
        }

        let mode = match config.str_option("clock_edge", "rising")? {
            "rising" => StrobeMode::RisingEdge,
            "falling" => StrobeMode::FallingEdge,
            "either" => StrobeMode::AnyEdge,
            other => {
                return Err(config.invalid_option(
                    "clock_edge",
                    format!("expected rising, falling or either, got '{}'", other),
                ));
            }
        };

        Ok(Self::new(clk, data, mode))
    }

    fn sample_data(&self, chunk: &LogicChunk<'_>, sample: u64) -> u32 {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(bit, channel)| channel.map(|c| (bit, c)))
            .filter(|&(_, channel)| chunk.bit(sample, channel))
            .fold(0, |value, (bit, _)| value | (1 << bit))
    }
}

impl ProtocolDecoder for ParallelDecoder {
    fn start(&mut self, _samplerate: u64) {
        self.last_strobe_value = None;
        self.pending = None;
    }

    fn decode(&mut self, chunk: &LogicChunk<'_>, out: &mut AnnotationSink) -> Result<(), EngineError> {
        for sample in chunk.samples() {
            let level = chunk.bit(sample, self.clk);
            let Some(prev) = self.last_strobe_value.replace(level) else {
                continue;
            };
            if !self.mode.triggered(prev, level) {
                continue;
            }

            if let Some((start, value)) = self.pending.take() {
                out.put(start, sample, CLASS_WORD, vec![hex_word(value, self.data.len() as u32)]);
            }

            let value = self.sample_data(chunk, sample);
            trace!("Word 0x{:02X} at sample {}", value, sample);
            self.pending = Some((sample, value));
        }
        Ok(())
    }
}
