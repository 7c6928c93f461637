//! SPI decoder, sample by sample
//!
//! Flow per transaction:
//!   1. CS goes active (or is not assigned, in which case it always is)
//!   2. Each CLK sampling edge shifts one MOSI/MISO bit in, MSB first
//!   3. After `wordsize` bits one annotation per data line is emitted,
//!      spanning the first to the last sampling edge of the word
//!   4. CS going inactive with a partial word emits a warning
//!
//! Level and edge state persists across chunks, so words may straddle
//! chunk boundaries.

use super::types::{CsPolarity, SpiMode, flag_option, hex_word};
use crate::decode::decoder::DecoderInfo;
use crate::runtime::engine::InstanceConfig;
use crate::runtime::errors::EngineError;
use crate::runtime::native::{AnnotationSink, DecoderEntry, LogicChunk, ProtocolDecoder};
use tracing::debug;

pub const CLASS_MOSI_DATA: u32 = 0;
pub const CLASS_MISO_DATA: u32 = 1;
pub const CLASS_WARNING: u32 = 2;

pub fn info() -> DecoderInfo {
    DecoderInfo::new("spi", "SPI")
        .with_longname("Serial Peripheral Interface")
        .with_channel("clk", "CLK", "Clock")
        .with_optional_channel("miso", "MISO", "Master in, slave out")
        .with_optional_channel("mosi", "MOSI", "Master out, slave in")
        .with_optional_channel("cs", "CS#", "Chip-select")
        .with_annotation("mosi-data", "MOSI data")
        .with_annotation("miso-data", "MISO data")
        .with_annotation("warning", "Warning")
        .with_annotation_row("mosi-data", "MOSI data", &[CLASS_MOSI_DATA])
        .with_annotation_row("miso-data", "MISO data", &[CLASS_MISO_DATA])
        .with_annotation_row("warnings", "Warnings", &[CLASS_WARNING])
}

pub fn entry() -> DecoderEntry {
    DecoderEntry::new(info(), |config| Ok(Box::new(SpiDecoder::from_config(config)?)))
}

/// Word being shifted in
#[derive(Debug, Default)]
struct PartialWord {
    mosi: u32,
    miso: u32,
    bits: u32,
    start: u64,
}

/// SPI protocol decoder
pub struct SpiDecoder {
    clk: usize,
    mosi: Option<usize>,
    miso: Option<usize>,
    cs: Option<usize>,
    mode: SpiMode,
    bits_per_word: u32,
    cs_polarity: CsPolarity,

    prev_clk: Option<bool>,
    prev_cs_active: bool,
    word: PartialWord,

    /// Word counter for logging
    tx_count: u64,
}

impl SpiDecoder {
    pub fn new(clk: usize, mosi: Option<usize>, miso: Option<usize>, mode: SpiMode, bits_per_word: u32) -> Self {
        assert!((1..=32).contains(&bits_per_word), "Word size must be 1-32");
        Self {
            clk,
            mosi,
            miso,
            cs: None,
            mode,
            bits_per_word,
            cs_polarity: CsPolarity::ActiveLow,
            prev_clk: None,
            prev_cs_active: true,
            word: PartialWord::default(),
            tx_count: 0,
        }
    }

    /// Gate decoding with a chip-select channel
    pub fn with_cs(mut self, cs: usize, polarity: CsPolarity) -> Self {
        self.cs = Some(cs);
        self.cs_polarity = polarity;
        self.prev_cs_active = false;
        self
    }

    pub fn from_config(config: &InstanceConfig) -> Result<Self, EngineError> {
        let clk = config.required_channel("clk")?;
        let mosi = config.channel("mosi");
        let miso = config.channel("miso");
        if mosi.is_none() && miso.is_none() {
            return Err(EngineError::MissingChannel {
                decoder: config.decoder.clone(),
                channel: "mosi/miso".to_string(),
            });
        }

        let mode = SpiMode::from_cpol_cpha(flag_option(config, "cpol")?, flag_option(config, "cpha")?);

        let wordsize = config.int_option("wordsize", 8)?;
        if !(1..=32).contains(&wordsize) {
            return Err(config.invalid_option("wordsize", format!("must be 1-32, got {}", wordsize)));
        }

        let polarity = match config.str_option("cs_polarity", "active-low")? {
            "active-low" => CsPolarity::ActiveLow,
            "active-high" => CsPolarity::ActiveHigh,
            other => {
                return Err(config.invalid_option(
                    "cs_polarity",
                    format!("expected active-low or active-high, got '{}'", other),
                ));
            }
        };

        let decoder = Self::new(clk, mosi, miso, mode, wordsize as u32);
        Ok(match config.channel("cs") {
            Some(cs) => decoder.with_cs(cs, polarity),
            None => decoder,
        })
    }

    fn cs_active(&self, chunk: &LogicChunk<'_>, sample: u64) -> bool {
        self.cs
            .is_none_or(|cs| self.cs_polarity.is_active(chunk.bit(sample, cs)))
    }

    fn reset_word(&mut self) {
        self.word = PartialWord::default();
    }

    fn emit_word(&mut self, end: u64, out: &mut AnnotationSink) {
        let start = self.word.start;
        if self.mosi.is_some() {
            out.put(start, end, CLASS_MOSI_DATA, vec![hex_word(self.word.mosi, self.bits_per_word)]);
        }
        if self.miso.is_some() {
            out.put(start, end, CLASS_MISO_DATA, vec![hex_word(self.word.miso, self.bits_per_word)]);
        }
        self.tx_count += 1;
        debug!("#{}: MOSI 0x{:X} MISO 0x{:X} at {}", self.tx_count, self.word.mosi, self.word.miso, start);
        self.reset_word();
    }
}

impl ProtocolDecoder for SpiDecoder {
    fn start(&mut self, _samplerate: u64) {
        self.prev_clk = None;
        self.prev_cs_active = self.cs.is_none();
        self.reset_word();
    }

    fn decode(&mut self, chunk: &LogicChunk<'_>, out: &mut AnnotationSink) -> Result<(), EngineError> {
        let sample_on_rising = self.mode.samples_on_rising();

        for sample in chunk.samples() {
            let cs_active = self.cs_active(chunk, sample);
            if cs_active != self.prev_cs_active {
                if !cs_active && self.word.bits > 0 {
                    debug!("Incomplete word: {}/{} bits", self.word.bits, self.bits_per_word);
                    out.put(
                        self.word.start,
                        sample,
                        CLASS_WARNING,
                        vec![format!(
                            "Incomplete word: {} of {} bits",
                            self.word.bits, self.bits_per_word
                        )],
                    );
                }
                self.reset_word();
                self.prev_cs_active = cs_active;
            }

            let clk = chunk.bit(sample, self.clk);
            let prev_clk = self.prev_clk.replace(clk);
            let Some(prev_clk) = prev_clk else {
                continue;
            };
            if prev_clk == clk || clk != sample_on_rising || !cs_active {
                continue;
            }

            if self.word.bits == 0 {
                self.word.start = sample;
            }
            if let Some(mosi) = self.mosi {
                self.word.mosi = (self.word.mosi << 1) | u32::from(chunk.bit(sample, mosi));
            }
            if let Some(miso) = self.miso {
                self.word.miso = (self.word.miso << 1) | u32::from(chunk.bit(sample, miso));
            }
            self.word.bits += 1;

            if self.word.bits == self.bits_per_word {
                self.emit_word(sample + 1, out);
            }
        }

        Ok(())
    }
}
