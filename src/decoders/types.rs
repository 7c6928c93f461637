//! Common decoder types and enums

use crate::runtime::engine::InstanceConfig;
use crate::runtime::errors::EngineError;

/// SPI clock polarity and phase modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0: Clock idle low, sample on rising edge
    Mode0,
    /// CPOL=0, CPHA=1: Clock idle low, sample on falling edge
    Mode1,
    /// CPOL=1, CPHA=0: Clock idle high, sample on falling edge
    Mode2,
    /// CPOL=1, CPHA=1: Clock idle high, sample on rising edge
    Mode3,
}

impl SpiMode {
    pub fn from_cpol_cpha(cpol: bool, cpha: bool) -> Self {
        match (cpol, cpha) {
            (false, false) => SpiMode::Mode0,
            (false, true) => SpiMode::Mode1,
            (true, false) => SpiMode::Mode2,
            (true, true) => SpiMode::Mode3,
        }
    }

    /// Whether data is sampled on the rising clock edge
    pub fn samples_on_rising(&self) -> bool {
        matches!(self, SpiMode::Mode0 | SpiMode::Mode3)
    }
}

/// Chip select polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsPolarity {
    /// CS is active-low (standard SPI): LOW = active, HIGH = inactive
    ActiveLow,
    /// CS is active-high: HIGH = active, LOW = inactive
    ActiveHigh,
}

impl CsPolarity {
    pub fn is_active(&self, level: bool) -> bool {
        match self {
            CsPolarity::ActiveLow => !level,
            CsPolarity::ActiveHigh => level,
        }
    }
}

/// Clock edge that latches a parallel bus word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrobeMode {
    RisingEdge,
    FallingEdge,
    AnyEdge,
}

impl StrobeMode {
    /// Whether a transition from `prev` to `level` triggers a sample
    pub fn triggered(&self, prev: bool, level: bool) -> bool {
        match self {
            StrobeMode::RisingEdge => !prev && level,
            StrobeMode::FallingEdge => prev && !level,
            StrobeMode::AnyEdge => prev != level,
        }
    }
}

/// A 0/1 option such as `cpol`
pub(crate) fn flag_option(config: &InstanceConfig, id: &str) -> Result<bool, EngineError> {
    match config.int_option(id, 0)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(config.invalid_option(id, format!("expected 0 or 1, got {}", other))),
    }
}

/// Hex text for a word of `bits` bits, zero padded to full nibbles
pub(crate) fn hex_word(value: u32, bits: u32) -> String {
    let digits = bits.div_ceil(4).max(1) as usize;
    format!("{:0digits$X}", value, digits = digits)
}
