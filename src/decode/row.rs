//! Display rows

use super::decoder::{AnnotationRowDesc, DecoderInfo};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a display row: a decoder's default row, or one of its
/// declared annotation rows
///
/// Equality and hashing are structural over the decoder id and row index,
/// so a `Row` built in one run matches the same row built in another.
#[derive(Clone)]
pub struct Row {
    decoder: Arc<DecoderInfo>,
    row: Option<usize>,
}

impl Row {
    /// The default row of a decoder
    pub fn new(decoder: Arc<DecoderInfo>) -> Self {
        Self { decoder, row: None }
    }

    /// Declared annotation row `index` of a decoder
    pub fn with_row(decoder: Arc<DecoderInfo>, index: usize) -> Self {
        debug_assert!(index < decoder.annotation_rows.len());
        Self {
            decoder,
            row: Some(index),
        }
    }

    pub fn decoder(&self) -> &Arc<DecoderInfo> {
        &self.decoder
    }

    /// The declared row descriptor, `None` for a default row
    pub fn row(&self) -> Option<&AnnotationRowDesc> {
        self.row.and_then(|i| self.decoder.annotation_rows.get(i))
    }

    pub fn is_default(&self) -> bool {
        self.row.is_none()
    }

    /// Human readable title, e.g. "SPI: MOSI data"
    pub fn title(&self) -> String {
        match self.row() {
            Some(row) if !self.decoder.name.is_empty() => {
                format!("{}: {}", self.decoder.name, row.desc)
            }
            Some(row) => row.desc.clone(),
            None => self.decoder.name.clone(),
        }
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.decoder.id == other.decoder.id && self.row == other.row
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.decoder.id.hash(state);
        self.row.hash(state);
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.row() {
            Some(row) => write!(f, "Row[{}/{}]", self.decoder.id, row.id),
            None => write!(f, "Row[{}]", self.decoder.id),
        }
    }
}
