//! Decoded annotations

use crate::runtime::engine::ProtoData;
use std::fmt;
use std::sync::Arc;

/// An immutable decoded event covering samples `[start_sample, end_sample)`
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    start_sample: u64,
    end_sample: u64,
    format: u32,
    decoder: Arc<str>,
    /// Shared so copies handed to consumers are cheap
    texts: Arc<[String]>,
}

impl Annotation {
    pub fn new(
        start_sample: u64,
        end_sample: u64,
        decoder: Arc<str>,
        format: u32,
        texts: Vec<String>,
    ) -> Self {
        Self {
            start_sample,
            end_sample,
            format,
            decoder,
            texts: texts.into(),
        }
    }

    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    pub fn end_sample(&self) -> u64 {
        self.end_sample
    }

    /// Annotation class id
    pub fn format(&self) -> u32 {
        self.format
    }

    /// Id of the decoder that produced this annotation
    pub fn decoder(&self) -> &str {
        &self.decoder
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Whether this annotation overlaps samples `[start, end)`
    #[inline]
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start_sample < end && self.end_sample > start
    }
}

impl From<ProtoData> for Annotation {
    fn from(pdata: ProtoData) -> Self {
        Self::new(
            pdata.start_sample,
            pdata.end_sample,
            pdata.decoder,
            pdata.format,
            pdata.texts,
        )
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{} {}/{}: {}",
            self.start_sample,
            self.end_sample,
            self.decoder,
            self.format,
            self.texts.first().map(String::as_str).unwrap_or("")
        )
    }
}
