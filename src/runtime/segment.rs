//! Captured logic data: segments, sources and signals
//!
//! A [`Segment`] is one contiguous acquisition. Samples are stored as
//! fixed-size units: each unit holds one bit per channel, LSB-first, so
//! channel `n` of a sample is bit `n % 8` of byte `n / 8` in that sample's
//! unit. This matches the layout DSLogic and sigrok hardware deliver, so
//! capture payloads can be appended without transformation.

use crate::{CaptureError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A contiguous run of captured samples
///
/// Implementations may keep growing while a capture is running; readers
/// only ever see whole units.
pub trait Segment: Send + Sync {
    /// Bytes per sample unit
    fn unit_size(&self) -> usize;

    /// Sample rate in Hz, 0 if unknown
    fn samplerate(&self) -> f64;

    /// Capture start time in seconds
    fn start_time(&self) -> f64;

    /// Number of samples currently available
    fn sample_count(&self) -> u64;

    /// Copy the units for samples `[start, end)`.
    ///
    /// The range is clamped to the samples currently available.
    fn get_samples(&self, start: u64, end: u64) -> Vec<u8>;
}

/// In-memory segment that can be appended to while it is being decoded
pub struct LogicSegment {
    unit_size: usize,
    samplerate: f64,
    start_time: f64,
    data: RwLock<Vec<u8>>,
}

impl LogicSegment {
    /// Create an empty segment
    pub fn new(unit_size: usize, samplerate: f64) -> Self {
        assert!(unit_size > 0, "unit size must be non-zero");
        Self {
            unit_size,
            samplerate,
            start_time: 0.0,
            data: RwLock::new(Vec::new()),
        }
    }

    /// Create a segment from already captured units
    pub fn from_data(unit_size: usize, samplerate: f64, data: Vec<u8>) -> Result<Self> {
        let segment = Self::new(unit_size, samplerate);
        segment.append_payload(&data)?;
        Ok(segment)
    }

    /// With a capture start time in seconds
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    /// Append whole sample units received from the device
    pub fn append_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() % self.unit_size != 0 {
            return Err(CaptureError::PartialUnit {
                len: payload.len(),
                unit_size: self.unit_size,
            });
        }
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(payload);
        Ok(())
    }
}

impl Segment for LogicSegment {
    fn unit_size(&self) -> usize {
        self.unit_size
    }

    fn samplerate(&self) -> f64 {
        self.samplerate
    }

    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn sample_count(&self) -> u64 {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        (data.len() / self.unit_size) as u64
    }

    fn get_samples(&self, start: u64, end: u64) -> Vec<u8> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let available = (data.len() / self.unit_size) as u64;
        let end = end.min(available);
        let start = start.min(end);
        data[start as usize * self.unit_size..end as usize * self.unit_size].to_vec()
    }
}

impl fmt::Debug for LogicSegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LogicSegment")
            .field("unit_size", &self.unit_size)
            .field("samplerate", &self.samplerate)
            .field("samples", &self.sample_count())
            .finish()
    }
}

/// O(1) bit lookup of one channel inside a packed buffer of sample units.
///
/// `offset` is the sample index relative to the start of `data`.
#[inline]
pub fn unit_bit(data: &[u8], unit_size: usize, offset: usize, channel: usize) -> bool {
    let byte_index = offset * unit_size + channel / 8;
    let bit_offset = channel % 8;
    data.get(byte_index)
        .is_some_and(|&byte| (byte >> bit_offset) & 1 == 1)
}

/// A source of logic data: the segments produced by one acquisition device
pub struct Logic {
    num_channels: usize,
    segments: Mutex<Vec<Arc<dyn Segment>>>,
}

impl Logic {
    /// Create a source with no segments yet
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            segments: Mutex::new(Vec::new()),
        }
    }

    /// Number of logic channels carried by each unit
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Add a segment, typically when a new frame begins
    pub fn push_segment(&self, segment: Arc<dyn Segment>) {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(segment);
    }

    /// Snapshot of all segments
    pub fn segments(&self) -> Vec<Arc<dyn Segment>> {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The first segment, if any has been captured
    pub fn first_segment(&self) -> Option<Arc<dyn Segment>> {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }

    /// Drop all segments
    pub fn clear(&self) {
        self.segments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// A single logic channel that can be assigned to a decoder channel
#[derive(Clone)]
pub struct LogicSignal {
    name: String,
    index: usize,
    data: Option<Arc<Logic>>,
}

impl LogicSignal {
    /// Create a signal for bit `index` of `data`
    pub fn new(name: impl Into<String>, index: usize, data: Arc<Logic>) -> Self {
        Self {
            name: name.into(),
            index,
            data: Some(data),
        }
    }

    /// A signal that is not (yet) backed by any captured data
    pub fn detached(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            data: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bit index of this channel within a sample unit
    pub fn index(&self) -> usize {
        self.index
    }

    /// The logic source backing this signal
    pub fn logic_data(&self) -> Option<&Arc<Logic>> {
        self.data.as_ref()
    }
}

impl fmt::Debug for LogicSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LogicSignal[{} @ bit {}]", self.name, self.index)
    }
}
