//! Decode run settings

/// Bytes of sample data submitted to the engine per call
pub const DECODE_CHUNK_LENGTH: usize = 10 * 1024 * 1024;

/// Annotations between two "new annotations" notifications
pub const DECODE_NOTIFY_PERIOD: u64 = 1024;

/// Tunables of a decoder stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfig {
    /// Byte budget of one chunk; bounds peak memory and cancellation latency
    pub chunk_bytes: usize,
    /// Notify consumers every this many annotations
    pub notify_period: u64,
}

impl DecodeConfig {
    pub fn new() -> Self {
        Self {
            chunk_bytes: DECODE_CHUNK_LENGTH,
            notify_period: DECODE_NOTIFY_PERIOD,
        }
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    pub fn with_notify_period(mut self, notify_period: u64) -> Self {
        self.notify_period = notify_period.max(1);
        self
    }

    /// Samples per chunk for a given unit size, never less than one
    pub fn chunk_samples(&self, unit_size: usize) -> u64 {
        (self.chunk_bytes / unit_size.max(1)).max(1) as u64
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self::new()
    }
}
