//! Decode engine interface
//!
//! The engine owns the protocol decoding algorithms. The decoder stack only
//! creates a session, instantiates one decoder per stack entry, chains them,
//! and pushes sample chunks in. Decoded events come back synchronously
//! through the annotation callback while `send()` is running.
//!
//! Engines are not required to be reentrant. All decode runs in a process
//! share one [`EngineLock`] so that only one session executes engine calls at
//! any time.

use super::errors::EngineError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Raw annotation event as emitted by a decoder instance
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoData {
    /// First sample covered by the event
    pub start_sample: u64,
    /// One past the last sample covered by the event
    pub end_sample: u64,
    /// Id of the decoder that produced the event
    pub decoder: Arc<str>,
    /// Annotation class id, as declared in the decoder's metadata
    pub format: u32,
    /// Annotation texts, longest first
    pub texts: Vec<String>,
}

/// Handle to a decoder instance inside an engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

impl InstanceId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Value of a decoder option
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl OptionValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Float(v) => write!(f, "{}", v),
            OptionValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

/// Everything an engine needs to instantiate one decoder
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    /// Decoder id, e.g. "spi"
    pub decoder: String,
    /// Decoder channel id -> bit index within a sample unit
    pub channels: BTreeMap<String, usize>,
    pub options: BTreeMap<String, OptionValue>,
}

impl InstanceConfig {
    /// Bit index assigned to a channel, if any
    pub fn channel(&self, id: &str) -> Option<usize> {
        self.channels.get(id).copied()
    }

    /// Bit index of a channel the decoder cannot work without
    pub fn required_channel(&self, id: &str) -> Result<usize, EngineError> {
        self.channel(id).ok_or_else(|| EngineError::MissingChannel {
            decoder: self.decoder.clone(),
            channel: id.to_string(),
        })
    }

    pub fn option(&self, id: &str) -> Option<&OptionValue> {
        self.options.get(id)
    }

    /// Integer option, or `default` when unset
    pub fn int_option(&self, id: &str, default: i64) -> Result<i64, EngineError> {
        match self.options.get(id) {
            None => Ok(default),
            Some(value) => value.as_int().ok_or_else(|| self.invalid_option(id, "expected an integer")),
        }
    }

    /// String option, or `default` when unset
    pub fn str_option<'a>(&'a self, id: &str, default: &'a str) -> Result<&'a str, EngineError> {
        match self.options.get(id) {
            None => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| self.invalid_option(id, "expected a string")),
        }
    }

    pub fn invalid_option(&self, id: &str, reason: impl Into<String>) -> EngineError {
        EngineError::InvalidOption {
            decoder: self.decoder.clone(),
            option: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Receives every annotation produced during `EngineSession::send`
pub type AnnotationCallback = Box<dyn FnMut(ProtoData) + Send>;

/// Factory for engine sessions
pub trait DecodeEngine: Send + Sync {
    /// Create a new, empty session
    fn new_session(&self) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One decode session: a chain of decoder instances fed with sample chunks
pub trait EngineSession: Send {
    /// Instantiate a decoder inside this session
    fn create_instance(&mut self, config: &InstanceConfig) -> Result<InstanceId, EngineError>;

    /// Feed the output of `lower` into `upper`
    fn stack(&mut self, lower: InstanceId, upper: InstanceId) -> Result<(), EngineError>;

    /// Sample rate in Hz, set before `start()`
    fn set_samplerate(&mut self, samplerate: u64);

    /// Register the annotation output callback
    fn set_annotation_callback(&mut self, callback: AnnotationCallback);

    /// Start all instances; no more instances may be added afterwards
    fn start(&mut self) -> Result<(), EngineError>;

    /// Decode samples `[start, end)`. `data` holds `(end - start) * unit_size`
    /// bytes. Annotations are delivered through the callback before returning.
    fn send(&mut self, start: u64, end: u64, data: &[u8], unit_size: usize) -> Result<(), EngineError>;
}

lazy_static::lazy_static! {
    static ref GLOBAL_ENGINE_LOCK: EngineLock = EngineLock::new();
}

/// Serialises access to a non-reentrant decode engine
///
/// Cloning shares the lock. [`EngineLock::global()`] is the handle every
/// decoder stack uses unless another one is injected.
#[derive(Clone, Default)]
pub struct EngineLock {
    inner: Arc<Mutex<()>>,
}

impl EngineLock {
    /// A fresh lock, independent of the global one
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide engine lock
    pub fn global() -> Self {
        GLOBAL_ENGINE_LOCK.clone()
    }

    /// Block until no other session is using the engine
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether two handles refer to the same lock
    pub fn same_lock(&self, other: &EngineLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EngineLock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EngineLock({:p})", Arc::as_ptr(&self.inner))
    }
}
