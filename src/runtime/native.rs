//! In-process decode engine
//!
//! [`NativeEngine`] runs Rust implementations of [`ProtocolDecoder`] over the
//! sample chunks a decoder stack sends. Decoders are looked up by id in the
//! engine's registry.
//!
//! Instances without a lower instance receive the raw sample chunks. An
//! instance stacked on top of another one receives the lower instance's
//! annotations through [`ProtocolDecoder::decode_upstream`] instead. Every
//! annotation is reported to the session callback before the instances
//! above it see it.

use super::engine::{
    AnnotationCallback, DecodeEngine, EngineSession, InstanceConfig, InstanceId, ProtoData,
};
use super::errors::EngineError;
use super::segment::unit_bit;
use crate::decode::decoder::DecoderInfo;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// A view on one chunk of sample units
pub struct LogicChunk<'a> {
    start: u64,
    data: &'a [u8],
    unit_size: usize,
}

impl<'a> LogicChunk<'a> {
    pub fn new(start: u64, data: &'a [u8], unit_size: usize) -> Self {
        Self {
            start,
            data,
            unit_size,
        }
    }

    /// Absolute index of the first sample
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Absolute index one past the last sample
    pub fn end(&self) -> u64 {
        self.start + self.len() as u64
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.unit_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Level of `channel` at absolute sample index `sample`
    pub fn bit(&self, sample: u64, channel: usize) -> bool {
        let offset = (sample - self.start) as usize;
        unit_bit(self.data, self.unit_size, offset, channel)
    }

    /// Absolute sample indices of this chunk
    pub fn samples(&self) -> std::ops::Range<u64> {
        self.start..self.end()
    }
}

/// Collects the annotations one decoder instance produces
pub struct AnnotationSink {
    decoder: Arc<str>,
    events: Vec<ProtoData>,
}

impl AnnotationSink {
    pub fn new(decoder: Arc<str>) -> Self {
        Self {
            decoder,
            events: Vec::new(),
        }
    }

    /// Emit an annotation of class `format` covering `[start, end)`
    pub fn put(&mut self, start: u64, end: u64, format: u32, texts: Vec<String>) {
        trace!("{} {}..{} class {}: {:?}", self.decoder, start, end, format, texts);
        self.events.push(ProtoData {
            start_sample: start,
            end_sample: end,
            decoder: Arc::clone(&self.decoder),
            format,
            texts,
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn into_events(self) -> Vec<ProtoData> {
        self.events
    }
}

/// A protocol decoder implementation
pub trait ProtocolDecoder: Send {
    /// Called once before the first chunk
    fn start(&mut self, _samplerate: u64) {}

    /// Decode one chunk of samples. Chunks arrive contiguous and in order.
    fn decode(&mut self, chunk: &LogicChunk<'_>, out: &mut AnnotationSink) -> Result<(), EngineError>;

    /// Decode an annotation of the instance this one is stacked on
    fn decode_upstream(&mut self, _annotation: &ProtoData, _out: &mut AnnotationSink) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Builds a decoder from its instance configuration
pub type DecoderFactory = fn(&InstanceConfig) -> Result<Box<dyn ProtocolDecoder>, EngineError>;

/// A registered decoder: its metadata and how to instantiate it
#[derive(Clone)]
pub struct DecoderEntry {
    pub info: Arc<DecoderInfo>,
    pub factory: DecoderFactory,
}

impl DecoderEntry {
    pub fn new(info: DecoderInfo, factory: DecoderFactory) -> Self {
        Self {
            info: Arc::new(info),
            factory,
        }
    }
}

/// Decode engine running [`ProtocolDecoder`]s in-process
#[derive(Clone, Default)]
pub struct NativeEngine {
    registry: Arc<BTreeMap<String, DecoderEntry>>,
}

impl NativeEngine {
    /// An engine without any decoders
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine knowing all decoders shipped with this crate
    pub fn with_builtin_decoders() -> Self {
        crate::decoders::builtin()
            .iter()
            .cloned()
            .fold(Self::new(), Self::with_decoder)
    }

    /// Add a decoder to the registry (builder pattern)
    pub fn with_decoder(mut self, entry: DecoderEntry) -> Self {
        self.register(entry);
        self
    }

    /// Add a decoder, replacing one with the same id
    pub fn register(&mut self, entry: DecoderEntry) {
        Arc::make_mut(&mut self.registry).insert(entry.info.id.clone(), entry);
    }

    /// Metadata of a registered decoder
    pub fn decoder_info(&self, id: &str) -> Option<Arc<DecoderInfo>> {
        self.registry.get(id).map(|entry| Arc::clone(&entry.info))
    }

    /// Ids of all registered decoders
    pub fn decoders(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }
}

impl DecodeEngine for NativeEngine {
    fn new_session(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        Ok(Box::new(NativeSession {
            registry: Arc::clone(&self.registry),
            instances: Vec::new(),
            samplerate: 0,
            callback: None,
            started: false,
            next_sample: None,
        }))
    }
}

struct NativeInstance {
    decoder: Arc<str>,
    inner: Box<dyn ProtocolDecoder>,
    lower: Option<usize>,
}

struct NativeSession {
    registry: Arc<BTreeMap<String, DecoderEntry>>,
    instances: Vec<NativeInstance>,
    samplerate: u64,
    callback: Option<AnnotationCallback>,
    started: bool,
    /// First sample of the next chunk, once the first chunk was sent
    next_sample: Option<u64>,
}

impl NativeSession {
    fn instance_index(&self, id: InstanceId) -> Result<usize, EngineError> {
        let index = id.as_usize();
        if index < self.instances.len() {
            Ok(index)
        } else {
            Err(EngineError::UnknownInstance(index))
        }
    }
}

/// Report `events` of instance `from` and feed them to the instances above it
fn deliver(
    instances: &mut [NativeInstance],
    callback: &mut Option<AnnotationCallback>,
    from: usize,
    events: Vec<ProtoData>,
) -> Result<(), EngineError> {
    for event in events {
        let mut derived = Vec::new();
        for upper in 0..instances.len() {
            if instances[upper].lower != Some(from) {
                continue;
            }
            let instance = &mut instances[upper];
            let mut sink = AnnotationSink::new(Arc::clone(&instance.decoder));
            instance.inner.decode_upstream(&event, &mut sink)?;
            derived.push((upper, sink.into_events()));
        }

        if let Some(callback) = callback.as_mut() {
            callback(event);
        }

        for (upper, events) in derived {
            deliver(instances, callback, upper, events)?;
        }
    }
    Ok(())
}

impl EngineSession for NativeSession {
    fn create_instance(&mut self, config: &InstanceConfig) -> Result<InstanceId, EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        let entry = self
            .registry
            .get(&config.decoder)
            .ok_or_else(|| EngineError::UnknownDecoder(config.decoder.clone()))?;

        let inner = (entry.factory)(config)?;
        debug!("Created instance {} of decoder '{}'", self.instances.len(), config.decoder);

        self.instances.push(NativeInstance {
            decoder: Arc::from(entry.info.id.as_str()),
            inner,
            lower: None,
        });
        Ok(InstanceId::new(self.instances.len() - 1))
    }

    fn stack(&mut self, lower: InstanceId, upper: InstanceId) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        let lower = self.instance_index(lower)?;
        let upper = self.instance_index(upper)?;
        if lower == upper {
            return Err(EngineError::Decoder(format!("cannot stack instance {} on itself", lower)));
        }
        if let Some(existing) = self.instances[upper].lower {
            return Err(EngineError::Decoder(format!(
                "instance {} is already stacked on instance {}",
                upper, existing
            )));
        }
        self.instances[upper].lower = Some(lower);
        Ok(())
    }

    fn set_samplerate(&mut self, samplerate: u64) {
        self.samplerate = samplerate;
    }

    fn set_annotation_callback(&mut self, callback: AnnotationCallback) {
        self.callback = Some(callback);
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        for instance in &mut self.instances {
            instance.inner.start(self.samplerate);
        }
        self.started = true;
        Ok(())
    }

    fn send(&mut self, start: u64, end: u64, data: &[u8], unit_size: usize) -> Result<(), EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        if let Some(expected) = self.next_sample
            && expected != start
        {
            return Err(EngineError::OutOfOrder { expected, got: start });
        }
        let expected = end.saturating_sub(start) as usize * unit_size;
        if end < start || unit_size == 0 || data.len() != expected {
            return Err(EngineError::ChunkSize {
                expected,
                got: data.len(),
            });
        }

        let chunk = LogicChunk::new(start, data, unit_size);
        for index in 0..self.instances.len() {
            if self.instances[index].lower.is_some() {
                continue;
            }
            let instance = &mut self.instances[index];
            let mut sink = AnnotationSink::new(Arc::clone(&instance.decoder));
            instance.inner.decode(&chunk, &mut sink)?;
            deliver(&mut self.instances, &mut self.callback, index, sink.into_events())?;
        }

        self.next_sample = Some(end);
        Ok(())
    }
}
