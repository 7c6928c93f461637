//! Scripted decode engine for tests

use super::engine::{
    AnnotationCallback, DecodeEngine, EngineSession, InstanceConfig, InstanceId, ProtoData,
};
use super::errors::EngineError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Build a raw annotation event
pub(crate) fn proto(decoder: &str, start: u64, end: u64, format: u32) -> ProtoData {
    ProtoData {
        start_sample: start,
        end_sample: end,
        decoder: Arc::from(decoder),
        format,
        texts: vec![format!("{}@{}", decoder, start)],
    }
}

#[derive(Default)]
struct MockState {
    events: Vec<ProtoData>,
    reject_decoder: Option<String>,
    fail_send_at: Option<u64>,
    send_delay: Option<Duration>,
    chunks: Vec<(u64, u64)>,
    stacked: Vec<(InstanceId, InstanceId)>,
    samplerate: Option<u64>,
}

/// Engine that replays a fixed list of events
///
/// An event is emitted when the chunk containing its start sample is sent.
/// The engine also records what the decoder stack asked of it.
#[derive(Clone, Default)]
pub(crate) struct MockEngine {
    state: Arc<Mutex<MockState>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_events(self, events: Vec<ProtoData>) -> Self {
        self.state.lock().unwrap().events = events;
        self
    }

    /// Fail instance creation for this decoder id
    pub(crate) fn rejecting(self, decoder: &str) -> Self {
        self.state.lock().unwrap().reject_decoder = Some(decoder.to_string());
        self
    }

    /// Fail the first chunk starting at or after `sample`
    pub(crate) fn failing_send_at(self, sample: u64) -> Self {
        self.state.lock().unwrap().fail_send_at = Some(sample);
        self
    }

    pub(crate) fn with_send_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().send_delay = Some(delay);
        self
    }

    pub(crate) fn chunks(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().chunks.clone()
    }

    pub(crate) fn stacked(&self) -> Vec<(InstanceId, InstanceId)> {
        self.state.lock().unwrap().stacked.clone()
    }

    pub(crate) fn samplerate(&self) -> Option<u64> {
        self.state.lock().unwrap().samplerate
    }

    /// Highest number of sessions that were alive at the same time
    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl DecodeEngine for MockEngine {
    fn new_session(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            engine: self.clone(),
            instances: 0,
            callback: None,
            started: false,
        }))
    }
}

struct MockSession {
    engine: MockEngine,
    instances: usize,
    callback: Option<AnnotationCallback>,
    started: bool,
}

impl EngineSession for MockSession {
    fn create_instance(&mut self, config: &InstanceConfig) -> Result<InstanceId, EngineError> {
        let state = self.engine.state.lock().unwrap();
        if state.reject_decoder.as_deref() == Some(config.decoder.as_str()) {
            return Err(EngineError::UnknownDecoder(config.decoder.clone()));
        }
        self.instances += 1;
        Ok(InstanceId::new(self.instances - 1))
    }

    fn stack(&mut self, lower: InstanceId, upper: InstanceId) -> Result<(), EngineError> {
        self.engine.state.lock().unwrap().stacked.push((lower, upper));
        Ok(())
    }

    fn set_samplerate(&mut self, samplerate: u64) {
        self.engine.state.lock().unwrap().samplerate = Some(samplerate);
    }

    fn set_annotation_callback(&mut self, callback: AnnotationCallback) {
        self.callback = Some(callback);
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.started = true;
        Ok(())
    }

    fn send(&mut self, start: u64, end: u64, data: &[u8], unit_size: usize) -> Result<(), EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        let expected = (end - start) as usize * unit_size;
        if data.len() != expected {
            return Err(EngineError::ChunkSize {
                expected,
                got: data.len(),
            });
        }

        let (events, delay) = {
            let mut state = self.engine.state.lock().unwrap();
            if state.fail_send_at.is_some_and(|at| start >= at) {
                return Err(EngineError::Decoder("scripted failure".to_string()));
            }
            state.chunks.push((start, end));
            let events: Vec<_> = state
                .events
                .iter()
                .filter(|e| e.start_sample >= start && e.start_sample < end)
                .cloned()
                .collect();
            (events, state.send_delay)
        };

        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if let Some(callback) = self.callback.as_mut() {
            for event in events {
                callback(event);
            }
        }
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.engine.active.fetch_sub(1, Ordering::SeqCst);
    }
}
