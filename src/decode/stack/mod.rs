//! The decoder stack: runs an ordered chain of protocol decoders over a
//! capture and collects their annotations into display rows.
//!
//! ## Threading
//!
//! Each stack owns at most one background worker. The owning thread only
//! triggers lifecycle transitions and reads snapshots; the worker does all
//! engine calls. State is split in two groups:
//!
//! - **output**: rows, classification table, progress, error, annotation
//!   counter. Held briefly per access and for each annotation callback.
//! - **input**: sample count, frame completion, segment. Paired with a
//!   condition variable the worker waits on while a live capture catches up.
//!
//! Lock order is input before output. The worker never blocks while holding
//! the output lock.
//!
//! A third lock, the [`EngineLock`], is held by the worker for its whole
//! lifetime so that only one decode run per engine executes at a time.

mod worker;

#[cfg(test)]
mod tests;

use super::annotation::Annotation;
use super::classifier::{ClassificationTable, Routing};
use super::config::DecodeConfig;
use super::decoder::Decoder;
use super::row::Row;
use super::row_data::RowData;
use crate::runtime::capture::{CaptureSession, CaptureState};
use crate::runtime::engine::{DecodeEngine, EngineLock, ProtoData};
use crate::runtime::errors::StackError;
use crate::runtime::notify::{DecodeEvent, Notifier};
use crate::runtime::segment::Segment;
use crossbeam_channel::Receiver;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use worker::Worker;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State produced by the worker and read by consumers
struct OutputState {
    rows: HashMap<Row, RowData>,
    classes: ClassificationTable,
    samples_decoded: u64,
    annotation_count: u64,
    notify_period: u64,
    error: Option<StackError>,
    /// Classes already reported as routed to a default row, per decoder
    unmapped: HashMap<String, HashSet<u32>>,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            classes: ClassificationTable::new(),
            samples_decoded: 0,
            annotation_count: 0,
            notify_period: DecodeConfig::default().notify_period,
            error: None,
            unmapped: HashMap::new(),
        }
    }
}

/// State pushed in by the capture side and consumed by the wait protocol
#[derive(Default)]
struct InputState {
    sample_count: u64,
    frame_complete: bool,
    segment: Option<Arc<dyn Segment>>,
    start_time: f64,
    samplerate: f64,
}

/// Everything the wait protocol decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitState {
    pub(crate) interrupted: bool,
    pub(crate) frame_complete: bool,
    pub(crate) samples_decoded: u64,
    pub(crate) sample_count: u64,
    pub(crate) capture: CaptureState,
}

impl WaitState {
    /// All available samples are decoded but the capture may still deliver more
    pub(crate) fn should_wait(&self) -> bool {
        !self.interrupted
            && !self.frame_complete
            && self.samples_decoded >= self.sample_count
            && self.capture != CaptureState::Stopped
    }

    /// The sample count to decode up to, or `None` when the run is over
    pub(crate) fn next_sample_count(&self) -> Option<u64> {
        let caught_up = self.samples_decoded >= self.sample_count;
        let more_work = !self.interrupted
            && (!caught_up || !self.frame_complete)
            && !(caught_up && self.capture == CaptureState::Stopped);
        more_work.then_some(self.sample_count)
    }
}

/// State shared between a stack and its worker
struct Shared {
    output: Mutex<OutputState>,
    input: Mutex<InputState>,
    input_cond: Condvar,
    interrupt: AtomicBool,
    /// Id of the last run whose worker has exited
    finished_run: Mutex<u64>,
    finished_cond: Condvar,
    notifier: Notifier,
    capture: Arc<dyn CaptureSession>,
}

impl Shared {
    fn new(capture: Arc<dyn CaptureSession>) -> Self {
        Self {
            output: Mutex::new(OutputState::default()),
            input: Mutex::new(InputState::default()),
            input_cond: Condvar::new(),
            interrupt: AtomicBool::new(false),
            finished_run: Mutex::new(0),
            finished_cond: Condvar::new(),
            notifier: Notifier::new(),
            capture,
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// Ask the worker to stop at its next checkpoint
    fn interrupt(&self) {
        let _input = lock(&self.input);
        self.interrupt.store(true, Ordering::Release);
        self.input_cond.notify_one();
    }

    fn samples_decoded(&self) -> u64 {
        lock(&self.output).samples_decoded
    }

    /// Mark run `run` as over and wake everyone waiting for it
    fn finish_run(&self, run: u64) {
        let mut finished = lock(&self.finished_run);
        *finished = (*finished).max(run);
        self.finished_cond.notify_all();
    }

    /// Block until the worker of run `run` has exited
    fn wait_finished(&self, run: u64) {
        let mut finished = lock(&self.finished_run);
        while *finished < run {
            finished = self
                .finished_cond
                .wait(finished)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Latch a run error; later errors of the same run are ignored
    fn set_error(&self, err: StackError) {
        let message = err.to_string();
        {
            let mut output = lock(&self.output);
            if output.error.is_some() {
                debug!("Ignoring error after the first: {}", message);
                return;
            }
            error!("Decode failed: {}", message);
            output.error = Some(err);
        }
        self.notifier.send(DecodeEvent::Error(message));
    }

    fn wait_state(&self, input: &InputState, samples_decoded: u64) -> WaitState {
        WaitState {
            interrupted: self.interrupted(),
            frame_complete: input.frame_complete,
            samples_decoded,
            sample_count: input.sample_count,
            capture: self.capture.capture_state(),
        }
    }

    /// Block until more samples are available, the frame ends, the capture
    /// stops or the run is cancelled.
    ///
    /// `samples_decoded` is how far the caller has fed the engine. Returns
    /// the sample count to decode up to, or `None` when there is no more work.
    fn wait_for_data(&self, samples_decoded: u64) -> Option<u64> {
        let mut input = lock(&self.input);
        while self.wait_state(&input, samples_decoded).should_wait() {
            debug!("Decoded {} samples, waiting for more data", input.sample_count);
            input = self
                .input_cond
                .wait(input)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.wait_state(&input, samples_decoded).next_sample_count()
    }

    /// Engine output callback: classify one event and store it
    fn on_annotation(&self, pdata: ProtoData) {
        let annotation = Annotation::from(pdata);

        let notify = {
            let mut guard = lock(&self.output);
            let output = &mut *guard;

            let Some((row, routing)) = output
                .classes
                .classify(annotation.decoder(), annotation.format())
            else {
                error!(
                    "Unexpected annotation: decoder = {}, format = {}",
                    annotation.decoder(),
                    annotation.format()
                );
                panic!(
                    "annotation from decoder '{}' does not belong to any row",
                    annotation.decoder()
                );
            };

            if routing == Routing::Fallback && !row.decoder().annotation_rows.is_empty() {
                let reported = output
                    .unmapped
                    .get(annotation.decoder())
                    .is_some_and(|classes| classes.contains(&annotation.format()));
                if !reported {
                    warn!(
                        "Decoder '{}' class {} is not in any annotation row, showing it in the default row",
                        annotation.decoder(),
                        annotation.format()
                    );
                    output
                        .unmapped
                        .entry(annotation.decoder().to_string())
                        .or_default()
                        .insert(annotation.format());
                }
            }

            let Some(data) = output.rows.get_mut(row) else {
                error!("No row data for {:?}", row);
                panic!("row {:?} missing from the row data set", row);
            };
            data.push_annotation(annotation);

            let count = output.annotation_count;
            output.annotation_count += 1;
            count % output.notify_period == 0
        };

        if notify {
            self.notifier.send(DecodeEvent::NewAnnotations);
        }
    }
}

/// The worker thread of a run, tagged with the run's id
struct RunningWorker {
    run: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct WorkerSlot {
    last_run: u64,
    current: Option<RunningWorker>,
}

/// An ordered chain of decoders and the results of decoding a capture with it
///
/// All run-time operations take `&self`, so a stack can be shared between the
/// capture thread delivering `on_*` notifications and the consumer reading
/// results. Editing the chain (`push`, `remove`, `decoder_mut`) needs `&mut`
/// and is only allowed while no worker is running.
pub struct DecoderStack {
    stack: Vec<Decoder>,
    engine: Arc<dyn DecodeEngine>,
    engine_lock: EngineLock,
    config: DecodeConfig,
    shared: Arc<Shared>,
    worker: Mutex<WorkerSlot>,
}

impl DecoderStack {
    /// Create an empty stack decoding data of `capture` with `engine`
    pub fn new(capture: Arc<dyn CaptureSession>, engine: Arc<dyn DecodeEngine>) -> Self {
        Self {
            stack: Vec::new(),
            engine,
            engine_lock: EngineLock::global(),
            config: DecodeConfig::default(),
            shared: Arc::new(Shared::new(capture)),
            worker: Mutex::new(WorkerSlot::default()),
        }
    }

    /// Add a decoder (builder pattern)
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.push(decoder);
        self
    }

    pub fn with_config(mut self, config: DecodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a different engine lock than the process-wide one
    pub fn with_engine_lock(mut self, engine_lock: EngineLock) -> Self {
        self.engine_lock = engine_lock;
        self
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// The decoders, in pipeline order
    pub fn stack(&self) -> &[Decoder] {
        &self.stack
    }

    pub fn decoder_mut(&mut self, index: usize) -> Option<&mut Decoder> {
        assert!(!self.is_running(), "cannot edit the decoder stack while decoding");
        self.stack.get_mut(index)
    }

    /// Append a decoder to the end of the pipeline
    pub fn push(&mut self, decoder: Decoder) {
        assert!(!self.is_running(), "cannot edit the decoder stack while decoding");
        self.stack.push(decoder);
    }

    /// Remove the decoder at `index`
    ///
    /// # Panics
    ///
    /// If `index` is out of range or a worker is running.
    pub fn remove(&mut self, index: usize) -> Decoder {
        assert!(
            index < self.stack.len(),
            "decoder index {} out of range for stack of {}",
            index,
            self.stack.len()
        );
        assert!(!self.is_running(), "cannot edit the decoder stack while decoding");
        self.stack.remove(index)
    }

    /// Sample rate of the current run, 0 before any run started
    pub fn samplerate(&self) -> f64 {
        lock(&self.shared.input).samplerate
    }

    /// Start time of the current run's segment in seconds
    pub fn start_time(&self) -> f64 {
        lock(&self.shared.input).start_time
    }

    /// Samples handed to the engine so far in this run
    pub fn samples_decoded(&self) -> u64 {
        self.shared.samples_decoded()
    }

    /// The latched error of the current run, empty when there is none
    pub fn error_message(&self) -> String {
        lock(&self.shared.output)
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// Subscribe to run notifications
    pub fn subscribe(&self) -> Receiver<DecodeEvent> {
        self.shared.notifier.subscribe()
    }

    /// Rows of all shown decoders, in pipeline then declaration order
    ///
    /// A decoder's default row is included if it declares no rows, or if it
    /// received annotations of a class none of its rows lists.
    pub fn get_visible_rows(&self) -> Vec<Row> {
        let output = lock(&self.shared.output);
        let mut rows = Vec::new();

        for dec in self.stack.iter().filter(|dec| dec.shown()) {
            let info = dec.info();
            let default_row = Row::new(Arc::clone(info));

            let declared = (0..info.annotation_rows.len()).map(|i| Row::with_row(Arc::clone(info), i));
            let show_default = info.annotation_rows.is_empty()
                || output
                    .rows
                    .get(&default_row)
                    .is_some_and(|data| !data.is_empty());

            for row in declared.chain(show_default.then_some(default_row)) {
                if !rows.contains(&row) {
                    rows.push(row);
                }
            }
        }

        rows
    }

    /// Copies of the annotations of `row` overlapping `[start_sample, end_sample)`
    pub fn get_annotation_subset(&self, row: &Row, start_sample: u64, end_sample: u64) -> Vec<Annotation> {
        let output = lock(&self.shared.output);
        let mut dest = Vec::new();
        if let Some(data) = output.rows.get(row) {
            data.get_annotation_subset(&mut dest, start_sample, end_sample);
        }
        dest
    }

    /// Highest end sample over all rows: how far annotations reach
    pub fn max_sample_count(&self) -> u64 {
        lock(&self.shared.output)
            .rows
            .values()
            .map(RowData::max_sample)
            .max()
            .unwrap_or(0)
    }

    /// Whether a worker is currently decoding
    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .current
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Reset all run state
    pub fn clear(&self) {
        {
            let mut input = lock(&self.shared.input);
            input.sample_count = 0;
            input.frame_complete = false;
        }
        let mut output = lock(&self.shared.output);
        output.rows.clear();
        output.classes.clear();
        output.unmapped.clear();
        output.samples_decoded = 0;
        output.annotation_count = 0;
        output.error = None;
    }

    /// Start a fresh decode run, cancelling the current one first
    pub fn begin_decode(&self) {
        // The slot stays locked until the new worker is in place, so a
        // concurrent restart or `wait` always sees the live worker.
        let mut slot = lock(&self.worker);
        if let Some(running) = slot.current.take() {
            debug!("Cancelling running decode");
            self.shared.interrupt();
            join_worker(running.handle);
        }

        self.clear();
        lock(&self.shared.input).segment = None;

        if let Some(dec) = self.stack.iter().find(|dec| !dec.have_required_channels()) {
            debug!("Decoder '{}' is missing required channels", dec.info().id);
            self.shared.set_error(StackError::MissingChannels);
            return;
        }

        let classes = ClassificationTable::build(&self.stack);
        {
            let mut output = lock(&self.shared.output);
            output.rows = classes
                .rows()
                .iter()
                .map(|row| (row.clone(), RowData::new()))
                .collect();
            output.classes = classes;
            output.notify_period = self.config.notify_period.max(1);
        }

        // All channels of a capture share the same segments, so the first
        // data-bearing channel decides the timing of the whole run.
        let Some(segment) = self.find_segment() else {
            debug!("No captured data to decode yet");
            return;
        };

        let mut samplerate = segment.samplerate();
        if samplerate == 0.0 {
            samplerate = 1.0;
        }
        {
            let mut input = lock(&self.shared.input);
            input.segment = Some(Arc::clone(&segment));
            input.start_time = segment.start_time();
            input.samplerate = samplerate;
        }

        self.shared.interrupt.store(false, Ordering::Release);

        info!(
            "Starting decode of {} decoder(s) at {} Hz",
            self.stack.len(),
            samplerate
        );

        slot.last_run += 1;
        let run = slot.last_run;

        let job = Worker {
            run,
            shared: Arc::clone(&self.shared),
            engine: Arc::clone(&self.engine),
            engine_lock: self.engine_lock.clone(),
            decoders: self.stack.clone(),
            segment,
            samplerate,
            config: self.config,
        };

        match thread::Builder::new()
            .name("decode-stack".to_string())
            .spawn(move || job.run())
        {
            Ok(handle) => slot.current = Some(RunningWorker { run, handle }),
            Err(e) => self.shared.set_error(StackError::Spawn(e)),
        }
    }

    /// Block until the current worker has finished
    ///
    /// With a live capture this only returns once the frame ends or the
    /// capture stops.
    ///
    /// Returns as well when a concurrent restart cancels that worker.
    pub fn wait(&self) {
        let Some(run) = lock(&self.worker).current.as_ref().map(|running| running.run) else {
            return;
        };

        self.shared.wait_finished(run);

        let mut slot = lock(&self.worker);
        if slot.current.as_ref().is_some_and(|running| running.run == run)
            && let Some(running) = slot.current.take()
        {
            join_worker(running.handle);
        }
    }

    /// A new frame began: decode it from the start
    pub fn on_new_frame(&self) {
        self.begin_decode();
    }

    /// More samples arrived in the current segment
    pub fn on_data_received(&self) {
        {
            let mut input = lock(&self.shared.input);
            if let Some(count) = input.segment.as_ref().map(|s| s.sample_count()) {
                input.sample_count = count;
            }
        }
        self.shared.input_cond.notify_one();
    }

    /// The current frame is complete
    pub fn on_frame_ended(&self) {
        {
            let mut input = lock(&self.shared.input);
            if input.segment.is_some() {
                input.frame_complete = true;
            }
        }
        self.shared.input_cond.notify_one();
    }

    fn find_segment(&self) -> Option<Arc<dyn Segment>> {
        self.stack
            .iter()
            .filter_map(Decoder::first_assigned_signal)
            .filter_map(|signal| signal.logic_data())
            .find_map(|logic| logic.first_segment())
    }
}

impl Drop for DecoderStack {
    fn drop(&mut self) {
        let running = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .take();
        if let Some(running) = running {
            self.shared.interrupt();
            join_worker(running.handle);
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if let Err(e) = handle.join() {
        error!("Decode thread panicked: {:?}", e);
    }
}
