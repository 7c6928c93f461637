//! Background decode run

use super::{Shared, lock};
use crate::decode::config::DecodeConfig;
use crate::decode::decoder::Decoder;
use crate::runtime::engine::{DecodeEngine, EngineLock, EngineSession, InstanceId};
use crate::runtime::errors::StackError;
use crate::runtime::notify::DecodeEvent;
use crate::runtime::segment::Segment;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Everything one decode run needs, moved onto the worker thread
pub(super) struct Worker {
    pub(super) run: u64,
    pub(super) shared: Arc<Shared>,
    pub(super) engine: Arc<dyn DecodeEngine>,
    pub(super) engine_lock: EngineLock,
    pub(super) decoders: Vec<Decoder>,
    pub(super) segment: Arc<dyn Segment>,
    pub(super) samplerate: f64,
    pub(super) config: DecodeConfig,
}

/// Marks a run as over when the worker exits, unwinding included
struct RunGuard<'a> {
    shared: &'a Shared,
    run: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.shared.finish_run(self.run);
    }
}

impl Worker {
    pub(super) fn run(self) {
        let _done = RunGuard {
            shared: &self.shared,
            run: self.run,
        };

        {
            let _engine = self.engine_lock.acquire();
            debug!("Acquired decode engine");
            if let Err(e) = self.decode_proc() {
                self.shared.set_error(e);
            }
        }

        let output = lock(&self.shared.output);
        info!(
            "Decode finished: {} samples, {} annotations",
            output.samples_decoded, output.annotation_count
        );
        drop(output);

        self.shared.notifier.send(DecodeEvent::Finished);
    }

    fn decode_proc(&self) -> Result<(), StackError> {
        let mut session = self.engine.new_session().map_err(StackError::Session)?;

        let mut prev: Option<InstanceId> = None;
        for dec in &self.decoders {
            let instance = dec.create_instance(session.as_mut()).map_err(StackError::Instance)?;
            if let Some(lower) = prev {
                session.stack(lower, instance).map_err(StackError::Instance)?;
            }
            prev = Some(instance);
        }

        let mut sample_count = {
            let mut input = lock(&self.shared.input);
            input.sample_count = self.segment.sample_count();
            input.sample_count
        };

        session.set_samplerate(self.samplerate as u64);

        let shared = Arc::clone(&self.shared);
        session.set_annotation_callback(Box::new(move |pdata| shared.on_annotation(pdata)));

        session.start().map_err(StackError::Session)?;

        let result = self.feed(session.as_mut(), &mut sample_count);

        // Flush whatever is below the notify period
        self.shared.notifier.send(DecodeEvent::NewAnnotations);
        drop(session);

        result
    }

    fn feed(&self, session: &mut dyn EngineSession, sample_count: &mut u64) -> Result<(), StackError> {
        let mut last_fed = 0;
        loop {
            self.decode_data(session, &mut last_fed, *sample_count)?;

            if self.shared.interrupted() {
                debug!("Decode interrupted");
                return Ok(());
            }

            match self.shared.wait_for_data(last_fed) {
                Some(count) => *sample_count = count,
                None => return Ok(()),
            }
        }
    }

    /// Send `[last_fed, sample_count)` to the engine in chunks, advancing
    /// `last_fed` past every accepted chunk
    fn decode_data(
        &self,
        session: &mut dyn EngineSession,
        last_fed: &mut u64,
        sample_count: u64,
    ) -> Result<(), StackError> {
        let unit_size = self.segment.unit_size();
        let chunk_samples = self.config.chunk_samples(unit_size);

        while *last_fed < sample_count && !self.shared.interrupted() {
            let start = *last_fed;
            let end = (start + chunk_samples).min(sample_count);
            let data = self.segment.get_samples(start, end);
            trace!("Sending samples {}..{} ({} bytes)", start, end, data.len());

            session
                .send(start, end, &data, unit_size)
                .map_err(StackError::Submission)?;

            lock(&self.shared.output).samples_decoded = end;
            *last_fed = end;
        }

        Ok(())
    }
}
