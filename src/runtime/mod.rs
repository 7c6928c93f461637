//! Runtime support for decode runs: captured data, engines and notifications

pub mod capture;
pub mod engine;
pub mod errors;
pub mod native;
pub mod notify;
pub mod segment;

#[cfg(test)]
pub(crate) mod mock;

pub use capture::{CaptureSession, CaptureState, CaptureStateCell};
pub use engine::{
    AnnotationCallback, DecodeEngine, EngineLock, EngineSession, InstanceConfig, InstanceId, OptionValue,
    ProtoData,
};
pub use errors::{EngineError, StackError};
pub use native::{AnnotationSink, DecoderEntry, LogicChunk, NativeEngine, ProtocolDecoder};
pub use notify::{DecodeEvent, Notifier};
pub use segment::{Logic, LogicSegment, LogicSignal, Segment};
