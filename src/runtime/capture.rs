//! Capture session interface consumed by the decoder stack

use std::sync::atomic::{AtomicU8, Ordering};

/// Acquisition state of the session producing the samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureState {
    NotStarted = 0,
    Running = 1,
    Stopped = 2,
}

impl CaptureState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CaptureState::Running,
            2 => CaptureState::Stopped,
            _ => CaptureState::NotStarted,
        }
    }
}

/// The part of a capture session the decoder stack needs to see
pub trait CaptureSession: Send + Sync {
    fn capture_state(&self) -> CaptureState;
}

/// Lock-free capture state holder
///
/// Suitable for offline captures (construct as `Stopped`) and for acquisition
/// drivers that only need to publish their state.
#[derive(Debug)]
pub struct CaptureStateCell {
    state: AtomicU8,
}

impl CaptureStateCell {
    pub fn new(state: CaptureState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
        }
    }

    pub fn set(&self, state: CaptureState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Default for CaptureStateCell {
    fn default() -> Self {
        Self::new(CaptureState::NotStarted)
    }
}

impl CaptureSession for CaptureStateCell {
    fn capture_state(&self) -> CaptureState {
        self.get()
    }
}
