//! Broadcast notifications from a decode run to its consumers

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Mutex, PoisonError};

/// Event delivered to consumers of a decoder stack
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// More annotations can be queried
    NewAnnotations,
    /// The run failed; the message is also available from `error_message()`
    Error(String),
    /// The worker finished (completed, failed or cancelled)
    Finished,
}

/// Broadcast sender that delivers each event to every subscriber
///
/// Subscribers get their own unbounded channel, so a slow consumer never
/// blocks the decode worker. Subscribers that dropped their receiver are
/// pruned on the next send.
#[derive(Default)]
pub struct Notifier {
    destinations: Mutex<Vec<Sender<DecodeEvent>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber
    pub fn subscribe(&self) -> Receiver<DecodeEvent> {
        let (tx, rx) = unbounded();
        self.destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Send an event to all live subscribers
    pub fn send(&self, event: DecodeEvent) {
        let mut destinations = self
            .destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        destinations.retain(|dest| dest.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last send
    pub fn num_subscribers(&self) -> usize {
        self.destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
