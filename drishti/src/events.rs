//! Typed event channels.
//!
//! Every producing component owns a [`Publisher`]; consumers call
//! `subscribe()` on the components they care about and receive cloned
//! events over crossbeam channels. [`EventSubscription`] merges several
//! receivers into one stream, preserving per-source ordering.

use crossbeam_channel::{Receiver, Select, Sender, unbounded};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::adaptive::AdaptationEvent;
use crate::arbitration::{CaptureConfigDelta, ModeChangeReason};
use crate::core::clock::TimestampUs;
use crate::core::types::{ScanningMode, StateTransition};
use crate::error::ErrorKind;
use crate::quality::QualityFailure;
use crate::resources::{Resource, ResourceAction, ResourceAlert};
use crate::session::Escalation;

/// Everything the core reports to UI and diagnostics collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    ModeChanged {
        from: Option<ScanningMode>,
        to: ScanningMode,
        reason: ModeChangeReason,
        delta: CaptureConfigDelta,
        timestamp_us: TimestampUs,
    },
    SettingsChanged(AdaptationEvent),
    QualityWarning {
        failures: Vec<QualityFailure>,
        timestamp_us: TimestampUs,
    },
    ResourceWarning(ResourceAlert),
    ResourceCritical(ResourceAlert),
    ResourceCleared {
        resource: Resource,
        timestamp_us: TimestampUs,
    },
    ResourceActionRequested {
        action: ResourceAction,
        timestamp_us: TimestampUs,
    },
    StateChanged(StateTransition),
    RecoverableError {
        kind: ErrorKind,
        attempt: u32,
        timestamp_us: TimestampUs,
    },
    UnrecoverableError(Escalation),
}

/// Fan-out publisher owned by one component.
#[derive(Debug)]
pub struct Publisher<E> {
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E: Clone> Publisher<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send to every live subscriber; dropped receivers are pruned.
    pub fn publish(&self, event: E) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<E: Clone> Default for Publisher<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Merged view over several component channels.
#[derive(Debug, Default)]
pub struct EventSubscription<E> {
    receivers: Vec<Receiver<E>>,
}

impl<E> EventSubscription<E> {
    pub fn new() -> Self {
        Self {
            receivers: Vec::new(),
        }
    }

    pub fn add(&mut self, receiver: Receiver<E>) {
        self.receivers.push(receiver);
    }

    pub fn with(mut self, receiver: Receiver<E>) -> Self {
        self.add(receiver);
        self
    }

    /// Everything currently queued, source by source.
    pub fn drain(&self) -> Vec<E> {
        self.receivers.iter().flat_map(|rx| rx.try_iter()).collect()
    }

    /// Block until any source has an event or the timeout elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<E> {
        let deadline = Instant::now() + timeout;
        let mut select = Select::new();
        for rx in &self.receivers {
            select.recv(rx);
        }
        let mut live = self.receivers.len();
        while live > 0 {
            let op = select.select_deadline(deadline).ok()?;
            let index = op.index();
            match op.recv(&self.receivers[index]) {
                Ok(event) => return Some(event),
                Err(_) => {
                    // Disconnected source
                    select.remove(index);
                    live -= 1;
                }
            }
        }
        None
    }
}
