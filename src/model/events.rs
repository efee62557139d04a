//! Bound-change event notification.
//!
//! The variable store invokes a [`BoundObserver`] synchronously from its
//! mutators. Constraints implement the trait to keep their activity caches
//! incremental; there is no hidden dispatch table.

use super::vars::VarId;

/// Which bound of a variable changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    /// The lower bound.
    Lower,

    /// The upper bound.
    Upper,
}

/// A single bound change.
#[derive(Debug, Clone, Copy)]
pub struct BoundEvent {
    /// Variable whose bound changed.
    pub var: VarId,

    /// Which bound changed.
    pub kind: BoundKind,

    /// Bound value before the change.
    pub old: f64,

    /// Bound value after the change.
    pub new: f64,
}

/// Observer notified synchronously on every applied bound change.
pub trait BoundObserver {
    /// Called after `var`'s bound of the given kind moved from `old` to
    /// `new`.
    fn on_bound_changed(&mut self, var: VarId, kind: BoundKind, old: f64, new: f64);
}

/// No-op observer for callers that do not track bounds.
impl BoundObserver for () {
    fn on_bound_changed(&mut self, _var: VarId, _kind: BoundKind, _old: f64, _new: f64) {}
}

/// Observer that records events for later replay.
///
/// Useful when the interested party cannot be borrowed during the mutation;
/// the recorded events are drained and forwarded afterwards.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<BoundEvent>,
}

impl EventBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all recorded events in order.
    pub fn drain(&mut self) -> impl Iterator<Item = BoundEvent> + '_ {
        self.events.drain(..)
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if no events are buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl BoundObserver for EventBuffer {
    fn on_bound_changed(&mut self, var: VarId, kind: BoundKind, old: f64, new: f64) {
        self.events.push(BoundEvent {
            var,
            kind,
            old,
            new,
        });
    }
}
