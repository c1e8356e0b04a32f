//! Multi-touch gesture arbitration.
//!
//! Every touch sequence starts undecided. The gesture recognizers attached
//! to the stage compete for it: the first `begin` signal accepts the whole
//! stage, and every tracked sequence with it. A sequence that travels too
//! far while undecided, runs out its grace period, or ends untouched is
//! rejected so the stream can be released to other consumers. Rejection is
//! final and immediately finalized: `Rejected` is always followed by
//! `PendingEnd` in the same step.
//!
//! Everything here runs on the compositor's event-loop thread. The one
//! rule that looks like a concurrency concern is the deferred-action queue:
//! a recognizer is never torn down from inside a signal that may originate
//! on its own call stack.

mod listener;
mod registry;

use std::cell::RefCell;
use std::mem;
use std::rc::Weak;
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::config::Config;
use crate::event::{InputEvent, Point, SequenceId};

pub use listener::{GestureListener, GestureListenerSet, ListenerId};
pub use registry::{state_is_applicable, SequenceRegistry, SequenceState};

/// Destructive cleanup queued for the next idle turn.
///
/// A recognizer may have to be torn down in reaction to a signal that
/// originated on its own call stack; running the teardown there would
/// re-enter it (a `RefCell` double borrow), so it is queued and drained
/// once the stack has unwound.
pub(crate) enum DeferredAction {
    CancelListener(Weak<RefCell<dyn GestureListener>>),
}

impl DeferredAction {
    /// Runs the cleanup. Only call with no recognizer signal on the stack.
    pub(crate) fn run(self) {
        match self {
            DeferredAction::CancelListener(weak) => {
                if let Some(listener) = weak.upgrade() {
                    listener.borrow_mut().cancelled();
                }
            }
        }
    }
}

/// The session-scoped view of the listener set.
///
/// Snapshotted when the first touch of a session arrives; recognizers
/// registered afterwards wait for the next session.
#[derive(Debug, Default)]
struct Session {
    snapshot: Vec<ListenerId>,
    active: Vec<ListenerId>,
}

/// The arbitration state machine.
///
/// Owns the sequence registry, the stage-wide state shared by all
/// recognizers, and the per-session listener bookkeeping.
pub struct GestureTracker {
    registry: SequenceRegistry,
    stage_state: SequenceState,
    listeners: GestureListenerSet,
    session: Option<Session>,
    deferred: Vec<DeferredAction>,
    autodeny_timeout: Duration,
    drag_threshold: f64,
}

impl GestureTracker {
    pub fn new(config: &Config, clock: Clock) -> Self {
        Self {
            registry: SequenceRegistry::new(clock),
            stage_state: SequenceState::None,
            listeners: GestureListenerSet::default(),
            session: None,
            deferred: Vec::new(),
            autodeny_timeout: config.autodeny_timeout,
            drag_threshold: config.drag_threshold,
        }
    }

    /// Registers a recognizer. It participates starting with the next
    /// arbitration session.
    pub fn register_listener(
        &mut self,
        listener: Weak<RefCell<dyn GestureListener>>,
    ) -> ListenerId {
        self.listeners.insert(listener)
    }

    /// Removes a recognizer. Mid-session this behaves like a cancel signal
    /// from it first, so the session never waits on a recognizer that no
    /// longer exists.
    pub fn unregister_listener(&mut self, id: ListenerId) {
        self.listener_cancel(id);
        self.listeners.remove(id);
    }

    /// Feeds a touch event to the arbitration machine.
    ///
    /// Returns `true` when the event belongs to a sequence the machine is
    /// still arbitrating or has claimed, i.e. one that must be withheld
    /// from the remote protocol.
    pub fn handle_event(&mut self, event: &InputEvent) -> bool {
        match event {
            InputEvent::TouchDown { event } => {
                self.touch_begin(event.sequence, event.position);
                self.is_retained(event.sequence)
            }
            InputEvent::TouchMotion { event } => {
                self.touch_update(event.sequence, event.position);
                self.is_retained(event.sequence)
            }
            InputEvent::TouchUp { event } => {
                let retained = self.registry.state(event.sequence) == SequenceState::Accepted;
                self.touch_end(event.sequence);
                retained
            }
            InputEvent::TouchCancel { event } => {
                let retained = self.registry.state(event.sequence) == SequenceState::Accepted;
                self.touch_end(event.sequence);
                retained
            }
            _ => false,
        }
    }

    fn is_retained(&self, seq: SequenceId) -> bool {
        matches!(
            self.registry.state(seq),
            SequenceState::None | SequenceState::Accepted
        )
    }

    fn touch_begin(&mut self, seq: SequenceId, pos: Point) {
        if self.session.is_none() {
            // First touch of a session: snapshot the recognizers attached
            // right now. Ones registered later wait for the next session.
            let snapshot = self.listeners.ids();
            trace!("starting arbitration session with {} listeners", snapshot.len());
            self.session = Some(Session {
                snapshot,
                active: Vec::new(),
            });
        }

        self.registry.begin(seq, pos, self.autodeny_timeout);

        if self.stage_state != SequenceState::None {
            // The stage is already decided; the new sequence joins that
            // decision, if the transition exists for it.
            self.registry.set_state(seq, self.stage_state);
        } else if self.session.as_ref().is_some_and(|s| s.snapshot.is_empty()) {
            // Nothing is waiting to claim this sequence.
            self.registry.set_state(seq, SequenceState::Rejected);
        }
    }

    fn touch_update(&mut self, seq: SequenceId, pos: Point) {
        if self.registry.state(seq) != SequenceState::None {
            return;
        }
        let Some(start) = self.registry.start_pos(seq) else {
            return;
        };
        if (pos.x - start.x).abs() > self.drag_threshold
            || (pos.y - start.y).abs() > self.drag_threshold
        {
            // Too much motion for a tap; release the stream so a consumer
            // further down (window drag, the client) can claim it.
            self.registry.set_state(seq, SequenceState::Rejected);
        }
    }

    fn touch_end(&mut self, seq: SequenceId) {
        self.registry.end(seq);
        self.maybe_end_session();
    }

    /// A recognizer's gesture began.
    ///
    /// Returns whether it joined the stage: the stage must be acceptable
    /// (or already accepted), and the recognizer part of this session's
    /// snapshot.
    pub fn listener_begin(&mut self, id: ListenerId) -> bool {
        let Some(session) = &self.session else {
            debug!("gesture begin from {id:?} outside an arbitration session");
            return false;
        };
        if !session.snapshot.contains(&id) {
            // Registered after the session snapshot; not picked up.
            return false;
        }
        if self.stage_state != SequenceState::Accepted
            && !self.set_stage_state(SequenceState::Accepted)
        {
            return false;
        }

        let session = self.session.as_mut().unwrap();
        if !session.active.contains(&id) {
            session.active.push(id);
        }
        true
    }

    /// A recognizer's gesture completed.
    ///
    /// When the last active recognizer ends, the whole session resets to a
    /// fresh baseline: tracked records are dropped and the listener hookups
    /// are torn down, to be rebuilt on the next first touch.
    pub fn listener_end(&mut self, id: ListenerId) {
        let Some(session) = &mut self.session else {
            return;
        };
        let len = session.active.len();
        session.active.retain(|active| *active != id);
        if len > session.active.len() && session.active.is_empty() {
            self.reset_session();
        }
    }

    /// A recognizer's gesture was cancelled.
    ///
    /// Unlike `end` this does not reset: if it empties the active set, the
    /// current decision is finalized and the session lingers until the
    /// remaining sequences terminate on their own.
    pub fn listener_cancel(&mut self, id: ListenerId) {
        let Some(session) = &mut self.session else {
            return;
        };
        let len = session.active.len();
        session.active.retain(|active| *active != id);
        if len > session.active.len() && session.active.is_empty() {
            self.set_stage_state(SequenceState::PendingEnd);
            self.maybe_end_session();
        }
    }

    /// Moves the whole stage to a new state, cascading it to every tracked
    /// sequence. Returns whether the stage transition was legal.
    ///
    /// Sequences for which the cascaded transition does not exist keep
    /// their state; an undecided one still falls to its auto-deny deadline.
    /// A stage rejection auto-advances to `PendingEnd` like a sequence
    /// rejection does. Ending up in `PendingEnd` cancels every recognizer
    /// still mid-gesture: the decision was finalized out from under them.
    /// Those cancellations are deferred, since the transition may originate
    /// inside one of their own signals.
    pub fn set_stage_state(&mut self, state: SequenceState) -> bool {
        if !state_is_applicable(self.stage_state, state) {
            return false;
        }
        trace!("stage state {:?} -> {state:?}", self.stage_state);
        self.stage_state = state;
        for seq in self.registry.sequence_ids() {
            self.registry.set_state(seq, state);
        }

        if state == SequenceState::Rejected {
            self.stage_state = SequenceState::PendingEnd;
        }
        if self.stage_state == SequenceState::PendingEnd {
            self.cancel_active_listeners();
            self.maybe_end_session();
        }
        true
    }

    /// Applies an externally decided state to one sequence, on behalf of
    /// whatever forwards accept/reject decisions for protocol clients.
    pub fn set_sequence_state(&mut self, seq: SequenceId, state: SequenceState) -> bool {
        self.registry.set_state(seq, state)
    }

    /// Current state of a sequence; `PendingEnd` for unknown ids.
    pub fn sequence_state(&self, seq: SequenceId) -> SequenceState {
        self.registry.state(seq)
    }

    pub fn stage_state(&self) -> SequenceState {
        self.stage_state
    }

    /// Number of touches currently tracked.
    pub fn sequence_count(&self) -> usize {
        self.registry.len()
    }

    /// Earliest pending auto-deny deadline, for the host loop to arm a
    /// wakeup at.
    pub fn next_autodeny_deadline(&self) -> Option<Duration> {
        self.registry.next_deadline()
    }

    /// Rejects undecided sequences whose grace period ran out. A stale
    /// wakeup finds nothing due and is a no-op.
    pub fn expire_overdue(&mut self) {
        self.registry.expire_overdue();
    }

    /// Drains queued state-change notifications in application order.
    pub fn take_notifications(&mut self) -> Vec<(SequenceId, SequenceState)> {
        self.registry.take_notifications()
    }

    pub(crate) fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<DeferredAction> {
        mem::take(&mut self.deferred)
    }

    /// Runs queued destructive cleanup.
    ///
    /// Only call from an idle turn, with no recognizer signal on the stack;
    /// the dispatcher does this via the event loop.
    pub fn drain_deferred(&mut self) {
        for action in mem::take(&mut self.deferred) {
            action.run();
        }
    }

    /// Cancels every recognizer still mid-gesture and clears all
    /// arbitration state. The cancellations go through the deferred queue.
    pub fn shutdown(&mut self) {
        self.cancel_active_listeners();
        self.registry.clear();
        self.stage_state = SequenceState::None;
        self.session = None;
    }

    pub fn clock(&self) -> &Clock {
        self.registry.clock()
    }

    fn cancel_active_listeners(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        for id in session.active.drain(..) {
            if let Some(listener) = self.listeners.get(id) {
                self.deferred
                    .push(DeferredAction::CancelListener(listener.clone()));
            }
        }
    }

    /// Tears the session down once nothing keeps it alive: no tracked
    /// sequences and no recognizer mid-gesture.
    fn maybe_end_session(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if session.active.is_empty() && self.registry.is_empty() {
            self.reset_session();
        }
    }

    fn reset_session(&mut self) {
        trace!("arbitration session over");
        self.registry.clear();
        self.stage_state = SequenceState::None;
        self.session = None;
    }
}
