//! Per-sequence arbitration state.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::{trace, warn};

use crate::clock::Clock;
use crate::event::{Point, SequenceId};

/// Arbitration state of a touch sequence, or of the whole stage.
///
/// Once a sequence leaves `None` the only transition left is into
/// `PendingEnd`: the decision itself is final, the sequence merely has not
/// terminated yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    /// Not decided yet.
    None,
    /// Claimed by a compositor gesture.
    Accepted,
    /// Released to other consumers.
    Rejected,
    /// Decision finalized, awaiting natural termination of the sequence.
    PendingEnd,
}

/// Whether a transition from `prev` to `next` is legal.
///
/// `Rejected` never rests: the setter advances it to `PendingEnd` in the
/// same step, so the table only needs to allow the first half of that pair.
pub fn state_is_applicable(prev: SequenceState, next: SequenceState) -> bool {
    use SequenceState::*;
    match (prev, next) {
        // Decisions are never unmade.
        (_, None) => false,
        // Terminal.
        (PendingEnd, _) => false,
        // Finalizing requires a decision first.
        (None, PendingEnd) => false,
        (None, Accepted) | (None, Rejected) => true,
        (Accepted, PendingEnd) | (Rejected, PendingEnd) => true,
        // Sticky once decided; same-state transitions are not transitions.
        (Accepted, Accepted) | (Accepted, Rejected) => false,
        (Rejected, Accepted) | (Rejected, Rejected) => false,
    }
}

#[derive(Debug)]
struct TouchSequence {
    state: SequenceState,
    start_pos: Point,
    autodeny_deadline: Option<Duration>,
}

/// Tracks every live touch sequence and its arbitration state.
///
/// State changes queue up as notifications in application order for the
/// owner to drain and forward; the queue is the only way decisions leave
/// this type, so the `Rejected`/`PendingEnd` pair is always observable as
/// two ordered entries.
#[derive(Debug)]
pub struct SequenceRegistry {
    sequences: HashMap<SequenceId, TouchSequence>,
    notifications: VecDeque<(SequenceId, SequenceState)>,
    clock: Clock,
}

impl SequenceRegistry {
    pub fn new(clock: Clock) -> Self {
        Self {
            sequences: HashMap::new(),
            notifications: VecDeque::new(),
            clock,
        }
    }

    /// Registers a new undecided sequence and arms its auto-deny deadline.
    pub fn begin(&mut self, seq: SequenceId, start_pos: Point, autodeny_timeout: Duration) {
        let deadline = self.clock.now() + autodeny_timeout;
        match self.sequences.entry(seq) {
            Entry::Occupied(_) => {
                warn!("sequence {seq:?} began twice; keeping the existing record");
            }
            Entry::Vacant(entry) => {
                entry.insert(TouchSequence {
                    state: SequenceState::None,
                    start_pos,
                    autodeny_deadline: Some(deadline),
                });
            }
        }
    }

    /// Removes a sequence, forcing a decision first if it never got one.
    ///
    /// An undecided sequence is rejected on the way out so that observers
    /// see a consistent deny-by-default resolution; already-decided
    /// sequences leave without further notifications. Unknown ids are
    /// ignored.
    pub fn end(&mut self, seq: SequenceId) {
        let Some(sequence) = self.sequences.get(&seq) else {
            return;
        };
        if sequence.state == SequenceState::None {
            self.set_state(seq, SequenceState::Rejected);
        }
        self.sequences.remove(&seq);
    }

    /// Applies a state transition, returning whether it was legal.
    ///
    /// A successful transition disarms the auto-deny deadline and queues a
    /// notification. Setting `Rejected` advances to `PendingEnd` in the same
    /// step and queues both notifications back to back. Illegal transitions
    /// and unknown ids leave everything untouched.
    pub fn set_state(&mut self, seq: SequenceId, state: SequenceState) -> bool {
        let Some(sequence) = self.sequences.get_mut(&seq) else {
            return false;
        };
        if !state_is_applicable(sequence.state, state) {
            return false;
        }

        let rejected = state == SequenceState::Rejected;
        sequence.state = if rejected {
            // Rejection releases the touch stream to other consumers; the
            // sequence is done with arbitration the moment it is rejected.
            SequenceState::PendingEnd
        } else {
            state
        };
        sequence.autodeny_deadline = None;

        self.notifications.push_back((seq, state));
        if rejected {
            self.notifications.push_back((seq, SequenceState::PendingEnd));
        }
        true
    }

    /// Current state of a sequence.
    ///
    /// Unknown ids read as `PendingEnd`: an absent sequence must never be
    /// mistaken for an open one.
    pub fn state(&self, seq: SequenceId) -> SequenceState {
        self.sequences
            .get(&seq)
            .map_or(SequenceState::PendingEnd, |s| s.state)
    }

    /// Position of the first contact of a sequence.
    pub fn start_pos(&self, seq: SequenceId) -> Option<Point> {
        self.sequences.get(&seq).map(|s| s.start_pos)
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub(crate) fn sequence_ids(&self) -> Vec<SequenceId> {
        self.sequences.keys().copied().collect()
    }

    /// Earliest pending auto-deny deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.sequences
            .values()
            .filter_map(|s| s.autodeny_deadline)
            .min()
    }

    /// Rejects every undecided sequence whose deadline has passed.
    ///
    /// Safe to call from a stale timer wakeup: a sequence that was decided
    /// or removed in the meantime no longer carries a deadline, so nothing
    /// happens.
    pub fn expire_overdue(&mut self) {
        let now = self.clock.now();
        let overdue: Vec<SequenceId> = self
            .sequences
            .iter()
            .filter(|(_, s)| s.autodeny_deadline.is_some_and(|d| d <= now))
            .map(|(seq, _)| *seq)
            .collect();
        for seq in overdue {
            trace!("auto-denying undecided sequence {seq:?}");
            self.set_state(seq, SequenceState::Rejected);
        }
    }

    /// Drops every record without emitting notifications.
    pub fn clear(&mut self) {
        self.sequences.clear();
    }

    /// Drains queued state-change notifications in application order.
    pub fn take_notifications(&mut self) -> Vec<(SequenceId, SequenceState)> {
        self.notifications.drain(..).collect()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const SEQ: SequenceId = SequenceId::new(1);
    const TIMEOUT: Duration = Duration::from_millis(150);

    fn registry() -> SequenceRegistry {
        SequenceRegistry::new(Clock::with_time(Duration::ZERO))
    }

    fn begin(registry: &mut SequenceRegistry) {
        registry.begin(SEQ, Point::new(100., 100.), TIMEOUT);
    }

    #[test]
    fn transition_table() {
        use SequenceState::*;
        for state in [None, Accepted, Rejected, PendingEnd] {
            assert!(!state_is_applicable(state, None));
            assert!(!state_is_applicable(PendingEnd, state));
            assert!(!state_is_applicable(state, state));
        }
        assert!(state_is_applicable(None, Accepted));
        assert!(state_is_applicable(None, Rejected));
        assert!(!state_is_applicable(None, PendingEnd));
        assert!(state_is_applicable(Accepted, PendingEnd));
        assert!(state_is_applicable(Rejected, PendingEnd));
        assert!(!state_is_applicable(Accepted, Rejected));
        assert!(!state_is_applicable(Rejected, Accepted));
    }

    #[test]
    fn accept_is_sticky() {
        let mut registry = registry();
        begin(&mut registry);

        assert!(registry.set_state(SEQ, SequenceState::Accepted));
        assert!(!registry.set_state(SEQ, SequenceState::Rejected));
        assert_eq!(registry.state(SEQ), SequenceState::Accepted);
        assert_eq!(
            registry.take_notifications(),
            vec![(SEQ, SequenceState::Accepted)],
        );
    }

    #[test]
    fn rejection_emits_the_pending_end_pair() {
        let mut registry = registry();
        begin(&mut registry);

        assert!(registry.set_state(SEQ, SequenceState::Rejected));
        assert_eq!(registry.state(SEQ), SequenceState::PendingEnd);
        assert_eq!(
            registry.take_notifications(),
            vec![
                (SEQ, SequenceState::Rejected),
                (SEQ, SequenceState::PendingEnd),
            ],
        );

        // Terminal: nothing else applies.
        assert!(!registry.set_state(SEQ, SequenceState::Accepted));
        assert!(registry.take_notifications().is_empty());
    }

    #[test]
    fn unknown_sequences_read_as_pending_end() {
        let mut registry = registry();
        assert_eq!(registry.state(SEQ), SequenceState::PendingEnd);
        assert!(!registry.set_state(SEQ, SequenceState::Accepted));
        registry.end(SEQ);
        assert!(registry.take_notifications().is_empty());
    }

    #[test]
    fn end_forces_resolution_of_undecided_sequences() {
        let mut registry = registry();
        begin(&mut registry);

        registry.end(SEQ);
        assert!(registry.is_empty());
        assert_eq!(
            registry.take_notifications(),
            vec![
                (SEQ, SequenceState::Rejected),
                (SEQ, SequenceState::PendingEnd),
            ],
        );
    }

    #[test]
    fn end_of_a_decided_sequence_is_silent() {
        let mut registry = registry();
        begin(&mut registry);
        registry.set_state(SEQ, SequenceState::Accepted);
        registry.take_notifications();

        registry.end(SEQ);
        assert!(registry.is_empty());
        assert!(registry.take_notifications().is_empty());
    }

    #[test]
    fn autodeny_fires_only_after_the_deadline() {
        let clock = Clock::with_time(Duration::ZERO);
        let mut registry = SequenceRegistry::new(clock.clone());
        registry.begin(SEQ, Point::new(0., 0.), TIMEOUT);
        assert_eq!(registry.next_deadline(), Some(TIMEOUT));

        clock.advance(Duration::from_millis(149));
        registry.expire_overdue();
        assert_eq!(registry.state(SEQ), SequenceState::None);
        assert!(registry.take_notifications().is_empty());

        clock.advance(Duration::from_millis(1));
        registry.expire_overdue();
        assert_eq!(registry.state(SEQ), SequenceState::PendingEnd);
        assert_eq!(
            registry.take_notifications(),
            vec![
                (SEQ, SequenceState::Rejected),
                (SEQ, SequenceState::PendingEnd),
            ],
        );
        assert_eq!(registry.next_deadline(), None);
    }

    #[test]
    fn deciding_a_sequence_disarms_its_deadline() {
        let clock = Clock::with_time(Duration::ZERO);
        let mut registry = SequenceRegistry::new(clock.clone());
        registry.begin(SEQ, Point::new(0., 0.), TIMEOUT);

        registry.set_state(SEQ, SequenceState::Accepted);
        assert_eq!(registry.next_deadline(), None);

        // A stale wakeup after the decision is a no-op.
        clock.advance(Duration::from_secs(1));
        registry.expire_overdue();
        assert_eq!(registry.state(SEQ), SequenceState::Accepted);
    }

    #[test]
    fn duplicate_begin_keeps_the_existing_record() {
        let mut registry = registry();
        begin(&mut registry);
        registry.set_state(SEQ, SequenceState::Accepted);

        registry.begin(SEQ, Point::new(500., 500.), TIMEOUT);
        assert_eq!(registry.state(SEQ), SequenceState::Accepted);
        assert_eq!(registry.start_pos(SEQ), Some(Point::new(100., 100.)));
    }

    fn any_state() -> impl Strategy<Value = SequenceState> {
        prop_oneof![
            Just(SequenceState::None),
            Just(SequenceState::Accepted),
            Just(SequenceState::Rejected),
            Just(SequenceState::PendingEnd),
        ]
    }

    proptest! {
        // Once a sequence leaves `None`, every later observable state is
        // either the same decision or `PendingEnd`, and failed transitions
        // change nothing.
        #[test]
        fn transitions_are_monotonic(states in proptest::collection::vec(any_state(), 0..32)) {
            let mut registry = registry();
            registry.begin(SEQ, Point::new(0., 0.), TIMEOUT);

            let mut prev = registry.state(SEQ);
            for state in states {
                let applied = registry.set_state(SEQ, state);
                let now = registry.state(SEQ);
                if applied {
                    prop_assert!(state_is_applicable(prev, state));
                    if state == SequenceState::Rejected {
                        prop_assert_eq!(now, SequenceState::PendingEnd);
                    } else {
                        prop_assert_eq!(now, state);
                    }
                } else {
                    prop_assert_eq!(now, prev);
                }
                if prev != SequenceState::None && now != prev {
                    prop_assert_eq!(now, SequenceState::PendingEnd);
                }
                prev = now;
            }
        }
    }
}
