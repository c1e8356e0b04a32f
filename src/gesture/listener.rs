//! Gesture recognizer registration.

use std::cell::RefCell;
use std::rc::Weak;

/// A gesture recognizer attached to the stage.
///
/// Recognizers live in the scene-graph layer and call into the tracker with
/// begin/end/cancel signals. The tracker only ever calls back through
/// [`cancelled`](GestureListener::cancelled), and only from a deferred-queue
/// drain, never from inside one of the recognizer's own signals.
pub trait GestureListener {
    /// The tracker is done with this recognizer; any gesture it has in
    /// progress must stop.
    fn cancelled(&mut self);
}

/// Handle identifying a registered recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The recognizers currently attached to the stage, in registration order.
///
/// Holds non-owning references: a recognizer dropped by the scene graph
/// simply stops being reachable.
#[derive(Debug, Default)]
pub struct GestureListenerSet {
    entries: Vec<(ListenerId, Weak<RefCell<dyn GestureListener>>)>,
    next_id: u64,
}

impl GestureListenerSet {
    pub fn insert(&mut self, listener: Weak<RefCell<dyn GestureListener>>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let len = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != len
    }

    pub fn get(&self, id: ListenerId) -> Option<&Weak<RefCell<dyn GestureListener>>> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, listener)| listener)
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    /// Ids of all attached recognizers, in registration order.
    pub fn ids(&self) -> Vec<ListenerId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
