//! The external-facing event pump.
//!
//! [`Dispatcher`] lives inside the embedding compositor's calloop state, the
//! way smithay seats do: entry points are associated functions taking the
//! loop data, and [`DispatchHandler`] gives them the way back in, plus the
//! boundary collaborators (hit-testing, outbound state notifications).
//!
//! Everything that can change arbitration state funnels through one flush
//! tail: queued notifications go out to the handler, the auto-deny wakeup is
//! re-armed at the earliest pending deadline, and deferred destructive
//! cleanup is scheduled onto the next idle turn of the loop.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use tracing::trace;

use crate::clock::Clock;
use crate::config::Config;
use crate::event::{ActorId, InputEvent, SequenceId};
use crate::gesture::{GestureListener, GestureTracker, ListenerId, SequenceState};
use crate::router::{DispatchFlags, EventRouter, GrabOp, RouteDecision};

/// Boundary the embedding compositor implements.
pub trait DispatchHandler: Sized + 'static {
    /// The embedder's window handle.
    type Window: Clone + PartialEq + fmt::Debug;

    /// The dispatcher stored in this state.
    fn dispatcher(&mut self) -> &mut Dispatcher<Self>;

    /// Hit-test: the window owning the topmost surface under `actor`.
    fn window_for_actor(&mut self, actor: ActorId) -> Option<Self::Window>;

    /// A touch sequence's arbitration state changed. Forwarded to whatever
    /// relays accept/reject decisions to the protocol client.
    fn on_sequence_state_changed(&mut self, seq: SequenceId, state: SequenceState);
}

/// What to do with an event after routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch<W> {
    /// The consumer this event routes to.
    pub decision: RouteDecision<W>,
    /// Dispatch paths the event must be hidden from.
    pub bypass: DispatchFlags,
    /// The event was press-like but carried no usable timestamp; keep it
    /// away from user-activity bookkeeping.
    pub stale_timestamp: bool,
}

/// Pumps platform input events through routing and gesture arbitration.
pub struct Dispatcher<D: DispatchHandler> {
    router: EventRouter<D::Window>,
    tracker: GestureTracker,
    loop_handle: LoopHandle<'static, D>,
    autodeny_timer: Option<RegistrationToken>,
    idle_scheduled: bool,
}

impl<D: DispatchHandler> Dispatcher<D> {
    pub fn new(config: &Config, clock: Clock, loop_handle: LoopHandle<'static, D>) -> Self {
        Self {
            router: EventRouter::new(),
            tracker: GestureTracker::new(config, clock),
            loop_handle,
            autodeny_timer: None,
            idle_scheduled: false,
        }
    }

    /// Routes one platform event, running gesture arbitration for touch.
    ///
    /// The returned [`Dispatch`] tells the embedder which consumer the event
    /// belongs to and which dispatch paths it must be hidden from; actually
    /// delivering it is the embedder's job.
    pub fn process_input_event(data: &mut D, event: &InputEvent) -> Dispatch<D::Window> {
        let window_under = event
            .source()
            .and_then(|actor| data.window_for_actor(actor));

        let dispatcher = data.dispatcher();
        let time_ok = dispatcher.router.note_event_time(event);

        let mut bypass = DispatchFlags::empty();
        // An exclusive grab suppresses gesture arbitration along with the
        // rest of the routing special cases.
        if !dispatcher.router.has_grab() && dispatcher.tracker.handle_event(event) {
            // The sequence is still being arbitrated, or was claimed by a
            // compositor gesture; the remote protocol must not see it.
            bypass |= DispatchFlags::BYPASS_PROTOCOL;
        }

        let decision = dispatcher.router.route(event, window_under);
        bypass |= dispatcher.router.dispatch_flags(&decision);

        Self::flush(data);

        Dispatch {
            decision,
            bypass,
            stale_timestamp: !time_ok,
        }
    }

    /// Registers a gesture recognizer; it participates from the next
    /// arbitration session on.
    pub fn register_listener<L: GestureListener + 'static>(
        data: &mut D,
        listener: &Rc<RefCell<L>>,
    ) -> ListenerId {
        let rc: Rc<RefCell<dyn GestureListener>> = listener.clone();
        let weak: Weak<RefCell<dyn GestureListener>> = Rc::downgrade(&rc);
        data.dispatcher().tracker.register_listener(weak)
    }

    /// Removes a recognizer; mid-session this acts like a cancel from it.
    pub fn unregister_listener(data: &mut D, id: ListenerId) {
        data.dispatcher().tracker.unregister_listener(id);
        Self::flush(data);
    }

    /// A recognizer's gesture began. Returns whether it joined the stage.
    pub fn gesture_begin(data: &mut D, id: ListenerId) -> bool {
        let joined = data.dispatcher().tracker.listener_begin(id);
        Self::flush(data);
        joined
    }

    /// A recognizer's gesture completed.
    pub fn gesture_end(data: &mut D, id: ListenerId) {
        data.dispatcher().tracker.listener_end(id);
        Self::flush(data);
    }

    /// A recognizer's gesture was cancelled.
    pub fn gesture_cancel(data: &mut D, id: ListenerId) {
        data.dispatcher().tracker.listener_cancel(id);
        Self::flush(data);
    }

    /// Accepts or rejects one sequence on behalf of the protocol forwarder.
    pub fn set_sequence_state(data: &mut D, seq: SequenceId, state: SequenceState) -> bool {
        let applied = data.dispatcher().tracker.set_sequence_state(seq, state);
        Self::flush(data);
        applied
    }

    /// Decides the whole stage at once.
    pub fn set_stage_state(data: &mut D, state: SequenceState) -> bool {
        let applied = data.dispatcher().tracker.set_stage_state(state);
        Self::flush(data);
        applied
    }

    /// Cancels recognizers mid-gesture and clears all arbitration state.
    pub fn shutdown(data: &mut D) {
        data.dispatcher().tracker.shutdown();
        Self::flush(data);
    }

    /// Begins an exclusive grab; see [`EventRouter::begin_grab`].
    pub fn begin_grab(&mut self, op: GrabOp, window: Option<D::Window>, time: u32) -> bool {
        self.router.begin_grab(op, window, time)
    }

    /// Ends the current grab.
    pub fn end_grab(&mut self) {
        self.router.end_grab();
    }

    pub fn set_key_focus(&mut self, window: Option<D::Window>) {
        self.router.set_key_focus(window);
    }

    pub fn set_stage_focused(&mut self, focused: bool) {
        self.router.set_stage_focused(focused);
    }

    pub fn router(&self) -> &EventRouter<D::Window> {
        &self.router
    }

    pub fn tracker(&self) -> &GestureTracker {
        &self.tracker
    }

    /// Forwards queued notifications, re-arms the auto-deny wakeup and
    /// schedules the deferred-cleanup drain.
    fn flush(data: &mut D) {
        let dispatcher = data.dispatcher();
        let notifications = dispatcher.tracker.take_notifications();
        Self::rearm_autodeny_timer(dispatcher);

        if dispatcher.tracker.has_deferred() && !dispatcher.idle_scheduled {
            dispatcher.idle_scheduled = true;
            dispatcher.loop_handle.insert_idle(|data| {
                let dispatcher = data.dispatcher();
                dispatcher.idle_scheduled = false;
                let actions = dispatcher.tracker.take_deferred();
                // Run with no borrows held: a cancelled recognizer may call
                // straight back into the dispatcher.
                for action in actions {
                    action.run();
                }
            });
        }

        for (seq, state) in notifications {
            data.on_sequence_state_changed(seq, state);
        }
    }

    /// Keeps exactly one timer armed, at the earliest pending auto-deny
    /// deadline. Deciding or removing a sequence clears its deadline, which
    /// is what "cancelling its timer" means here; a wakeup that races such a
    /// decision finds nothing overdue.
    fn rearm_autodeny_timer(dispatcher: &mut Dispatcher<D>) {
        if let Some(token) = dispatcher.autodeny_timer.take() {
            dispatcher.loop_handle.remove(token);
        }
        let Some(deadline) = dispatcher.tracker.next_autodeny_deadline() else {
            return;
        };

        let now = dispatcher.tracker.clock().now();
        let timer = Timer::from_duration(deadline.saturating_sub(now));
        let token = dispatcher
            .loop_handle
            .insert_source(timer, |_, _, data| {
                Dispatcher::on_autodeny_timeout(data);
                TimeoutAction::Drop
            })
            .unwrap();
        dispatcher.autodeny_timer = Some(token);
    }

    fn on_autodeny_timeout(data: &mut D) {
        trace!("auto-deny timer fired");
        let dispatcher = data.dispatcher();
        dispatcher.autodeny_timer = None;
        dispatcher.tracker.expire_overdue();
        Self::flush(data);
    }
}
