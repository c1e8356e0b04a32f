//! Event routing: deciding the one consumer of each input event.

use std::fmt;

use bitflags::bitflags;
use tracing::warn;

use crate::event::InputEvent;
use crate::utils::time_is_before;

/// The consumer an input event routes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision<W> {
    /// Normal focus/hit-test routing to a window.
    Normal(W),
    /// An interactive window operation (move/resize) owns the event stream.
    WindowOp(W),
    /// A compositor-internal modal grab owns the event stream.
    CompositorGrab,
    /// A grab held on behalf of a remote popup owns the event stream.
    WaylandPopup,
    /// A press on a server-side frame button owns the event stream.
    FrameButton(W),
    /// No consumer; the event is free for secondary dispatch.
    Unrouted,
}

/// Kinds of exclusive input grabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabOp {
    /// Interactive move or resize of a window.
    WindowOp,
    /// Compositor-internal modal grab.
    Compositor,
    /// Grab on behalf of a remote popup.
    WaylandPopup,
    /// Press on a server-side frame button.
    FrameButton,
}

bitflags! {
    /// Dispatch paths an event must be hidden from.
    ///
    /// One event can need hiding from one consumer while staying visible to
    /// the other: an internal window drag must not leak motion to a remote
    /// client, and a remote popup grab must not leak into internal actors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DispatchFlags: u8 {
        /// Hide from the internal scene-graph dispatch.
        const BYPASS_ACTORS = 1;
        /// Hide from the remote-protocol dispatch.
        const BYPASS_PROTOCOL = 1 << 1;
    }
}

/// Decides the single consumer of each platform input event.
///
/// Holds the grab and focus state the routing ladder consults, plus the
/// event timestamp bookkeeping used for user-activity tracking.
#[derive(Debug)]
pub struct EventRouter<W> {
    grab: Option<(GrabOp, Option<W>)>,
    key_focus: Option<W>,
    stage_focused: bool,
    current_event_time: u32,
    last_user_time: u32,
}

impl<W: Clone + PartialEq + fmt::Debug> EventRouter<W> {
    pub fn new() -> Self {
        Self {
            grab: None,
            key_focus: None,
            stage_focused: false,
            current_event_time: 0,
            last_user_time: 0,
        }
    }

    /// Begins an exclusive grab.
    ///
    /// Refuses a second concurrent grab, and window-targeted ops without a
    /// window.
    pub fn begin_grab(&mut self, op: GrabOp, window: Option<W>, time: u32) -> bool {
        if let Some((existing, _)) = &self.grab {
            warn!("refusing grab {op:?} at time {time}: grab {existing:?} is already active");
            return false;
        }
        if matches!(op, GrabOp::WindowOp | GrabOp::FrameButton) && window.is_none() {
            warn!("refusing window-targeted grab {op:?} without a window");
            return false;
        }
        self.grab = Some((op, window));
        true
    }

    /// Ends the current grab, returning to normal routing.
    pub fn end_grab(&mut self) {
        self.grab = None;
    }

    pub fn grab_op(&self) -> Option<GrabOp> {
        self.grab.as_ref().map(|(op, _)| *op)
    }

    pub fn grab_window(&self) -> Option<&W> {
        self.grab.as_ref().and_then(|(_, window)| window.as_ref())
    }

    pub fn has_grab(&self) -> bool {
        self.grab.is_some()
    }

    /// Updates which window holds key focus.
    pub fn set_key_focus(&mut self, window: Option<W>) {
        self.key_focus = window;
    }

    /// Updates whether the platform-level input focus is on the stage. Key
    /// events only reach the key-focus window while it is.
    pub fn set_stage_focused(&mut self, focused: bool) {
        self.stage_focused = focused;
    }

    /// Decides the consumer for `event`.
    ///
    /// `window_under` is the hit-test result for the event's source actor,
    /// resolved by the scene-graph layer.
    pub fn route(&self, event: &InputEvent, window_under: Option<W>) -> RouteDecision<W> {
        // An exclusive grab overrides everything, including the key and
        // gesture special cases below.
        if let Some((op, window)) = &self.grab {
            return match op {
                GrabOp::WindowOp => RouteDecision::WindowOp(window.clone().unwrap()),
                GrabOp::Compositor => RouteDecision::CompositorGrab,
                GrabOp::WaylandPopup => RouteDecision::WaylandPopup,
                GrabOp::FrameButton => RouteDecision::FrameButton(window.clone().unwrap()),
            };
        }

        if event.is_key() {
            // Key events follow key focus, and only while the platform
            // input focus is actually on the stage.
            if !self.stage_focused {
                return RouteDecision::Unrouted;
            }
            return match &self.key_focus {
                Some(window) => RouteDecision::Normal(window.clone()),
                None => RouteDecision::Unrouted,
            };
        }

        match window_under {
            Some(window) => RouteDecision::Normal(window),
            None => RouteDecision::Unrouted,
        }
    }

    /// The bypass flags a route implies.
    pub fn dispatch_flags(&self, decision: &RouteDecision<W>) -> DispatchFlags {
        match decision {
            // Internal grabs must not leak to remote clients.
            RouteDecision::WindowOp(_)
            | RouteDecision::CompositorGrab
            | RouteDecision::FrameButton(_) => DispatchFlags::BYPASS_PROTOCOL,
            // A remote popup grab must not leak into internal actors.
            RouteDecision::WaylandPopup => DispatchFlags::BYPASS_ACTORS,
            RouteDecision::Normal(_) | RouteDecision::Unrouted => DispatchFlags::empty(),
        }
    }

    /// Records the event timestamp, logging anomalies.
    ///
    /// Returns `false` when a press-like event carried no usable timestamp,
    /// so the caller can keep it away from user-activity bookkeeping.
    pub fn note_event_time(&mut self, event: &InputEvent) -> bool {
        let time = event.time();
        if time == 0 {
            if event.is_press() {
                warn!("press event without a timestamp; not updating user-activity time");
                return false;
            }
            return true;
        }

        if time_is_before(time, self.current_event_time) {
            // Usually a client fed us a stale timestamp.
            warn!(
                "event timestamp {time} went backwards (last was {})",
                self.current_event_time,
            );
        } else {
            self.current_event_time = time;
        }

        if event.is_press() && !time_is_before(time, self.last_user_time) {
            self.last_user_time = time;
        }
        true
    }

    /// Timestamp of the most recent event.
    pub fn current_event_time(&self) -> u32 {
        self.current_event_time
    }

    /// Timestamp of the most recent user interaction: a press-like event
    /// that carried a sane timestamp.
    pub fn last_user_time(&self) -> u32 {
        self.last_user_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        ActorId, ButtonState, KeyState, KeyboardEvent, Point, PointerButtonEvent,
        PointerMotionEvent,
    };

    fn button_press(time: u32, source: Option<ActorId>) -> InputEvent {
        InputEvent::PointerButton {
            event: PointerButtonEvent {
                time,
                button: 0x110,
                state: ButtonState::Pressed,
                source,
            },
        }
    }

    fn key_press(time: u32) -> InputEvent {
        InputEvent::Keyboard {
            event: KeyboardEvent {
                time,
                key_code: 28,
                state: KeyState::Pressed,
            },
        }
    }

    fn motion(time: u32) -> InputEvent {
        InputEvent::PointerMotion {
            event: PointerMotionEvent {
                time,
                position: Point::new(10., 10.),
                source: None,
            },
        }
    }

    #[test]
    fn grab_overrides_hit_testing() {
        let mut router = EventRouter::new();
        assert!(router.begin_grab(GrabOp::WindowOp, Some("w"), 100));

        // The hit test resolved a different window; the grab wins.
        let event = button_press(101, Some(ActorId::new(7)));
        assert_eq!(router.route(&event, Some("v")), RouteDecision::WindowOp("w"));

        router.end_grab();
        assert_eq!(router.route(&event, Some("v")), RouteDecision::Normal("v"));
    }

    #[test]
    fn grab_overrides_the_key_special_case() {
        let mut router = EventRouter::new();
        router.set_stage_focused(true);
        router.set_key_focus(Some("focused"));
        assert!(router.begin_grab(GrabOp::Compositor, None, 100));

        let event = key_press(101);
        assert_eq!(router.route(&event, None), RouteDecision::CompositorGrab);
    }

    #[test]
    fn key_events_follow_key_focus_only_while_the_stage_is_focused() {
        let mut router = EventRouter::new();
        router.set_key_focus(Some("focused"));

        // Logical focus alone is not enough.
        let event = key_press(100);
        assert_eq!(router.route(&event, None), RouteDecision::Unrouted);

        router.set_stage_focused(true);
        assert_eq!(router.route(&event, None), RouteDecision::Normal("focused"));

        router.set_key_focus(None);
        assert_eq!(router.route(&event, None), RouteDecision::Unrouted);
    }

    #[test]
    fn spatial_events_route_to_the_window_under_them() {
        let router = EventRouter::<&str>::new();
        let event = button_press(100, Some(ActorId::new(1)));
        assert_eq!(router.route(&event, Some("under")), RouteDecision::Normal("under"));
        assert_eq!(router.route(&event, None), RouteDecision::Unrouted);
    }

    #[test]
    fn only_one_grab_at_a_time() {
        let mut router = EventRouter::new();
        assert!(router.begin_grab(GrabOp::WindowOp, Some("w"), 1));
        assert!(!router.begin_grab(GrabOp::Compositor, None, 2));
        assert_eq!(router.grab_op(), Some(GrabOp::WindowOp));

        router.end_grab();
        assert!(router.begin_grab(GrabOp::Compositor, None, 3));
    }

    #[test]
    fn window_targeted_grabs_need_a_window() {
        let mut router = EventRouter::<&str>::new();
        assert!(!router.begin_grab(GrabOp::WindowOp, None, 1));
        assert!(!router.begin_grab(GrabOp::FrameButton, None, 1));
        assert!(!router.has_grab());
        assert!(router.begin_grab(GrabOp::WaylandPopup, None, 1));
    }

    #[test]
    fn internal_grabs_bypass_the_protocol() {
        let mut router = EventRouter::new();
        router.begin_grab(GrabOp::WindowOp, Some("w"), 1);
        let event = motion(2);
        let decision = router.route(&event, Some("v"));
        assert_eq!(
            router.dispatch_flags(&decision),
            DispatchFlags::BYPASS_PROTOCOL,
        );
    }

    #[test]
    fn popup_grabs_bypass_the_actors() {
        let mut router = EventRouter::<&str>::new();
        router.begin_grab(GrabOp::WaylandPopup, None, 1);
        let event = motion(2);
        let decision = router.route(&event, None);
        assert_eq!(router.dispatch_flags(&decision), DispatchFlags::BYPASS_ACTORS);
    }

    #[test]
    fn normal_routes_bypass_nothing() {
        let router = EventRouter::new();
        let event = motion(2);
        let decision = router.route(&event, Some("w"));
        assert_eq!(router.dispatch_flags(&decision), DispatchFlags::empty());
    }

    #[test]
    fn event_times_advance_and_regressions_are_ignored() {
        let mut router = EventRouter::<&str>::new();
        assert!(router.note_event_time(&motion(100)));
        assert_eq!(router.current_event_time(), 100);

        // A stale timestamp does not move time backwards.
        assert!(router.note_event_time(&motion(50)));
        assert_eq!(router.current_event_time(), 100);

        assert!(router.note_event_time(&motion(150)));
        assert_eq!(router.current_event_time(), 150);
    }

    #[test]
    fn presses_drive_user_activity_time() {
        let mut router = EventRouter::<&str>::new();
        router.note_event_time(&motion(100));
        assert_eq!(router.last_user_time(), 0);

        router.note_event_time(&button_press(120, None));
        assert_eq!(router.last_user_time(), 120);
    }

    #[test]
    fn presses_without_a_timestamp_are_flagged() {
        let mut router = EventRouter::<&str>::new();
        assert!(!router.note_event_time(&button_press(0, None)));
        assert_eq!(router.last_user_time(), 0);

        // A missing timestamp on a non-press is unremarkable.
        assert!(router.note_event_time(&motion(0)));
    }
}
