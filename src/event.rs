//! Typed platform input events.
//!
//! The windowing backend delivers its raw input converted into these types;
//! whether they came from libinput, an X server or a nested compositor is
//! not this crate's concern. Timestamps are 32-bit milliseconds with
//! wrapping semantics (see [`crate::utils::time_is_before`]); 0 means the
//! platform did not provide one.

/// Identifier of one physical touch contact, stable from down to up/cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(u64);

impl SequenceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Opaque reference to the scene-graph node an event was picked on.
///
/// Never interpreted here; it is handed back to the embedder for
/// hit-testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(u64);

impl ActorId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Position in stage-local device units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Released,
    Pressed,
}

/// Contact state of a tablet tool tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipState {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardEvent {
    pub time: u32,
    pub key_code: u32,
    pub state: KeyState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerMotionEvent {
    pub time: u32,
    pub position: Point,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerButtonEvent {
    pub time: u32,
    pub button: u32,
    pub state: ButtonState,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerAxisEvent {
    pub time: u32,
    pub horizontal: f64,
    pub vertical: f64,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchDownEvent {
    pub time: u32,
    pub sequence: SequenceId,
    pub position: Point,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchMotionEvent {
    pub time: u32,
    pub sequence: SequenceId,
    pub position: Point,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchUpEvent {
    pub time: u32,
    pub sequence: SequenceId,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchCancelEvent {
    pub time: u32,
    pub sequence: SequenceId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabletToolAxisEvent {
    pub time: u32,
    pub position: Point,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabletToolTipEvent {
    pub time: u32,
    pub position: Point,
    pub state: TipState,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabletToolButtonEvent {
    pub time: u32,
    pub button: u32,
    pub state: ButtonState,
    pub source: Option<ActorId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabletPadButtonEvent {
    pub time: u32,
    pub button: u32,
    pub state: ButtonState,
}

/// One platform input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Keyboard { event: KeyboardEvent },
    PointerMotion { event: PointerMotionEvent },
    PointerButton { event: PointerButtonEvent },
    PointerAxis { event: PointerAxisEvent },
    TouchDown { event: TouchDownEvent },
    TouchMotion { event: TouchMotionEvent },
    TouchUp { event: TouchUpEvent },
    TouchCancel { event: TouchCancelEvent },
    TabletToolAxis { event: TabletToolAxisEvent },
    TabletToolTip { event: TabletToolTipEvent },
    TabletToolButton { event: TabletToolButtonEvent },
    TabletPadButton { event: TabletPadButtonEvent },
}

impl InputEvent {
    /// Event timestamp in milliseconds; 0 when the platform provided none.
    pub fn time(&self) -> u32 {
        match self {
            InputEvent::Keyboard { event } => event.time,
            InputEvent::PointerMotion { event } => event.time,
            InputEvent::PointerButton { event } => event.time,
            InputEvent::PointerAxis { event } => event.time,
            InputEvent::TouchDown { event } => event.time,
            InputEvent::TouchMotion { event } => event.time,
            InputEvent::TouchUp { event } => event.time,
            InputEvent::TouchCancel { event } => event.time,
            InputEvent::TabletToolAxis { event } => event.time,
            InputEvent::TabletToolTip { event } => event.time,
            InputEvent::TabletToolButton { event } => event.time,
            InputEvent::TabletPadButton { event } => event.time,
        }
    }

    /// The scene-graph node this event was picked on, for hit-testing.
    pub fn source(&self) -> Option<ActorId> {
        match self {
            InputEvent::Keyboard { .. }
            | InputEvent::TouchCancel { .. }
            | InputEvent::TabletPadButton { .. } => None,
            InputEvent::PointerMotion { event } => event.source,
            InputEvent::PointerButton { event } => event.source,
            InputEvent::PointerAxis { event } => event.source,
            InputEvent::TouchDown { event } => event.source,
            InputEvent::TouchMotion { event } => event.source,
            InputEvent::TouchUp { event } => event.source,
            InputEvent::TabletToolAxis { event } => event.source,
            InputEvent::TabletToolTip { event } => event.source,
            InputEvent::TabletToolButton { event } => event.source,
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, InputEvent::Keyboard { .. })
    }

    /// Press-like events begin an interaction and drive user-activity time.
    pub fn is_press(&self) -> bool {
        match self {
            InputEvent::Keyboard { event } => event.state == KeyState::Pressed,
            InputEvent::PointerButton { event } => event.state == ButtonState::Pressed,
            InputEvent::TouchDown { .. } => true,
            InputEvent::TabletToolTip { event } => event.state == TipState::Down,
            InputEvent::TabletToolButton { event } => event.state == ButtonState::Pressed,
            InputEvent::TabletPadButton { event } => event.state == ButtonState::Pressed,
            _ => false,
        }
    }
}
