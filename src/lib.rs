//! Input event routing and multi-touch gesture arbitration for a Wayland
//! compositor.
//!
//! Two cooperating pieces, both driven from the compositor's single calloop
//! thread:
//!
//! * [`EventRouter`] decides the one consumer of each platform input event:
//!   an exclusive grab, the key-focused window, the window under the event,
//!   or nobody. It also decides which dispatch paths the event must be
//!   hidden from, since an event can be visible to internal actors but not
//!   to a remote client, or the other way around.
//! * [`GestureTracker`] arbitrates contested touch sequences between the
//!   gesture recognizers attached to the stage. Every sequence starts
//!   undecided and ends up accepted (claimed by a compositor gesture) or
//!   rejected (released to other consumers), either explicitly or through
//!   the deny-by-default timeout.
//!
//! [`Dispatcher`] glues both into the embedding compositor's event loop, the
//! way smithay components sit inside the compositor state: the embedder
//! implements [`DispatchHandler`] for its loop data and feeds events in
//! through [`Dispatcher::process_input_event`].
//!
//! Rendering, protocol marshalling and the scene graph stay on the other
//! side of the boundary traits; this crate never blocks and never does I/O
//! beyond arming timers on the loop it is given.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod gesture;
pub mod router;
pub mod utils;

pub use clock::Clock;
pub use config::Config;
pub use dispatch::{Dispatch, DispatchHandler, Dispatcher};
pub use event::{ActorId, InputEvent, Point, SequenceId};
pub use gesture::{GestureListener, GestureTracker, ListenerId, SequenceState};
pub use router::{DispatchFlags, EventRouter, GrabOp, RouteDecision};
