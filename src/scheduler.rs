//! Frame loop lifecycle
//!
//! The loop runs only while four conditions hold at once: motion is allowed,
//! a backend is ready, the element is in the viewport, and the host has not
//! stopped it. At most one frame
//! is ever pending. The frame callback asks for its successor before drawing,
//! and only while still running and only if it is the pending callback. Leaving the viewport cancels the pending
//! frame, and re-entering requests a new one.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::error::{SphereError, SphereResult};

/// Transitions kept for diagnostics
const MAX_TRANSITIONS: usize = 32;

/// Host-issued identifier of a pending frame callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle(pub i32);

/// Something that can schedule and cancel a single frame callback
/// (`requestAnimationFrame` in the browser).
pub trait FrameRequester {
    /// Schedule the frame callback once
    fn request_frame(&self) -> SphereResult<FrameHandle>;

    /// Cancel a callback that has not fired yet
    fn cancel_frame(&self, handle: FrameHandle);
}

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
    Disposed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Disposed => write!(f, "disposed"),
        }
    }
}

/// Why the state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    BackendReady,
    EnteredViewport,
    LeftViewport,
    HostStarted,
    HostStopped,
    SchedulingFailed,
    Disposed,
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransitionCause::BackendReady => "backend ready",
            TransitionCause::EnteredViewport => "entered viewport",
            TransitionCause::LeftViewport => "left viewport",
            TransitionCause::HostStarted => "started by host",
            TransitionCause::HostStopped => "stopped by host",
            TransitionCause::SchedulingFailed => "scheduling failed",
            TransitionCause::Disposed => "disposed",
        };
        f.write_str(text)
    }
}

/// A recorded state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub cause: TransitionCause,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.cause)
    }
}

/// Owns the running/stopped flag and the single pending frame
#[derive(Debug)]
pub struct LifecycleScheduler {
    state: LifecycleState,
    motion_allowed: bool,
    visible: bool,
    backend_ready: bool,
    enabled: bool,
    pending: Option<FrameHandle>,
    transitions: VecDeque<Transition>,
}

impl LifecycleScheduler {
    /// `motion_allowed` is read once; without it the loop never runs.
    pub fn new(motion_allowed: bool) -> Self {
        Self {
            state: LifecycleState::Stopped,
            motion_allowed,
            visible: false,
            backend_ready: false,
            enabled: true,
            pending: None,
            transitions: VecDeque::with_capacity(MAX_TRANSITIONS),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Frame currently scheduled, if any
    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.pending
    }

    /// Recent state changes, oldest first
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// The backend finished initializing
    pub fn mark_backend_ready(&mut self, frames: &dyn FrameRequester) -> SphereResult<()> {
        if self.state == LifecycleState::Disposed {
            return Err(SphereError::Disposed);
        }
        self.backend_ready = true;
        self.reevaluate(TransitionCause::BackendReady, frames)
    }

    /// Viewport intersection changed
    pub fn set_visible(&mut self, visible: bool, frames: &dyn FrameRequester) -> SphereResult<()> {
        if self.state == LifecycleState::Disposed {
            return Err(SphereError::Disposed);
        }
        self.visible = visible;
        let cause = if visible {
            TransitionCause::EnteredViewport
        } else {
            TransitionCause::LeftViewport
        };
        self.reevaluate(cause, frames)
    }

    /// Host-level start/stop, independent of visibility
    pub fn set_enabled(&mut self, enabled: bool, frames: &dyn FrameRequester) -> SphereResult<()> {
        if self.state == LifecycleState::Disposed {
            return Err(SphereError::Disposed);
        }
        self.enabled = enabled;
        let cause = if enabled {
            TransitionCause::HostStarted
        } else {
            TransitionCause::HostStopped
        };
        self.reevaluate(cause, frames)
    }

    /// Called at the top of the frame callback with the handle that fired.
    ///
    /// Returns `true` if the frame should be drawn; in that case the next
    /// frame has already been requested. A callback that is not the pending
    /// one (dispatched before a stop, firing after a restart) neither draws
    /// nor reschedules.
    pub fn begin_frame(
        &mut self,
        fired: FrameHandle,
        frames: &dyn FrameRequester,
    ) -> SphereResult<bool> {
        if self.pending != Some(fired) {
            debug!(?fired, pending = ?self.pending, "stale frame callback ignored");
            return Ok(false);
        }
        self.pending = None;

        if self.state != LifecycleState::Running {
            return Ok(false);
        }

        match frames.request_frame() {
            Ok(handle) => {
                self.pending = Some(handle);
                Ok(true)
            }
            Err(err) => {
                self.transition(LifecycleState::Stopped, TransitionCause::SchedulingFailed);
                Err(err)
            }
        }
    }

    /// Stop for good and cancel any pending frame
    pub fn dispose(&mut self, frames: &dyn FrameRequester) {
        if let Some(handle) = self.pending.take() {
            frames.cancel_frame(handle);
        }
        if self.state != LifecycleState::Disposed {
            self.transition(LifecycleState::Disposed, TransitionCause::Disposed);
        }
    }

    fn should_run(&self) -> bool {
        self.motion_allowed && self.backend_ready && self.visible && self.enabled
    }

    fn reevaluate(&mut self, cause: TransitionCause, frames: &dyn FrameRequester) -> SphereResult<()> {
        match (self.state, self.should_run()) {
            (LifecycleState::Stopped, true) => {
                if self.pending.is_none() {
                    match frames.request_frame() {
                        Ok(handle) => self.pending = Some(handle),
                        Err(err) => {
                            self.transition(
                                LifecycleState::Stopped,
                                TransitionCause::SchedulingFailed,
                            );
                            return Err(err);
                        }
                    }
                }
                self.transition(LifecycleState::Running, cause);
            }
            (LifecycleState::Running, false) => {
                if let Some(handle) = self.pending.take() {
                    frames.cancel_frame(handle);
                }
                self.transition(LifecycleState::Stopped, cause);
            }
            _ => {}
        }
        Ok(())
    }

    fn transition(&mut self, to: LifecycleState, cause: TransitionCause) {
        let entry = Transition {
            from: self.state,
            to,
            cause,
        };
        debug!(%entry, "lifecycle transition");

        if self.transitions.len() == MAX_TRANSITIONS {
            self.transitions.pop_front();
        }
        self.transitions.push_back(entry);
        self.state = to;
    }
}
