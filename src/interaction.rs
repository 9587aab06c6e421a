//! Pointer-driven and idle rotation
//!
//! The mode is fixed at startup from the device's pointer capability. Idle
//! terms are pure functions of elapsed time; only the pointer offset is
//! smoothed frame to frame.

use crate::config::SphereConfig;
use crate::transform::RotationState;

/// Speed of the idle X sway, radians per second
const SWAY_RATE: f32 = 0.15;

/// Amplitude of the idle X sway, radians
const SWAY_AMPLITUDE: f32 = 0.05;

/// How rotation is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// No precise pointer: slow spin plus a gentle sway
    AutoDrift,
    /// Precise pointer: rotation eases toward the pointer offset
    PointerFollow,
}

/// Derives the sphere's rotation each frame
#[derive(Debug, Clone)]
pub struct InteractionController {
    mode: InteractionMode,
    sensitivity: f32,
    smoothing: f32,
    drift_speed: f32,
    /// Pointer-derived rotation target (x, y)
    target: [f32; 2],
    /// Smoothed pointer rotation (x, y)
    offset: [f32; 2],
}

impl InteractionController {
    /// Create a controller; `fine_pointer` selects the mode for good.
    pub fn new(config: &SphereConfig, fine_pointer: bool) -> Self {
        Self {
            mode: if fine_pointer {
                InteractionMode::PointerFollow
            } else {
                InteractionMode::AutoDrift
            },
            sensitivity: config.pointer_sensitivity,
            smoothing: config.rotation_smoothing,
            drift_speed: config.auto_rotate_speed,
            target: [0.0, 0.0],
            offset: [0.0, 0.0],
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Current pointer-derived target (x, y)
    pub fn target(&self) -> [f32; 2] {
        self.target
    }

    /// Record a pointer position relative to the container's top-left corner.
    ///
    /// Ignored in [`InteractionMode::AutoDrift`] and for empty containers.
    /// Only the latest sample matters; nothing is queued.
    pub fn pointer_moved(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if self.mode != InteractionMode::PointerFollow {
            return;
        }
        let (Some(nx), Some(ny)) = (normalize_offset(x, width), normalize_offset(y, height)) else {
            return;
        };

        // Horizontal movement turns around Y, vertical movement tilts around X
        self.target = [ny * self.sensitivity, nx * self.sensitivity];
    }

    /// Pointer left the container: ease back to center
    pub fn pointer_left(&mut self) {
        self.target = [0.0, 0.0];
    }

    /// Advance one frame and return the rotation to draw with
    pub fn update(&mut self, elapsed: f32) -> RotationState {
        let drift = elapsed * self.drift_speed;

        match self.mode {
            InteractionMode::AutoDrift => {
                RotationState::new((elapsed * SWAY_RATE).sin() * SWAY_AMPLITUDE, drift)
            }
            InteractionMode::PointerFollow => {
                for axis in 0..2 {
                    self.offset[axis] += (self.target[axis] - self.offset[axis]) * self.smoothing;
                }
                RotationState::new(self.offset[0], drift + self.offset[1])
            }
        }
    }
}

/// Map a coordinate in [0, extent] to [-1, 1] around the center
fn normalize_offset(value: f32, extent: f32) -> Option<f32> {
    if !(extent.is_finite() && extent > 0.0 && value.is_finite()) {
        return None;
    }
    let half = extent / 2.0;
    Some(((value - half) / half).clamp(-1.0, 1.0))
}
