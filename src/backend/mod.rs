//! Rendering strategies
//!
//! Both strategies draw the same picture (glow, connection lines, shimmering
//! points) from the same scene. They differ in where the work happens:
//!
//! - **Canvas 2D**: rotates and projects every point on the CPU, then issues
//!   2D path and fill calls.
//! - **WebGPU**: uploads the points once and only updates a small uniform
//!   block per frame; rotation and projection run in the vertex stage.
//!
//! A strategy is chosen once at startup. Construction either yields a fully
//! working backend or an error; a half-built backend is never kept.

pub mod canvas2d;
#[cfg(feature = "webgpu")]
pub mod shaders;
#[cfg(feature = "webgpu")]
pub mod shell;
#[cfg(all(feature = "webgpu", target_arch = "wasm32"))]
pub mod webgpu;

use std::fmt;

use crate::sphere::Scene;
use crate::transform::{ProjectionConfig, RotationState};

/// Which strategy is drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Canvas2d,
    WebGpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Canvas2d => write!(f, "canvas2d"),
            BackendKind::WebGpu => write!(f, "webgpu"),
        }
    }
}

/// Everything a backend needs to draw one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameState<'a> {
    /// Seconds since the first frame
    pub elapsed: f32,
    pub rotation: RotationState,
    pub projection: &'a ProjectionConfig,
    pub scene: &'a Scene,
}

/// A rendering strategy
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    /// Adopt a new viewport size
    fn resize(&mut self, projection: &ProjectionConfig);

    /// Draw one complete frame
    fn render_frame(&mut self, frame: &FrameState<'_>);

    /// Release drawing resources; later frames are ignored
    fn dispose(&mut self);
}
