//! particle-sphere - an ambient, slowly rotating particle sphere for hero
//! sections.
//!
//! Points are laid out on a golden-angle spiral, nearby points are joined by
//! faint lines, and the whole sphere drifts or follows the pointer. Drawing
//! uses WebGPU when available and Canvas 2D otherwise; when neither works, or
//! the user prefers reduced motion, nothing is drawn and the page is left
//! untouched.

pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod interaction;
pub mod logging;
pub mod scheduler;
pub mod shimmer;
pub mod sphere;
pub mod transform;
pub mod web;

use std::rc::Rc;

use tracing::{info, warn};
use wasm_bindgen::prelude::*;

pub use config::{BackendPreference, DeviceTier, SphereConfig};
pub use error::{SphereError, SphereResult};
pub use sphere::{Environment, ParticleSphere, Scene};

/// Initialize WASM panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Check if WebGPU is exposed by the current browser
#[wasm_bindgen]
pub fn check_webgpu_support() -> bool {
    web_sys::window()
        .map(|window| web::webgpu_available(&window))
        .unwrap_or(false)
}

/// Host-facing handle to a mounted sphere.
///
/// An inert handle (no visual) is returned when the sphere could not or
/// should not start; every method is then a no-op.
#[wasm_bindgen]
pub struct ParticleSphereHandle {
    runtime: Option<Rc<web::SphereRuntime>>,
}

#[wasm_bindgen]
impl ParticleSphereHandle {
    /// True if a backend is drawing or ready to draw
    pub fn is_active(&self) -> bool {
        self.runtime.is_some()
    }

    /// True while frames are being scheduled
    pub fn is_running(&self) -> bool {
        self.runtime.as_ref().is_some_and(|rt| rt.is_running())
    }

    /// Name of the active strategy (`"webgpu"` or `"canvas2d"`)
    pub fn backend(&self) -> Option<String> {
        self.runtime
            .as_ref()
            .and_then(|rt| rt.backend_kind())
            .map(|kind| kind.to_string())
    }

    /// Resume after `stop()`
    pub fn start(&self) {
        if let Some(rt) = &self.runtime {
            rt.start();
        }
    }

    /// Pause until `start()`, even while visible
    pub fn stop(&self) {
        if let Some(rt) = &self.runtime {
            rt.stop();
        }
    }

    /// Re-measure the container after a layout change
    pub fn resize(&self) {
        if let Some(rt) = &self.runtime {
            rt.remeasure();
        }
    }

    /// Tear down; the handle becomes inert
    pub fn dispose(&mut self) {
        if let Some(rt) = self.runtime.take() {
            rt.dispose();
        }
    }
}

/// Mount a particle sphere on `canvas`, sized to `container`.
///
/// `options_json` is a partial `SphereConfig` in camelCase. Never throws:
/// failures are logged and yield an inert handle.
#[wasm_bindgen]
pub async fn create_particle_sphere(
    container: web_sys::HtmlElement,
    canvas: web_sys::HtmlCanvasElement,
    options_json: Option<String>,
) -> ParticleSphereHandle {
    match web::SphereRuntime::mount(container, canvas, options_json).await {
        Ok(runtime) => ParticleSphereHandle {
            runtime: Some(runtime),
        },
        Err(err) => {
            if err.is_capability_absence() {
                info!(%err, "particle sphere not started");
            } else {
                warn!(%err, "particle sphere failed to start");
            }
            ParticleSphereHandle { runtime: None }
        }
    }
}
