//! Browser glue
//!
//! Reads capabilities once, picks a rendering strategy, and wires the
//! sphere to `requestAnimationFrame`, an `IntersectionObserver`, pointer
//! events and window resizes. Every closure holds a weak reference to the
//! runtime, so dropping the last handle tears everything down.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::{info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    Event, EventTarget, HtmlCanvasElement, HtmlElement, IntersectionObserver,
    IntersectionObserverEntry, MouseEvent, Window,
};

use crate::backend::canvas2d::Canvas2DBackend;
use crate::backend::{BackendKind, RenderBackend};
use crate::config::{BackendPreference, DEFAULT_LOG_LEVEL, SphereConfig};
use crate::error::{SphereError, SphereResult};
use crate::logging;
use crate::scheduler::{FrameHandle, FrameRequester};
use crate::sphere::{Environment, ParticleSphere};

/// Read reduced-motion and pointer preferences
pub fn read_environment(window: &Window) -> Environment {
    Environment {
        motion_allowed: !media_matches(window, "(prefers-reduced-motion: reduce)"),
        fine_pointer: media_matches(window, "(pointer: fine)"),
    }
}

fn media_matches(window: &Window, query: &str) -> bool {
    window
        .match_media(query)
        .ok()
        .flatten()
        .map(|list| list.matches())
        .unwrap_or(false)
}

/// True if the browser exposes `navigator.gpu`
pub fn webgpu_available(window: &Window) -> bool {
    js_sys::Reflect::get(&window.navigator(), &JsValue::from_str("gpu"))
        .map(|gpu| !gpu.is_undefined() && !gpu.is_null())
        .unwrap_or(false)
}

/// Parse a computed CSS length such as `"12.5px"`
fn parse_px(value: &str) -> f32 {
    value
        .trim()
        .trim_end_matches("px")
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Computed padding as `[left, top, right, bottom]` in CSS pixels
fn padding(window: &Window, element: &HtmlElement) -> [f32; 4] {
    let Ok(Some(style)) = window.get_computed_style(element) else {
        return [0.0; 4];
    };
    let px = |name: &str| {
        style
            .get_property_value(name)
            .map(|v| parse_px(&v))
            .unwrap_or(0.0)
    };
    [
        px("padding-left"),
        px("padding-top"),
        px("padding-right"),
        px("padding-bottom"),
    ]
}

/// Content-box size of an element in CSS pixels
fn content_box(window: &Window, element: &HtmlElement) -> (f32, f32) {
    let [left, top, right, bottom] = padding(window, element);
    let width = element.client_width() as f32 - left - right;
    let height = element.client_height() as f32 - top - bottom;
    (width.max(0.0), height.max(0.0))
}

/// Client coordinates relative to the top-left of the content box
fn content_offset(
    window: &Window,
    element: &HtmlElement,
    client_x: f64,
    client_y: f64,
) -> (f32, f32) {
    let rect = element.get_bounding_client_rect();
    let [left, top, _, _] = padding(window, element);
    let inset_x = element.client_left() as f32 + left;
    let inset_y = element.client_top() as f32 + top;
    inset_offset(
        (client_x - rect.left()) as f32,
        (client_y - rect.top()) as f32,
        inset_x,
        inset_y,
    )
}

/// Shift a border-box offset by the border and padding in front of the content
fn inset_offset(x: f32, y: f32, inset_x: f32, inset_y: f32) -> (f32, f32) {
    (x - inset_x, y - inset_y)
}

/// `requestAnimationFrame` with a single reusable callback.
///
/// Handles are generation numbers, not browser ids. The browser runs
/// callbacks in request order, so the oldest outstanding request is the one
/// firing.
pub struct AnimationFrames {
    window: Window,
    callback: RefCell<Option<Closure<dyn FnMut(f64)>>>,
    generation: Cell<i32>,
    outstanding: RefCell<VecDeque<(FrameHandle, i32)>>,
}

impl AnimationFrames {
    fn new(window: Window) -> Self {
        Self {
            window,
            callback: RefCell::new(None),
            generation: Cell::new(0),
            outstanding: RefCell::new(VecDeque::new()),
        }
    }

    fn set_callback(&self, callback: Closure<dyn FnMut(f64)>) {
        *self.callback.borrow_mut() = Some(callback);
    }

    /// Handle of the request whose callback is running now
    fn take_fired(&self) -> Option<FrameHandle> {
        self.outstanding
            .borrow_mut()
            .pop_front()
            .map(|(handle, _)| handle)
    }

    fn clear(&self) {
        for (_, id) in self.outstanding.borrow_mut().drain(..) {
            self.window.cancel_animation_frame(id).ok();
        }
        self.callback.borrow_mut().take();
    }
}

impl FrameRequester for AnimationFrames {
    fn request_frame(&self) -> SphereResult<FrameHandle> {
        let callback = self.callback.borrow();
        let Some(callback) = callback.as_ref() else {
            return Err(SphereError::Scheduling(
                "frame callback not installed".to_string(),
            ));
        };

        let id = self
            .window
            .request_animation_frame(callback.as_ref().unchecked_ref())
            .map_err(|e| SphereError::Scheduling(format!("{:?}", e)))?;

        let handle = FrameHandle(self.generation.get().wrapping_add(1));
        self.generation.set(handle.0);
        self.outstanding.borrow_mut().push_back((handle, id));
        Ok(handle)
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        let mut outstanding = self.outstanding.borrow_mut();
        if let Some(index) = outstanding.iter().position(|(h, _)| *h == handle) {
            if let Some((_, id)) = outstanding.remove(index) {
                self.window.cancel_animation_frame(id).ok();
            }
        }
    }
}

/// A DOM listener kept alive until dispose
struct Listener {
    target: EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

type IntersectionCallback = Closure<dyn FnMut(js_sys::Array, IntersectionObserver)>;

/// A mounted sphere and its browser bindings
pub struct SphereRuntime {
    sphere: RefCell<ParticleSphere>,
    frames: AnimationFrames,
    window: Window,
    container: HtmlElement,
    listeners: RefCell<Vec<Listener>>,
    observer: RefCell<Option<(IntersectionObserver, IntersectionCallback)>>,
}

impl SphereRuntime {
    /// Build the scene, start a backend on `canvas` and wire up the page.
    ///
    /// Errors mean "no visual"; nothing stays attached to the page.
    pub async fn mount(
        container: HtmlElement,
        canvas: HtmlCanvasElement,
        options_json: Option<String>,
    ) -> SphereResult<Rc<Self>> {
        let window =
            web_sys::window().ok_or_else(|| SphereError::MissingElement("window".to_string()))?;
        let env = read_environment(&window);

        let config = match SphereConfig::from_json(env.tier(), options_json.as_deref().unwrap_or(""))
        {
            Ok(config) => config,
            Err(err) => {
                logging::init(DEFAULT_LOG_LEVEL);
                return Err(err);
            }
        };
        logging::init(&config.log_level);

        let mut sphere = ParticleSphere::new(config, env)?;
        let (width, height) = content_box(&window, &container);
        sphere.resize(width, height, window.device_pixel_ratio() as f32);

        let backend = select_backend(&window, canvas, &sphere).await?;

        let runtime = Rc::new(Self {
            sphere: RefCell::new(sphere),
            frames: AnimationFrames::new(window.clone()),
            window,
            container,
            listeners: RefCell::new(Vec::new()),
            observer: RefCell::new(None),
        });

        runtime.install_frame_callback();
        if let Err(err) = runtime.wire(backend, env.fine_pointer) {
            runtime.dispose();
            return Err(err);
        }
        Ok(runtime)
    }

    fn wire(self: &Rc<Self>, backend: Box<dyn RenderBackend>, fine_pointer: bool) -> SphereResult<()> {
        self.sphere
            .borrow_mut()
            .attach_backend(backend, &self.frames)?;
        self.observe_visibility()?;
        if fine_pointer {
            self.listen_pointer()?;
        }
        self.listen(
            self.window.clone().into(),
            "resize",
            Rc::downgrade(self),
            |runtime, _| runtime.remeasure(),
        )
    }

    fn install_frame_callback(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let callback = Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
            let Some(runtime) = weak.upgrade() else {
                return;
            };
            let Some(fired) = runtime.frames.take_fired() else {
                return;
            };
            let Ok(mut sphere) = runtime.sphere.try_borrow_mut() else {
                return;
            };
            if let Err(err) = sphere.on_animation_frame(fired, timestamp, &runtime.frames) {
                warn!(%err, "frame loop stopped");
            }
        });
        self.frames.set_callback(callback);
    }

    fn observe_visibility(self: &Rc<Self>) -> SphereResult<()> {
        let weak = Rc::downgrade(self);
        let callback: IntersectionCallback = Closure::new(
            move |entries: js_sys::Array, _observer: IntersectionObserver| {
                let Some(runtime) = weak.upgrade() else {
                    return;
                };
                // Only the latest entry reflects the current state
                let visible = entries
                    .iter()
                    .filter_map(|entry| entry.dyn_into::<IntersectionObserverEntry>().ok())
                    .last()
                    .map(|entry| entry.is_intersecting());
                if let Some(visible) = visible {
                    runtime.set_visible(visible);
                }
            },
        );

        let observer = IntersectionObserver::new(callback.as_ref().unchecked_ref())
            .map_err(|e| SphereError::Context(format!("Failed to observe visibility: {:?}", e)))?;
        observer.observe(&self.container);
        *self.observer.borrow_mut() = Some((observer, callback));
        Ok(())
    }

    fn listen_pointer(self: &Rc<Self>) -> SphereResult<()> {
        let target: EventTarget = self.container.clone().into();

        self.listen(target.clone(), "pointermove", Rc::downgrade(self), |runtime, event| {
            let Some(event) = event.dyn_ref::<MouseEvent>() else {
                return;
            };
            let (x, y) = content_offset(
                &runtime.window,
                &runtime.container,
                event.client_x() as f64,
                event.client_y() as f64,
            );
            if let Ok(mut sphere) = runtime.sphere.try_borrow_mut() {
                sphere.pointer_moved(x, y);
            }
        })?;

        self.listen(target, "pointerleave", Rc::downgrade(self), |runtime, _| {
            if let Ok(mut sphere) = runtime.sphere.try_borrow_mut() {
                sphere.pointer_left();
            }
        })
    }

    fn listen(
        &self,
        target: EventTarget,
        event: &'static str,
        weak: Weak<Self>,
        handler: impl Fn(&SphereRuntime, &Event) + 'static,
    ) -> SphereResult<()> {
        let closure = Closure::<dyn FnMut(Event)>::new(move |e: Event| {
            if let Some(runtime) = weak.upgrade() {
                handler(&runtime, &e);
            }
        });

        target
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
            .map_err(|e| SphereError::Context(format!("Failed to listen for {}: {:?}", event, e)))?;
        self.listeners.borrow_mut().push(Listener {
            target,
            event,
            closure,
        });
        Ok(())
    }

    fn set_visible(&self, visible: bool) {
        let Ok(mut sphere) = self.sphere.try_borrow_mut() else {
            return;
        };
        if let Err(err) = sphere.set_visible(visible, &self.frames) {
            warn!(%err, visible, "visibility change ignored");
        }
    }

    /// Re-read the container size and device pixel ratio
    pub fn remeasure(&self) {
        let (width, height) = content_box(&self.window, &self.container);
        if let Ok(mut sphere) = self.sphere.try_borrow_mut() {
            sphere.resize(width, height, self.window.device_pixel_ratio() as f32);
        }
    }

    pub fn is_running(&self) -> bool {
        self.sphere
            .try_borrow()
            .map(|sphere| sphere.scheduler().is_running())
            .unwrap_or(false)
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.sphere
            .try_borrow()
            .ok()
            .and_then(|sphere| sphere.backend_kind())
    }

    pub fn start(&self) {
        if let Ok(mut sphere) = self.sphere.try_borrow_mut() {
            if let Err(err) = sphere.start(&self.frames) {
                warn!(%err, "start ignored");
            }
        }
    }

    pub fn stop(&self) {
        if let Ok(mut sphere) = self.sphere.try_borrow_mut() {
            if let Err(err) = sphere.stop(&self.frames) {
                warn!(%err, "stop ignored");
            }
        }
    }

    /// Cancel the loop, release the backend and detach from the page
    pub fn dispose(&self) {
        if let Ok(mut sphere) = self.sphere.try_borrow_mut() {
            sphere.dispose(&self.frames);
        }
        if let Some((observer, _callback)) = self.observer.borrow_mut().take() {
            observer.disconnect();
        }
        for listener in self.listeners.borrow_mut().drain(..) {
            listener
                .target
                .remove_event_listener_with_callback(
                    listener.event,
                    listener.closure.as_ref().unchecked_ref(),
                )
                .ok();
        }
        self.frames.clear();
    }
}

impl Drop for SphereRuntime {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Pick and initialize a strategy according to the backend preference
async fn select_backend(
    window: &Window,
    canvas: HtmlCanvasElement,
    sphere: &ParticleSphere,
) -> SphereResult<Box<dyn RenderBackend>> {
    let preference = sphere.config().backend;

    #[cfg(all(feature = "webgpu", target_arch = "wasm32"))]
    let canvas = {
        use crate::backend::webgpu::WebGpuBackend;

        let mut canvas = canvas;
        if preference != BackendPreference::Canvas2d {
            if webgpu_available(window) {
                match WebGpuBackend::initialize(
                    canvas.clone(),
                    sphere.config(),
                    sphere.scene(),
                    sphere.projection(),
                )
                .await
                {
                    Ok(backend) => return Ok(Box::new(backend)),
                    Err(err) if preference == BackendPreference::WebGpu => return Err(err),
                    Err(err) => {
                        warn!(%err, "WebGPU failed, falling back to Canvas 2D");
                        canvas = fresh_canvas(&canvas)?;
                    }
                }
            } else if preference == BackendPreference::WebGpu {
                return Err(SphereError::BackendUnavailable(
                    "navigator.gpu is missing".to_string(),
                ));
            } else {
                info!("WebGPU unavailable, using Canvas 2D");
            }
        }
        canvas
    };

    #[cfg(not(all(feature = "webgpu", target_arch = "wasm32")))]
    {
        let _ = window;
        if preference == BackendPreference::WebGpu {
            return Err(SphereError::BackendUnavailable(
                "built without WebGPU support".to_string(),
            ));
        }
    }

    let backend = Canvas2DBackend::initialize(canvas, sphere.config())?;
    info!("Canvas 2D backend ready");
    Ok(Box::new(backend))
}

/// Swap the canvas for an identical one without a rendering context.
///
/// A canvas keeps the first context type it hands out.
#[cfg_attr(not(all(feature = "webgpu", target_arch = "wasm32")), allow(dead_code))]
fn fresh_canvas(canvas: &HtmlCanvasElement) -> SphereResult<HtmlCanvasElement> {
    let clone = canvas
        .clone_node()
        .map_err(|e| SphereError::Context(format!("Failed to clone canvas: {:?}", e)))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| SphereError::Context("clone is not a canvas".to_string()))?;
    canvas
        .replace_with_with_node_1(&clone)
        .map_err(|e| SphereError::Context(format!("Failed to replace canvas: {:?}", e)))?;
    Ok(clone)
}
