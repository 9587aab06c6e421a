//! Canvas 2D strategy
//!
//! Projects the field on the CPU every frame and paints three layers over a
//! cleared surface: a pulsing radial glow, one batched stroke for all edges,
//! then the points with additive compositing so overlaps brighten.

use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::backend::{BackendKind, FrameState, RenderBackend};
use crate::config::SphereConfig;
use crate::error::{SphereError, SphereResult};
use crate::geometry::ParticleField;
use crate::graph::EdgeSet;
use crate::shimmer::{AlphaTable, GLOW_EXTENT, glow_alpha, shimmer};
use crate::transform::{FrameBuffer, ProjectionConfig};

/// Edge line width in CSS pixels
const EDGE_WIDTH: f64 = 0.5;

/// The subset of the 2D canvas API the strategy draws with
pub trait RasterSurface {
    /// Resize the backing store, in device pixels
    fn resize(&mut self, width: u32, height: u32);

    /// Erase the whole surface
    fn clear(&mut self, width: f64, height: f64);

    /// Fill the surface with a radial gradient from `inner` at the center to
    /// `outer` at `radius`
    fn fill_glow(&mut self, cx: f64, cy: f64, radius: f64, inner: &str, outer: &str);

    /// Switch between additive ("lighter") and normal compositing
    fn set_additive(&mut self, additive: bool);

    fn begin_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);

    /// Stroke the current path
    fn stroke(&mut self, style: &str, width: f64);

    /// Fill a circle as its own path
    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, style: &str);
}

/// An HTML canvas and its 2D context
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    width: f64,
    height: f64,
}

impl CanvasSurface {
    /// Acquire the 2D context of a canvas
    pub fn new(canvas: HtmlCanvasElement) -> SphereResult<Self> {
        let ctx = canvas
            .get_context("2d")
            .map_err(|e| SphereError::Context(format!("Failed to get 2d context: {:?}", e)))?
            .ok_or_else(|| SphereError::BackendUnavailable("2d context not available".to_string()))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| SphereError::Context("Failed to cast to CanvasRenderingContext2d".to_string()))?;

        let width = canvas.width() as f64;
        let height = canvas.height() as f64;

        Ok(Self {
            canvas,
            ctx,
            width,
            height,
        })
    }
}

impl RasterSurface for CanvasSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        self.width = width as f64;
        self.height = height as f64;
    }

    fn clear(&mut self, width: f64, height: f64) {
        self.ctx.clear_rect(0.0, 0.0, width, height);
    }

    fn fill_glow(&mut self, cx: f64, cy: f64, radius: f64, inner: &str, outer: &str) {
        let Ok(gradient) = self.ctx.create_radial_gradient(cx, cy, 0.0, cx, cy, radius) else {
            return;
        };
        gradient.add_color_stop(0.0, inner).ok();
        gradient.add_color_stop(1.0, outer).ok();
        self.ctx.set_fill_style_canvas_gradient(&gradient);
        self.ctx.fill_rect(0.0, 0.0, self.width, self.height);
    }

    fn set_additive(&mut self, additive: bool) {
        let op = if additive { "lighter" } else { "source-over" };
        self.ctx.set_global_composite_operation(op).ok();
    }

    fn begin_path(&mut self) {
        self.ctx.begin_path();
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.ctx.move_to(x, y);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.ctx.line_to(x, y);
    }

    fn stroke(&mut self, style: &str, width: f64) {
        self.ctx.set_stroke_style_str(style);
        self.ctx.set_line_width(width);
        self.ctx.stroke();
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, style: &str) {
        self.ctx.begin_path();
        self.ctx
            .arc(x, y, radius, 0.0, std::f64::consts::TAU)
            .ok();
        self.ctx.set_fill_style_str(style);
        self.ctx.fill();
    }
}

/// Software-projected renderer over any [`RasterSurface`]
pub struct Canvas2DBackend<S: RasterSurface> {
    surface: S,
    buffer: FrameBuffer,
    alphas: AlphaTable,
    edge_style: String,
    glow_color: [u8; 3],
    glow_outer: String,
    point_size: f32,
    min_point_radius: f32,
    disposed: bool,
}

impl Canvas2DBackend<CanvasSurface> {
    /// Create the strategy on an HTML canvas
    pub fn initialize(canvas: HtmlCanvasElement, config: &SphereConfig) -> SphereResult<Self> {
        Ok(Self::with_surface(CanvasSurface::new(canvas)?, config))
    }
}

impl<S: RasterSurface> Canvas2DBackend<S> {
    /// Create the strategy on an arbitrary surface
    pub fn with_surface(surface: S, config: &SphereConfig) -> Self {
        Self {
            surface,
            buffer: FrameBuffer::new(),
            alphas: AlphaTable::new(config.color),
            edge_style: config.css_rgba(config.edge_alpha),
            glow_color: config.color,
            glow_outer: config.css_rgba(0.0),
            point_size: config.point_size,
            min_point_radius: config.min_point_radius,
            disposed: false,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Projected positions of the last frame
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    fn draw_glow(&mut self, elapsed: f32, projection: &ProjectionConfig, sphere_radius: f32) {
        let (cx, cy) = projection.center();
        let radius = projection.projection_radius(sphere_radius) * sphere_radius * GLOW_EXTENT;
        let [r, g, b] = self.glow_color;
        let inner = format!("rgba({}, {}, {}, {:.3})", r, g, b, glow_alpha(elapsed));

        self.surface
            .fill_glow(cx as f64, cy as f64, radius as f64, &inner, &self.glow_outer);
    }

    fn draw_edges(&mut self, edges: &EdgeSet, pixel_ratio: f32) {
        if edges.is_empty() {
            return;
        }

        self.surface.begin_path();
        for edge in edges.edges() {
            let (Some(a), Some(b)) = (self.buffer.get(edge.source), self.buffer.get(edge.target))
            else {
                continue;
            };
            if !(a.is_visible() && b.is_visible()) {
                continue;
            }
            self.surface.move_to(a.screen_x as f64, a.screen_y as f64);
            self.surface.line_to(b.screen_x as f64, b.screen_y as f64);
        }
        self.surface
            .stroke(&self.edge_style, EDGE_WIDTH * pixel_ratio as f64);
    }

    fn draw_points(&mut self, field: &ParticleField, elapsed: f32, pixel_ratio: f32) {
        self.surface.set_additive(true);
        for (point, projected) in field.points().iter().zip(self.buffer.points()) {
            if !projected.is_visible() {
                continue;
            }
            let radius = (self.point_size * projected.scale).max(self.min_point_radius) * pixel_ratio;
            let style = self.alphas.style(AlphaTable::index(shimmer(elapsed, point.phase)));
            self.surface.fill_circle(
                projected.screen_x as f64,
                projected.screen_y as f64,
                radius as f64,
                style,
            );
        }
        self.surface.set_additive(false);
    }
}

impl<S: RasterSurface> RenderBackend for Canvas2DBackend<S> {
    fn kind(&self) -> BackendKind {
        BackendKind::Canvas2d
    }

    fn resize(&mut self, projection: &ProjectionConfig) {
        let (w, h) = projection.pixel_size();
        self.surface.resize(w as u32, h as u32);
    }

    fn render_frame(&mut self, frame: &FrameState<'_>) {
        if self.disposed || frame.projection.is_degenerate() {
            return;
        }

        let field = frame.scene.field();
        self.buffer.project(field, frame.rotation, frame.projection);

        let (w, h) = frame.projection.pixel_size();
        self.surface.clear(w as f64, h as f64);
        self.draw_glow(frame.elapsed, frame.projection, field.radius());
        self.draw_edges(frame.scene.edges(), frame.projection.pixel_ratio);
        self.draw_points(field, frame.elapsed, frame.projection.pixel_ratio);
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}
