//! WGSL shaders and GPU-side data layouts for the WebGPU strategy
//!
//! Three pipelines share one uniform block: a glow shell behind the sphere,
//! connection lines, and instanced point quads. Animation constants are
//! spliced in from [`crate::shimmer`] so the GPU shimmer matches the CPU one.
//!
//! The GPU evaluates [`crate::shimmer::shimmer`] per fragment without
//! quantizing, so its alpha is within half an [`crate::shimmer::AlphaTable`]
//! step of what the Canvas 2D strategy draws for the same time and phase.

use bytemuck::{Pod, Zeroable};

use crate::config::SphereConfig;
use crate::geometry::ParticleField;
use crate::shimmer::{GLOW_BASE_ALPHA, GLOW_PULSE_ALPHA, GLOW_PULSE_RATE, SHIMMER_RATE};
use crate::transform::{ProjectionConfig, RotationState, model_matrix, view_projection_matrix};

/// Uniform block shared by every pipeline.
///
/// Layout matches `SceneUniforms` in WGSL (176 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneUniforms {
    /// Sphere rotation (column-major)
    pub model: [f32; 16],
    /// Camera view and projection (column-major)
    pub view_proj: [f32; 16],
    /// Particle color, normalized RGBA
    pub color: [f32; 4],
    /// Drawing surface size in device pixels
    pub viewport: [f32; 2],
    /// Seconds since the first frame
    pub time: f32,
    pub pixel_ratio: f32,
    /// Point radius in CSS pixels at unit scale
    pub point_size: f32,
    pub min_point_radius: f32,
    /// Distance from the camera to the sphere center
    pub camera_distance: f32,
    pub edge_alpha: f32,
}

impl SceneUniforms {
    pub fn new(config: &SphereConfig, projection: &ProjectionConfig, sphere_radius: f32) -> Self {
        let (w, h) = projection.pixel_size();
        Self {
            model: model_matrix(RotationState::default()),
            view_proj: view_projection_matrix(projection, sphere_radius),
            color: config.color_rgba(1.0),
            viewport: [w.max(1.0), h.max(1.0)],
            time: 0.0,
            pixel_ratio: projection.pixel_ratio,
            point_size: config.point_size,
            min_point_radius: config.min_point_radius,
            camera_distance: projection.fov,
            edge_alpha: config.edge_alpha,
        }
    }

    /// Per-frame update: only rotation and time change between frames
    pub fn advance(&mut self, rotation: RotationState, elapsed: f32) {
        self.model = model_matrix(rotation);
        self.time = elapsed;
    }

    /// Adopt a new viewport
    pub fn set_viewport(&mut self, projection: &ProjectionConfig, sphere_radius: f32) {
        let (w, h) = projection.pixel_size();
        self.view_proj = view_projection_matrix(projection, sphere_radius);
        self.viewport = [w.max(1.0), h.max(1.0)];
        self.pixel_ratio = projection.pixel_ratio;
    }
}

/// One particle as uploaded to the GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 3],
    pub phase: f32,
}

impl ParticleVertex {
    /// Convert a field into vertex data, in index order
    pub fn from_field(field: &ParticleField) -> Vec<Self> {
        field
            .points()
            .iter()
            .map(|p| Self {
                position: p.position,
                phase: p.phase,
            })
            .collect()
    }
}

/// Corners of the unit quad each point is drawn on (two triangles)
pub const QUAD_CORNERS: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

/// Uniform block declaration used by all shaders
pub const SCENE_UNIFORMS: &str = r#"
struct SceneUniforms {
    model: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    color: vec4<f32>,
    viewport: vec2<f32>,
    time: f32,
    pixel_ratio: f32,
    point_size: f32,
    min_point_radius: f32,
    camera_distance: f32,
    edge_alpha: f32,
}

@group(0) @binding(0) var<uniform> scene: SceneUniforms;
"#;

/// Point vertex shader: one camera-facing quad per particle instance.
///
/// The quad radius reproduces the Canvas 2D point radius, using `clip.w` as
/// the perspective denominator.
pub const POINT_VERTEX_SHADER: &str = r#"
struct ParticleInstance {
    @location(1) position: vec3<f32>,
    @location(2) phase: f32,
}

struct PointOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) corner: vec2<f32>,
    @location(1) @interpolate(flat) phase: f32,
}

@vertex
fn vs_point(
    @location(0) corner: vec2<f32>,
    instance: ParticleInstance,
) -> PointOutput {
    var out: PointOutput;

    let world = scene.model * vec4<f32>(instance.position, 1.0);
    let clip = scene.view_proj * world;

    let scale = scene.camera_distance / clip.w;
    let radius_px = max(scene.point_size * scale, scene.min_point_radius) * scene.pixel_ratio;
    let offset = corner * radius_px * 2.0 / scene.viewport;

    out.clip_position = vec4<f32>(clip.xy + offset * clip.w, clip.zw);
    out.corner = corner;
    out.phase = instance.phase;
    return out;
}
"#;

/// Point fragment shader: a flat disc with shimmer alpha
pub const POINT_FRAGMENT_SHADER: &str = r#"
@fragment
fn fs_point(in: PointOutput) -> @location(0) vec4<f32> {
    if (length(in.corner) > 1.0) {
        discard;
    }
    let alpha = 0.5 + 0.5 * sin(scene.time * SHIMMER_RATE + in.phase);
    return vec4<f32>(scene.color.rgb, alpha);
}
"#;

/// Edge shaders: particle positions indexed as a line list
pub const EDGE_SHADER: &str = r#"
@vertex
fn vs_edge(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return scene.view_proj * scene.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_edge() -> @location(0) vec4<f32> {
    return vec4<f32>(scene.color.rgb, scene.edge_alpha);
}
"#;

/// Glow shell shaders.
///
/// Only the far half of the shell is kept. Its alpha peaks where the view
/// ray hits it head-on and fades to zero at the silhouette, which gives the
/// same falloff as the Canvas 2D radial gradient.
pub const SHELL_SHADER: &str = r#"
struct ShellOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) world_position: vec3<f32>,
}

@vertex
fn vs_shell(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
) -> ShellOutput {
    var out: ShellOutput;
    let world = scene.model * vec4<f32>(position, 1.0);
    out.clip_position = scene.view_proj * world;
    out.world_normal = (scene.model * vec4<f32>(normal, 0.0)).xyz;
    out.world_position = world.xyz;
    return out;
}

@fragment
fn fs_shell(in: ShellOutput) -> @location(0) vec4<f32> {
    let camera_pos = vec3<f32>(0.0, 0.0, scene.camera_distance);
    let view_dir = normalize(camera_pos - in.world_position);
    let facing = dot(normalize(in.world_normal), view_dir);
    if (facing > 0.0) {
        discard;
    }

    let glow = GLOW_BASE_ALPHA + GLOW_PULSE_ALPHA * sin(scene.time * GLOW_PULSE_RATE);
    return vec4<f32>(scene.color.rgb, glow * -facing);
}
"#;

/// Animation constants as WGSL declarations
pub fn constants() -> String {
    format!(
        "const SHIMMER_RATE: f32 = {:?};\n\
         const GLOW_BASE_ALPHA: f32 = {:?};\n\
         const GLOW_PULSE_ALPHA: f32 = {:?};\n\
         const GLOW_PULSE_RATE: f32 = {:?};\n",
        SHIMMER_RATE, GLOW_BASE_ALPHA, GLOW_PULSE_ALPHA, GLOW_PULSE_RATE
    )
}

/// Get the complete point shader source
pub fn point_shader() -> String {
    format!(
        "{}\n{}\n{}\n{}",
        constants(),
        SCENE_UNIFORMS,
        POINT_VERTEX_SHADER,
        POINT_FRAGMENT_SHADER
    )
}

/// Get the complete edge shader source
pub fn edge_shader() -> String {
    format!("{}\n{}", SCENE_UNIFORMS, EDGE_SHADER)
}

/// Get the complete glow shell shader source
pub fn shell_shader() -> String {
    format!("{}\n{}\n{}", constants(), SCENE_UNIFORMS, SHELL_SHADER)
}
