//! Rotation and perspective projection
//!
//! The Canvas 2D strategy projects every point on the CPU each frame into a
//! [`FrameBuffer`]. The WebGPU strategy builds the equivalent model and
//! view-projection matrices instead; both produce the same pixel position for
//! the same point (see the parity tests below).

use crate::geometry::ParticleField;

/// Fraction of half the smaller viewport dimension covered by the sphere
/// silhouette at unit perspective scale
pub const SPHERE_FILL: f32 = 0.8;

/// Perspective denominators at or below this are treated as behind the eye
const MIN_DEPTH: f32 = 1e-4;

/// Sphere orientation in radians. `y` is applied first, then `x`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationState {
    pub x: f32,
    pub y: f32,
}

impl RotationState {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Rotate a local position, Y axis first, then X axis
    pub fn rotate(&self, p: [f32; 3]) -> [f32; 3] {
        let (sin_y, cos_y) = self.y.sin_cos();
        let (sin_x, cos_x) = self.x.sin_cos();

        let x1 = p[0] * cos_y + p[2] * sin_y;
        let z1 = -p[0] * sin_y + p[2] * cos_y;

        let y2 = p[1] * cos_x - z1 * sin_x;
        let z2 = p[1] * sin_x + z1 * cos_x;

        [x1, y2, z2]
    }
}

/// Viewport and perspective settings, recomputed on resize
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionConfig {
    /// Perspective strength (camera distance in world units)
    pub fov: f32,
    /// Content-box width in CSS pixels
    pub width: f32,
    /// Content-box height in CSS pixels
    pub height: f32,
    /// Device pixels per CSS pixel
    pub pixel_ratio: f32,
}

impl ProjectionConfig {
    pub fn new(fov: f32, width: f32, height: f32, pixel_ratio: f32) -> Self {
        Self {
            fov,
            width: width.max(0.0),
            height: height.max(0.0),
            pixel_ratio: if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
        }
    }

    /// Drawing-surface size in device pixels
    pub fn pixel_size(&self) -> (f32, f32) {
        (
            (self.width * self.pixel_ratio).round(),
            (self.height * self.pixel_ratio).round(),
        )
    }

    /// Center of the drawing surface in device pixels
    pub fn center(&self) -> (f32, f32) {
        let (w, h) = self.pixel_size();
        (w / 2.0, h / 2.0)
    }

    /// Device pixels per world unit at unit perspective scale
    pub fn projection_radius(&self, sphere_radius: f32) -> f32 {
        let (w, h) = self.pixel_size();
        if sphere_radius <= 0.0 {
            return 0.0;
        }
        w.min(h) * 0.5 * SPHERE_FILL / sphere_radius
    }

    /// True if there is nothing to draw into
    pub fn is_degenerate(&self) -> bool {
        let (w, h) = self.pixel_size();
        w < 1.0 || h < 1.0
    }
}

/// One point after rotation and projection
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProjectedPoint {
    pub screen_x: f32,
    pub screen_y: f32,
    /// Rotated z; negative is nearer the viewer
    pub depth: f32,
    /// Perspective scale; zero when the point cannot be projected
    pub scale: f32,
}

impl ProjectedPoint {
    pub fn is_visible(&self) -> bool {
        self.scale > 0.0
    }
}

/// Project a single local position
pub fn project_point(
    position: [f32; 3],
    rotation: RotationState,
    projection: &ProjectionConfig,
    projection_radius: f32,
) -> ProjectedPoint {
    let [x, y, z] = rotation.rotate(position);
    let (cx, cy) = projection.center();

    let denom = projection.fov + z;
    if !denom.is_finite() || denom <= MIN_DEPTH {
        return ProjectedPoint {
            screen_x: cx,
            screen_y: cy,
            depth: z,
            scale: 0.0,
        };
    }

    let scale = projection.fov / denom;
    ProjectedPoint {
        screen_x: cx + x * projection_radius * scale,
        screen_y: cy - y * projection_radius * scale,
        depth: z,
        scale,
    }
}

/// Per-frame projected positions, rebuilt from scratch every frame
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    points: Vec<ProjectedPoint>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every point for the given rotation and viewport
    pub fn project(
        &mut self,
        field: &ParticleField,
        rotation: RotationState,
        projection: &ProjectionConfig,
    ) {
        let radius = projection.projection_radius(field.radius());
        self.points.clear();
        self.points.extend(
            field
                .points()
                .iter()
                .map(|p| project_point(p.position, rotation, projection, radius)),
        );
    }

    pub fn points(&self) -> &[ProjectedPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&ProjectedPoint> {
        self.points.get(index)
    }
}

// Matrices for the GPU path (4x4, column-major)

/// Flip z so that the camera on +z sees what the CPU projection shows
const DEPTH_FLIP: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, -1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Model matrix matching [`RotationState::rotate`]
pub fn model_matrix(rotation: RotationState) -> [f32; 16] {
    mat4_multiply(
        DEPTH_FLIP,
        mat4_multiply(rotation_x(rotation.x), rotation_y(rotation.y)),
    )
}

/// View-projection matrix for a camera `fov` units from the origin whose
/// pinhole projection reproduces [`project_point`]
pub fn view_projection_matrix(projection: &ProjectionConfig, sphere_radius: f32) -> [f32; 16] {
    let (w, h) = projection.pixel_size();
    let (w, h) = (w.max(1.0), h.max(1.0));
    let distance = projection.fov;

    // focal * h / 2 must equal projection_radius * fov
    let focal = 2.0 * projection.projection_radius(sphere_radius).max(MIN_DEPTH) * distance / h;
    let fov_y = 2.0 * (1.0 / focal).atan();

    let view = look_at([0.0, 0.0, distance], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
    let proj = perspective(fov_y, w / h, 0.01, distance + sphere_radius * 4.0);
    mat4_multiply(proj, view)
}

fn rotation_y(angle: f32) -> [f32; 16] {
    let (s, c) = angle.sin_cos();
    [
        c, 0.0, -s, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        s, 0.0, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

fn rotation_x(angle: f32) -> [f32; 16] {
    let (s, c) = angle.sin_cos();
    [
        1.0, 0.0, 0.0, 0.0, //
        0.0, c, s, 0.0, //
        0.0, -s, c, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = dot(v, v).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        v
    }
}

/// Right-handed look-at view matrix
fn look_at(eye: [f32; 3], target: [f32; 3], up: [f32; 3]) -> [f32; 16] {
    let f = normalize(sub(target, eye));
    let s = normalize(cross(f, up));
    let u = cross(s, f);

    [
        s[0], u[0], -f[0], 0.0, //
        s[1], u[1], -f[1], 0.0, //
        s[2], u[2], -f[2], 0.0, //
        -dot(s, eye), -dot(u, eye), dot(f, eye), 1.0,
    ]
}

/// Perspective projection with a [0, 1] depth range (WebGPU clip space)
fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> [f32; 16] {
    let f = 1.0 / (fov_y / 2.0).tan();
    let range = 1.0 / (near - far);

    [
        f / aspect, 0.0, 0.0, 0.0, //
        0.0, f, 0.0, 0.0, //
        0.0, 0.0, far * range, -1.0, //
        0.0, 0.0, near * far * range, 0.0,
    ]
}

fn mat4_multiply(a: [f32; 16], b: [f32; 16]) -> [f32; 16] {
    let mut result = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            result[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
        }
    }
    result
}

/// Apply a column-major matrix to a homogeneous vector
pub fn transform_vec4(m: &[f32; 16], v: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0f32; 4];
    for (row, slot) in out.iter_mut().enumerate() {
        *slot = (0..4).map(|k| m[k * 4 + row] * v[k]).sum();
    }
    out
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, TAU};

    use super::*;

    fn viewport() -> ProjectionConfig {
        ProjectionConfig::new(4.0, 800.0, 600.0, 2.0)
    }

    fn close(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn identity_rotation_projects_to_center_offset() {
        let proj = viewport();
        let radius = proj.projection_radius(1.6);
        let p = project_point([1.6, 0.0, 0.0], RotationState::default(), &proj, radius);

        let (cx, cy) = proj.center();
        assert!(close(p.scale, 1.0, 1e-6));
        assert!(close(p.screen_x, cx + 1.6 * radius, 1e-3));
        assert!(close(p.screen_y, cy, 1e-3));
    }

    #[test]
    fn y_axis_is_flipped_for_screen() {
        let proj = viewport();
        let radius = proj.projection_radius(1.0);
        let p = project_point([0.0, 1.0, 0.0], RotationState::default(), &proj, radius);
        assert!(p.screen_y < proj.center().1);
    }

    #[test]
    fn nearer_points_scale_up() {
        let proj = viewport();
        let radius = proj.projection_radius(1.0);
        let near = project_point([0.0, 0.0, -1.0], RotationState::default(), &proj, radius);
        let far = project_point([0.0, 0.0, 1.0], RotationState::default(), &proj, radius);
        assert!(near.scale > 1.0);
        assert!(far.scale < 1.0);
    }

    #[test]
    fn rotation_order_is_y_then_x() {
        // Y by 90° moves +x onto -z; X by 90° then moves -z onto +y.
        let r = RotationState::new(FRAC_PI_2, FRAC_PI_2).rotate([1.0, 0.0, 0.0]);
        assert!(close(r[0], 0.0, 1e-6));
        assert!(close(r[1], 1.0, 1e-6));
        assert!(close(r[2], 0.0, 1e-6));
    }

    #[test]
    fn full_turn_is_periodic() {
        let proj = viewport();
        let field = ParticleField::generate(64, 1.6, 5);
        let base = RotationState::new(0.3, 1.1);

        let mut a = FrameBuffer::new();
        a.project(&field, base, &proj);

        for turned in [
            RotationState::new(base.x + TAU, base.y),
            RotationState::new(base.x, base.y + TAU),
        ] {
            let mut b = FrameBuffer::new();
            b.project(&field, turned, &proj);
            for (pa, pb) in a.points().iter().zip(b.points()) {
                assert!(close(pa.screen_x, pb.screen_x, 1e-2));
                assert!(close(pa.screen_y, pb.screen_y, 1e-2));
            }
        }
    }

    #[test]
    fn projection_is_pure() {
        let proj = viewport();
        let field = ParticleField::generate(128, 1.6, 5);
        let rotation = RotationState::new(0.2, 0.7);

        let mut buffer = FrameBuffer::new();
        buffer.project(&field, rotation, &proj);
        let first = buffer.points().to_vec();
        buffer.project(&field, rotation, &proj);

        assert_eq!(first, buffer.points());
    }

    #[test]
    fn frame_buffer_matches_field_length() {
        let proj = viewport();
        let mut buffer = FrameBuffer::new();
        buffer.project(&ParticleField::generate(10, 1.0, 0), RotationState::default(), &proj);
        buffer.project(&ParticleField::generate(4, 1.0, 0), RotationState::default(), &proj);
        assert_eq!(buffer.points().len(), 4);
    }

    #[test]
    fn point_behind_eye_is_hidden() {
        let proj = ProjectionConfig::new(1.0, 100.0, 100.0, 1.0);
        let p = project_point([0.0, 0.0, -2.0], RotationState::default(), &proj, 10.0);
        assert!(!p.is_visible());
        assert!(p.screen_x.is_finite() && p.screen_y.is_finite());
    }

    #[test]
    fn projection_radius_uses_smaller_dimension() {
        let wide = ProjectionConfig::new(4.0, 1000.0, 400.0, 1.0);
        let tall = ProjectionConfig::new(4.0, 400.0, 1000.0, 1.0);
        assert_eq!(wide.projection_radius(1.0), tall.projection_radius(1.0));
        assert!(close(wide.projection_radius(1.0), 160.0, 1e-4));
    }

    #[test]
    fn invalid_pixel_ratio_defaults_to_one() {
        let proj = ProjectionConfig::new(4.0, 100.0, 50.0, 0.0);
        assert_eq!(proj.pixel_size(), (100.0, 50.0));
        assert!(ProjectionConfig::new(4.0, 0.0, 50.0, 1.0).is_degenerate());
    }

    #[test]
    fn model_matrix_matches_cpu_rotation() {
        let rotation = RotationState::new(0.4, -1.3);
        let p = [0.3, -0.8, 1.1];
        let cpu = rotation.rotate(p);
        let gpu = transform_vec4(&model_matrix(rotation), [p[0], p[1], p[2], 1.0]);

        assert!(close(gpu[0], cpu[0], 1e-5));
        assert!(close(gpu[1], cpu[1], 1e-5));
        // Depth is mirrored for the +z camera
        assert!(close(gpu[2], -cpu[2], 1e-5));
    }

    #[test]
    fn gpu_matrices_reproduce_cpu_projection() {
        let proj = viewport();
        let sphere_radius = 1.6;
        let rotation = RotationState::new(0.25, 2.0);
        let field = ParticleField::generate(50, sphere_radius, 0);

        let mut buffer = FrameBuffer::new();
        buffer.project(&field, rotation, &proj);

        let model = model_matrix(rotation);
        let view_proj = view_projection_matrix(&proj, sphere_radius);
        let (w, h) = proj.pixel_size();

        for (point, projected) in field.points().iter().zip(buffer.points()) {
            let p = point.position;
            let world = transform_vec4(&model, [p[0], p[1], p[2], 1.0]);
            let clip = transform_vec4(&view_proj, world);

            let px = (clip[0] / clip[3] + 1.0) * 0.5 * w;
            let py = (1.0 - clip[1] / clip[3]) * 0.5 * h;

            assert!(close(px, projected.screen_x, 0.05), "{} vs {}", px, projected.screen_x);
            assert!(close(py, projected.screen_y, 0.05), "{} vs {}", py, projected.screen_y);
            // Perspective scale parity: clip.w is the CPU denominator
            assert!(close(proj.fov / clip[3], projected.scale, 1e-4));
        }
    }

    #[test]
    fn clip_depth_stays_in_range() {
        let proj = viewport();
        let view_proj = view_projection_matrix(&proj, 1.6);
        for z in [-1.6f32, 0.0, 1.6] {
            let clip = transform_vec4(&view_proj, [0.0, 0.0, z, 1.0]);
            let ndc_z = clip[2] / clip[3];
            assert!((0.0..=1.0).contains(&ndc_z), "ndc z {} for world z {}", ndc_z, z);
        }
    }
}
