//! Sphere configuration
//!
//! The host page passes a partial JSON object; missing keys fall back to the
//! defaults of the detected device tier.

use serde::{Deserialize, Serialize};

use crate::error::{SphereError, SphereResult};

/// Largest particle count accepted (graph construction is quadratic)
pub const MAX_PARTICLES: usize = 5_000;

/// Upper bound for pointer sensitivity (radians per unit of pointer offset)
pub const MAX_POINTER_SENSITIVITY: f32 = 0.3;

/// Log filter used when the config does not name one
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Device capability tier, decided once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    /// Coarse pointer or low-power device
    Compact,
    /// Fine pointer, desktop-class device
    Full,
}

/// Which rendering strategy the host wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Probe WebGPU, fall back to Canvas 2D
    #[default]
    Auto,
    /// WebGPU only; no visual if it fails
    WebGpu,
    /// Canvas 2D only
    Canvas2d,
}

/// Construction parameters for a particle sphere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SphereConfig {
    /// Number of points on the sphere
    pub particle_count: usize,
    /// Maximum number of rendered edges
    pub connection_cap: usize,
    /// Sphere radius in world units
    pub sphere_radius: f32,
    /// Two points closer than this are connected
    pub connection_distance: f32,
    /// Perspective strength (camera distance in world units)
    pub fov: f32,
    /// Fraction of the remaining pointer offset applied each frame
    pub rotation_smoothing: f32,
    /// Rotation produced by a pointer at the container edge
    pub pointer_sensitivity: f32,
    /// Idle spin around the Y axis, radians per second
    pub auto_rotate_speed: f32,
    /// Point radius in CSS pixels at unit perspective scale
    pub point_size: f32,
    /// Smallest drawn point radius in CSS pixels
    pub min_point_radius: f32,
    /// Particle color (sRGB)
    pub color: [u8; 3],
    /// Opacity of connection lines
    pub edge_alpha: f32,
    /// Seed for the shimmer phase field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Rendering strategy
    pub backend: BackendPreference,
    /// `tracing` filter directive
    pub log_level: String,
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self::for_tier(DeviceTier::Full)
    }
}

impl SphereConfig {
    /// Defaults for a device tier
    pub fn for_tier(tier: DeviceTier) -> Self {
        let (particle_count, connection_cap) = match tier {
            DeviceTier::Compact => (300, 300),
            DeviceTier::Full => (800, 900),
        };

        Self {
            particle_count,
            connection_cap,
            sphere_radius: 1.6,
            connection_distance: 0.35,
            fov: 4.0,
            rotation_smoothing: 0.05,
            pointer_sensitivity: MAX_POINTER_SENSITIVITY,
            auto_rotate_speed: 0.1,
            point_size: 2.2,
            min_point_radius: 0.6,
            color: [100, 255, 218],
            edge_alpha: 0.08,
            seed: None,
            backend: BackendPreference::Auto,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Overlay a partial JSON object onto the tier defaults and validate.
    ///
    /// An empty string yields the tier defaults. Unknown keys are rejected.
    pub fn from_json(tier: DeviceTier, json: &str) -> SphereResult<Self> {
        let base = Self::for_tier(tier);
        if json.trim().is_empty() {
            return Ok(base);
        }

        let overrides: serde_json::Value =
            serde_json::from_str(json).map_err(|e| SphereError::InvalidConfig(e.to_string()))?;
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(SphereError::InvalidConfig(
                "options must be a JSON object".to_string(),
            ));
        };

        let serde_json::Value::Object(mut merged) =
            serde_json::to_value(&base).map_err(|e| SphereError::InvalidConfig(e.to_string()))?
        else {
            return Err(SphereError::InvalidConfig(
                "defaults did not serialize to an object".to_string(),
            ));
        };
        merged.extend(overrides);

        let config: Self = serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(|e| SphereError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges the renderer relies on
    pub fn validate(&self) -> SphereResult<()> {
        fn reject(msg: &str) -> SphereResult<()> {
            Err(SphereError::InvalidConfig(msg.to_string()))
        }

        if self.particle_count < 2 || self.particle_count > MAX_PARTICLES {
            return reject("particleCount must be between 2 and 5000");
        }
        if !(self.sphere_radius.is_finite() && self.sphere_radius > 0.0) {
            return reject("sphereRadius must be positive");
        }
        if !(self.connection_distance.is_finite() && self.connection_distance > 0.0) {
            return reject("connectionDistance must be positive");
        }
        // Keeps the perspective denominator positive for every point
        if !(self.fov.is_finite() && self.fov > self.sphere_radius) {
            return reject("fov must exceed sphereRadius");
        }
        if !(self.rotation_smoothing > 0.0 && self.rotation_smoothing <= 1.0) {
            return reject("rotationSmoothing must be in (0, 1]");
        }
        if !(0.0..=MAX_POINTER_SENSITIVITY).contains(&self.pointer_sensitivity) {
            return reject("pointerSensitivity must be in [0, 0.3]");
        }
        if !self.auto_rotate_speed.is_finite() {
            return reject("autoRotateSpeed must be finite");
        }
        if !(self.point_size.is_finite() && self.point_size > 0.0) {
            return reject("pointSize must be positive");
        }
        if !(self.min_point_radius.is_finite() && self.min_point_radius >= 0.0) {
            return reject("minPointRadius must not be negative");
        }
        if !(0.0..=1.0).contains(&self.edge_alpha) {
            return reject("edgeAlpha must be in [0, 1]");
        }
        Ok(())
    }

    /// Set the particle count
    pub fn with_particle_count(mut self, count: usize) -> Self {
        self.particle_count = count;
        self
    }

    /// Set the edge threshold and cap
    pub fn with_connections(mut self, distance: f32, cap: usize) -> Self {
        self.connection_distance = distance;
        self.connection_cap = cap;
        self
    }

    /// Fix the phase seed for reproducible output
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Force a rendering strategy
    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    /// Particle color as normalized RGBA
    pub fn color_rgba(&self, alpha: f32) -> [f32; 4] {
        [
            self.color[0] as f32 / 255.0,
            self.color[1] as f32 / 255.0,
            self.color[2] as f32 / 255.0,
            alpha,
        ]
    }

    /// Particle color as a CSS `rgba()` string
    pub fn css_rgba(&self, alpha: f32) -> String {
        format!(
            "rgba({}, {}, {}, {:.3})",
            self.color[0], self.color[1], self.color[2], alpha
        )
    }
}
