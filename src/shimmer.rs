//! Time-based alpha animation shared by both rendering strategies
//!
//! The WebGPU fragment shader evaluates the same expressions with the same
//! constants (they are spliced into the WGSL source), so both backends agree
//! on the brightness of every point and the glow at a given time.

/// Angular speed of the per-point shimmer, radians per second
pub const SHIMMER_RATE: f32 = 1.5;

/// Glow alpha at rest
pub const GLOW_BASE_ALPHA: f32 = 0.12;

/// Glow alpha swing around the base
pub const GLOW_PULSE_ALPHA: f32 = 0.03;

/// Angular speed of the glow pulse, radians per second
pub const GLOW_PULSE_RATE: f32 = 0.8;

/// Glow radius relative to the sphere radius
pub const GLOW_EXTENT: f32 = 1.4;

/// Quantization steps of the point alpha table
pub const ALPHA_STEPS: usize = 32;

/// Shimmer brightness of a point in [0, 1]
pub fn shimmer(elapsed: f32, phase: f32) -> f32 {
    0.5 + 0.5 * (elapsed * SHIMMER_RATE + phase).sin()
}

/// Alpha of the background glow
pub fn glow_alpha(elapsed: f32) -> f32 {
    GLOW_BASE_ALPHA + GLOW_PULSE_ALPHA * (elapsed * GLOW_PULSE_RATE).sin()
}

/// Precomputed fill styles, one per quantized alpha level, so drawing a point
/// never builds a color string.
#[derive(Debug, Clone)]
pub struct AlphaTable {
    styles: Vec<String>,
}

impl AlphaTable {
    /// Build the table for an sRGB color
    pub fn new(color: [u8; 3]) -> Self {
        let styles = (0..ALPHA_STEPS)
            .map(|step| {
                format!(
                    "rgba({}, {}, {}, {:.3})",
                    color[0],
                    color[1],
                    color[2],
                    Self::alpha(step)
                )
            })
            .collect();
        Self { styles }
    }

    /// Table index for a shimmer value (clamped to [0, 1])
    pub fn index(value: f32) -> usize {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        (value * (ALPHA_STEPS - 1) as f32).round() as usize
    }

    /// Alpha represented by a table index
    pub fn alpha(index: usize) -> f32 {
        index.min(ALPHA_STEPS - 1) as f32 / (ALPHA_STEPS - 1) as f32
    }

    /// Quantized alpha for a shimmer value
    pub fn quantize(value: f32) -> f32 {
        Self::alpha(Self::index(value))
    }

    /// Fill style at a table index
    pub fn style(&self, index: usize) -> &str {
        &self.styles[index.min(ALPHA_STEPS - 1)]
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}
