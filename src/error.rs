//! Error taxonomy for the particle sphere
//!
//! Nothing here is ever shown to the user. Every failure resolves to "no
//! decorative visual"; the variants exist so the host glue can log the reason
//! and tell capability absence apart from a broken GPU setup.

use thiserror::Error;

/// Errors that can occur while mounting or driving the sphere
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SphereError {
    /// The user asked for reduced motion
    #[error("reduced motion requested")]
    ReducedMotion,

    /// A required host element or global is missing
    #[error("missing element: {0}")]
    MissingElement(String),

    /// The requested rendering backend cannot run here
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A drawing context or GPU device could not be created
    #[error("context creation failed: {0}")]
    Context(String),

    /// A shader program failed validation
    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// The configuration was rejected
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The host refused to schedule an animation frame
    #[error("frame scheduling failed: {0}")]
    Scheduling(String),

    /// The sphere was already torn down
    #[error("particle sphere disposed")]
    Disposed,
}

impl SphereError {
    /// True for conditions that mean "this device should not show the
    /// visual" rather than "something went wrong while building it".
    pub fn is_capability_absence(&self) -> bool {
        matches!(
            self,
            SphereError::ReducedMotion
                | SphereError::MissingElement(_)
                | SphereError::BackendUnavailable(_)
        )
    }
}

/// Result type for sphere operations
pub type SphereResult<T> = Result<T, SphereError>;
