//! The particle sphere subsystem
//!
//! One [`ParticleSphere`] owns everything a visual needs: the immutable scene,
//! rotation state, viewport, frame scheduler and rendering strategy. Several
//! instances can live side by side and each tears down on its own.

use tracing::{debug, info};

use crate::backend::{BackendKind, FrameState, RenderBackend};
use crate::config::{DeviceTier, SphereConfig};
use crate::error::{SphereError, SphereResult};
use crate::geometry::{ParticleField, entropy_seed};
use crate::graph::EdgeSet;
use crate::interaction::{InteractionController, InteractionMode};
use crate::scheduler::{FrameHandle, FrameRequester, LifecycleScheduler, LifecycleState};
use crate::transform::ProjectionConfig;

/// Points and edges, built once before the first frame and never mutated
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    field: ParticleField,
    edges: EdgeSet,
}

impl Scene {
    pub fn new(field: ParticleField, edges: EdgeSet) -> Self {
        Self { field, edges }
    }

    /// Generate the field and its proximity graph from a configuration
    pub fn from_config(config: &SphereConfig) -> Self {
        let seed = config.seed.unwrap_or_else(entropy_seed);
        let field = ParticleField::generate(config.particle_count, config.sphere_radius, seed);
        let edges = EdgeSet::build(&field, config.connection_distance, config.connection_cap);

        info!(
            points = field.len(),
            edges = edges.len(),
            cap = edges.cap(),
            "scene built"
        );
        Self { field, edges }
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }

    pub fn edges(&self) -> &EdgeSet {
        &self.edges
    }
}

/// Device and user preferences, read once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    /// False when the user prefers reduced motion
    pub motion_allowed: bool,
    /// A precise pointer (mouse, trackpad) is available
    pub fine_pointer: bool,
}

impl Environment {
    pub fn tier(&self) -> DeviceTier {
        if self.fine_pointer {
            DeviceTier::Full
        } else {
            DeviceTier::Compact
        }
    }
}

/// A single ambient sphere visual
pub struct ParticleSphere {
    config: SphereConfig,
    scene: Scene,
    interaction: InteractionController,
    projection: ProjectionConfig,
    scheduler: LifecycleScheduler,
    backend: Option<Box<dyn RenderBackend>>,
    /// Timestamp of the first drawn frame, in milliseconds
    started_at: Option<f64>,
    frames_rendered: u64,
}

impl ParticleSphere {
    /// Validate the configuration and build the scene.
    ///
    /// Fails with [`SphereError::ReducedMotion`] without generating anything
    /// when the user prefers reduced motion.
    pub fn new(config: SphereConfig, env: Environment) -> SphereResult<Self> {
        config.validate()?;
        if !env.motion_allowed {
            return Err(SphereError::ReducedMotion);
        }

        let scene = Scene::from_config(&config);
        let interaction = InteractionController::new(&config, env.fine_pointer);
        let projection = ProjectionConfig::new(config.fov, 0.0, 0.0, 1.0);

        debug!(mode = ?interaction.mode(), "particle sphere created");

        Ok(Self {
            config,
            scene,
            interaction,
            projection,
            scheduler: LifecycleScheduler::new(env.motion_allowed),
            backend: None,
            started_at: None,
            frames_rendered: 0,
        })
    }

    pub fn config(&self) -> &SphereConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn projection(&self) -> &ProjectionConfig {
        &self.projection
    }

    pub fn interaction_mode(&self) -> InteractionMode {
        self.interaction.mode()
    }

    pub fn scheduler(&self) -> &LifecycleScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> LifecycleState {
        self.scheduler.state()
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// Frames drawn since creation
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Hand over a fully initialized backend; the loop may start right away
    pub fn attach_backend(
        &mut self,
        mut backend: Box<dyn RenderBackend>,
        frames: &dyn FrameRequester,
    ) -> SphereResult<()> {
        if self.scheduler.state() == LifecycleState::Disposed {
            backend.dispose();
            return Err(SphereError::Disposed);
        }

        backend.resize(&self.projection);
        info!(backend = %backend.kind(), "backend attached");
        self.backend = Some(backend);
        self.scheduler.mark_backend_ready(frames)
    }

    /// Adopt a new container size in CSS pixels. Empty boxes are ignored.
    pub fn resize(&mut self, width: f32, height: f32, pixel_ratio: f32) {
        if !(width > 0.0 && height > 0.0) {
            return;
        }

        let projection = ProjectionConfig::new(self.config.fov, width, height, pixel_ratio);
        if projection == self.projection {
            return;
        }
        self.projection = projection;

        if let Some(backend) = self.backend.as_mut() {
            backend.resize(&self.projection);
        }
    }

    /// Viewport intersection changed
    pub fn set_visible(&mut self, visible: bool, frames: &dyn FrameRequester) -> SphereResult<()> {
        self.scheduler.set_visible(visible, frames)
    }

    /// Resume after [`ParticleSphere::stop`]
    pub fn start(&mut self, frames: &dyn FrameRequester) -> SphereResult<()> {
        self.scheduler.set_enabled(true, frames)
    }

    /// Pause the loop regardless of visibility
    pub fn stop(&mut self, frames: &dyn FrameRequester) -> SphereResult<()> {
        self.scheduler.set_enabled(false, frames)
    }

    /// Pointer position relative to the container's top-left corner
    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        self.interaction
            .pointer_moved(x, y, self.projection.width, self.projection.height);
    }

    pub fn pointer_left(&mut self) {
        self.interaction.pointer_left();
    }

    /// Frame callback body.
    ///
    /// `fired` identifies the callback that is running. Schedules the next
    /// frame first, then updates rotation and draws. Returns whether a frame
    /// was drawn.
    pub fn on_animation_frame(
        &mut self,
        fired: FrameHandle,
        timestamp_ms: f64,
        frames: &dyn FrameRequester,
    ) -> SphereResult<bool> {
        if !self.scheduler.begin_frame(fired, frames)? {
            return Ok(false);
        }

        let started_at = *self.started_at.get_or_insert(timestamp_ms);
        let elapsed = ((timestamp_ms - started_at) / 1000.0).max(0.0) as f32;
        let rotation = self.interaction.update(elapsed);

        if let Some(backend) = self.backend.as_mut() {
            backend.render_frame(&FrameState {
                elapsed,
                rotation,
                projection: &self.projection,
                scene: &self.scene,
            });
            self.frames_rendered += 1;
        }
        Ok(true)
    }

    /// Stop for good and release the backend
    pub fn dispose(&mut self, frames: &dyn FrameRequester) {
        self.scheduler.dispose(frames);
        if let Some(mut backend) = self.backend.take() {
            backend.dispose();
            info!(backend = %backend.kind(), "backend disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::scheduler::testing::ManualFrames;
    use crate::transform::RotationState;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Resize(f32, f32),
        Frame { elapsed: f32, rotation: RotationState },
        Dispose,
    }

    struct RecordingBackend {
        calls: Rc<RefCell<Vec<Call>>>,
    }

    impl RenderBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Canvas2d
        }

        fn resize(&mut self, projection: &ProjectionConfig) {
            self.calls
                .borrow_mut()
                .push(Call::Resize(projection.width, projection.height));
        }

        fn render_frame(&mut self, frame: &FrameState<'_>) {
            self.calls.borrow_mut().push(Call::Frame {
                elapsed: frame.elapsed,
                rotation: frame.rotation,
            });
        }

        fn dispose(&mut self) {
            self.calls.borrow_mut().push(Call::Dispose);
        }
    }

    fn env(fine_pointer: bool) -> Environment {
        Environment {
            motion_allowed: true,
            fine_pointer,
        }
    }

    fn small_config() -> SphereConfig {
        SphereConfig::default()
            .with_particle_count(40)
            .with_seed(1)
    }

    fn running(fine_pointer: bool) -> (ParticleSphere, ManualFrames, Rc<RefCell<Vec<Call>>>) {
        let frames = ManualFrames::default();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut sphere = ParticleSphere::new(small_config(), env(fine_pointer)).unwrap();
        sphere.resize(200.0, 100.0, 1.0);
        sphere
            .attach_backend(Box::new(RecordingBackend { calls: calls.clone() }), &frames)
            .unwrap();
        sphere.set_visible(true, &frames).unwrap();
        (sphere, frames, calls)
    }

    fn frames_drawn(calls: &Rc<RefCell<Vec<Call>>>) -> usize {
        calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Frame { .. }))
            .count()
    }

    #[test]
    fn reduced_motion_builds_nothing() {
        let result = ParticleSphere::new(
            small_config(),
            Environment {
                motion_allowed: false,
                fine_pointer: true,
            },
        );
        assert!(matches!(result, Err(SphereError::ReducedMotion)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SphereConfig::default().with_particle_count(0);
        assert!(matches!(
            ParticleSphere::new(config, env(true)),
            Err(SphereError::InvalidConfig(_))
        ));
    }

    #[test]
    fn tier_follows_pointer_capability() {
        assert_eq!(env(true).tier(), DeviceTier::Full);
        assert_eq!(env(false).tier(), DeviceTier::Compact);
    }

    #[test]
    fn scene_is_built_before_first_frame() {
        let sphere = ParticleSphere::new(small_config(), env(false)).unwrap();
        assert_eq!(sphere.scene().field().len(), 40);
        assert_eq!(sphere.state(), LifecycleState::Stopped);
        assert_eq!(sphere.frames_rendered(), 0);
    }

    #[test]
    fn attach_resizes_backend_to_current_viewport() {
        let (_, _, calls) = running(false);
        assert_eq!(calls.borrow()[0], Call::Resize(200.0, 100.0));
    }

    #[test]
    fn elapsed_is_measured_from_first_frame() {
        let (mut sphere, frames, calls) = running(false);

        let fired = frames.fire().unwrap();
        assert!(sphere.on_animation_frame(fired, 5_000.0, &frames).unwrap());
        let fired = frames.fire().unwrap();
        assert!(sphere.on_animation_frame(fired, 7_500.0, &frames).unwrap());

        let calls = calls.borrow();
        let elapsed: Vec<f32> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Frame { elapsed, .. } => Some(*elapsed),
                _ => None,
            })
            .collect();
        assert_eq!(elapsed, vec![0.0, 2.5]);
    }

    #[test]
    fn auto_drift_rotation_reaches_backend() {
        let (mut sphere, frames, calls) = running(false);
        let fired = frames.fire().unwrap();
        sphere.on_animation_frame(fired, 0.0, &frames).unwrap();
        let fired = frames.fire().unwrap();
        sphere.on_animation_frame(fired, 10_000.0, &frames).unwrap();

        let last = calls.borrow().last().cloned().unwrap();
        let Call::Frame { rotation, .. } = last else {
            panic!("expected a frame, got {:?}", last);
        };
        assert!((rotation.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn pointer_uses_css_viewport() {
        let (mut sphere, frames, calls) = running(true);
        // Right edge, vertical center: full Y target
        sphere.pointer_moved(200.0, 50.0);
        for _ in 0..400 {
            let fired = frames.fire().unwrap();
            sphere.on_animation_frame(fired, 0.0, &frames).unwrap();
        }

        let last = calls.borrow().last().cloned().unwrap();
        let Call::Frame { rotation, .. } = last else {
            panic!("expected a frame, got {:?}", last);
        };
        assert!(rotation.x.abs() < 1e-6);
        assert!((rotation.y - 0.3).abs() < 1e-3);
    }

    #[test]
    fn hidden_sphere_draws_nothing() {
        let (mut sphere, frames, calls) = running(false);
        sphere.set_visible(false, &frames).unwrap();

        assert_eq!(frames.pending_count(), 0);
        assert!(!sphere.on_animation_frame(FrameHandle(1), 16.0, &frames).unwrap());
        assert_eq!(frames_drawn(&calls), 0);
    }

    #[test]
    fn stop_and_start_keep_the_scene() {
        let (mut sphere, frames, _) = running(false);
        let before = sphere.scene().clone();

        sphere.stop(&frames).unwrap();
        assert_eq!(sphere.state(), LifecycleState::Stopped);
        sphere.start(&frames).unwrap();
        assert_eq!(sphere.state(), LifecycleState::Running);

        assert_eq!(sphere.scene(), &before);
    }

    #[test]
    fn empty_resize_is_ignored() {
        let (mut sphere, _, calls) = running(false);
        sphere.resize(0.0, 300.0, 2.0);
        assert_eq!(sphere.projection().width, 200.0);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn resize_reaches_backend() {
        let (mut sphere, _, calls) = running(false);
        sphere.resize(640.0, 480.0, 2.0);
        assert_eq!(calls.borrow().last(), Some(&Call::Resize(640.0, 480.0)));
    }

    #[test]
    fn dispose_releases_backend_once() {
        let (mut sphere, frames, calls) = running(false);
        sphere.dispose(&frames);
        sphere.dispose(&frames);

        let disposals = calls.borrow().iter().filter(|c| **c == Call::Dispose).count();
        assert_eq!(disposals, 1);
        assert_eq!(sphere.backend_kind(), None);
        assert_eq!(frames.pending_count(), 0);
        assert!(!sphere.on_animation_frame(FrameHandle(1), 16.0, &frames).unwrap());
    }

    #[test]
    fn attach_after_dispose_is_refused() {
        let frames = ManualFrames::default();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut sphere = ParticleSphere::new(small_config(), env(false)).unwrap();
        sphere.dispose(&frames);

        let result =
            sphere.attach_backend(Box::new(RecordingBackend { calls: calls.clone() }), &frames);
        assert_eq!(result, Err(SphereError::Disposed));
        assert_eq!(*calls.borrow(), vec![Call::Dispose]);
    }
}
