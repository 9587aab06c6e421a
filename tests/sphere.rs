//! End-to-end behavior of the sphere through its public API

use std::cell::RefCell;
use std::rc::Rc;

use particle_sphere::backend::canvas2d::{Canvas2DBackend, RasterSurface};
use particle_sphere::backend::{BackendKind, FrameState, RenderBackend};
use particle_sphere::geometry::ParticleField;
use particle_sphere::graph::EdgeSet;
use particle_sphere::scheduler::{FrameHandle, FrameRequester, LifecycleState};
use particle_sphere::shimmer::{ALPHA_STEPS, AlphaTable, shimmer};
use particle_sphere::transform::{FrameBuffer, ProjectionConfig, RotationState};
use particle_sphere::{Environment, ParticleSphere, Scene, SphereConfig, SphereError, SphereResult};

/// Browser stand-in: callbacks are queued and fired by the test
#[derive(Default)]
struct FakeBrowser {
    next: RefCell<i32>,
    queued: RefCell<Vec<FrameHandle>>,
    total_requested: RefCell<usize>,
}

impl FakeBrowser {
    fn fire(&self) -> Option<FrameHandle> {
        let mut queued = self.queued.borrow_mut();
        if queued.is_empty() {
            return None;
        }
        Some(queued.remove(0))
    }

    fn queued(&self) -> usize {
        self.queued.borrow().len()
    }
}

impl FrameRequester for FakeBrowser {
    fn request_frame(&self) -> SphereResult<FrameHandle> {
        let mut next = self.next.borrow_mut();
        *next += 1;
        self.queued.borrow_mut().push(FrameHandle(*next));
        *self.total_requested.borrow_mut() += 1;
        Ok(FrameHandle(*next))
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        self.queued.borrow_mut().retain(|h| *h != handle);
    }
}

/// Backend that counts frames and remembers the scene it drew
#[derive(Default)]
struct CountingBackend {
    frames: Rc<RefCell<Vec<Scene>>>,
}

impl RenderBackend for CountingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Canvas2d
    }

    fn resize(&mut self, _projection: &ProjectionConfig) {}

    fn render_frame(&mut self, frame: &FrameState<'_>) {
        self.frames.borrow_mut().push(frame.scene.clone());
    }

    fn dispose(&mut self) {}
}

/// Surface that keeps only the fill styles of drawn points
#[derive(Default)]
struct PointStyles(Vec<String>);

impl RasterSurface for PointStyles {
    fn resize(&mut self, _width: u32, _height: u32) {}
    fn clear(&mut self, _width: f64, _height: f64) {}
    fn fill_glow(&mut self, _cx: f64, _cy: f64, _radius: f64, _inner: &str, _outer: &str) {}
    fn set_additive(&mut self, _additive: bool) {}
    fn begin_path(&mut self) {}
    fn move_to(&mut self, _x: f64, _y: f64) {}
    fn line_to(&mut self, _x: f64, _y: f64) {}
    fn stroke(&mut self, _style: &str, _width: f64) {}

    fn fill_circle(&mut self, _x: f64, _y: f64, _radius: f64, style: &str) {
        self.0.push(style.to_string());
    }
}

fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

#[test]
fn points_lie_on_the_sphere_for_any_count() {
    for count in [2, 3, 10, 300, 800, 1234] {
        let field = ParticleField::generate(count, 1.6, 0);
        assert_eq!(field.len(), count);
        for point in field.points() {
            let p = point.position;
            let r_sq = p[0] * p[0] + p[1] * p[1] + p[2] * p[2];
            assert!((r_sq - 1.6 * 1.6).abs() < 1e-4, "count {}: r² = {}", count, r_sq);
        }
    }
}

#[test]
fn capped_graph_on_dense_field() {
    let field = ParticleField::generate(500, 1.6, 42);
    let edges = EdgeSet::build(&field, 0.6, 100);

    assert!(edges.len() <= 100);
    let mut seen = std::collections::HashSet::new();
    for edge in edges.edges() {
        assert!(edge.source < edge.target);
        assert!(seen.insert((edge.source, edge.target)));
        let a = field.points()[edge.source].position;
        let b = field.points()[edge.target].position;
        assert!(distance(a, b) < 0.6);
    }
}

#[test]
fn same_seed_reproduces_scene() {
    let config = SphereConfig::default().with_particle_count(500).with_seed(9);
    assert_eq!(Scene::from_config(&config), Scene::from_config(&config));
}

#[test]
fn positions_do_not_depend_on_seed() {
    let a = ParticleField::generate(200, 1.6, 1);
    let b = ParticleField::generate(200, 1.6, 2);
    for (p, q) in a.points().iter().zip(b.points()) {
        assert_eq!(p.position, q.position);
    }
    assert_ne!(a, b, "phases should differ between seeds");
}

#[test]
fn projection_is_periodic_and_pure() {
    let field = ParticleField::generate(100, 1.6, 3);
    let projection = ProjectionConfig::new(4.0, 1024.0, 768.0, 1.0);
    let rotation = RotationState::new(-0.4, 2.2);

    let mut first = FrameBuffer::new();
    first.project(&field, rotation, &projection);
    let mut again = FrameBuffer::new();
    again.project(&field, rotation, &projection);
    assert_eq!(first.points(), again.points());

    let mut turned = FrameBuffer::new();
    turned.project(
        &field,
        RotationState::new(rotation.x + std::f32::consts::TAU, rotation.y - std::f32::consts::TAU),
        &projection,
    );
    for (a, b) in first.points().iter().zip(turned.points()) {
        assert!((a.screen_x - b.screen_x).abs() < 1e-2);
        assert!((a.screen_y - b.screen_y).abs() < 1e-2);
    }
}

#[test]
fn canvas_points_use_quantized_shimmer() {
    let config = SphereConfig::default().with_particle_count(30).with_seed(5);
    let scene = Scene::from_config(&config);
    let projection = ProjectionConfig::new(config.fov, 300.0, 300.0, 1.0);
    let mut backend = Canvas2DBackend::with_surface(PointStyles::default(), &config);

    let elapsed = 4.2;
    backend.render_frame(&FrameState {
        elapsed,
        rotation: RotationState::default(),
        projection: &projection,
        scene: &scene,
    });

    let table = AlphaTable::new(config.color);
    let styles = &backend.surface().0;
    assert_eq!(styles.len(), 30);
    for (style, point) in styles.iter().zip(scene.field().points()) {
        let expected = 0.5 + 0.5 * (1.5 * elapsed + point.phase).sin();
        assert!((shimmer(elapsed, point.phase) - expected).abs() < 1e-6);
        assert_eq!(style, table.style(AlphaTable::index(shimmer(elapsed, point.phase))));
    }
}

#[cfg(feature = "webgpu")]
#[test]
fn gpu_shimmer_uses_the_same_formula() {
    use particle_sphere::backend::shaders;

    let shader = shaders::point_shader();
    assert!(shader.contains("const SHIMMER_RATE: f32 = 1.5;"));
    assert!(shader.contains("0.5 + 0.5 * sin(scene.time * SHIMMER_RATE + in.phase)"));
}

#[test]
fn canvas_alpha_is_within_half_a_step_of_the_exact_shimmer() {
    let config = SphereConfig::default().with_particle_count(64).with_seed(11);
    let scene = Scene::from_config(&config);
    let projection = ProjectionConfig::new(config.fov, 300.0, 300.0, 1.0);
    let half_step = 0.5 / (ALPHA_STEPS - 1) as f32;

    for elapsed in [0.0, 0.7, 4.2, 31.9] {
        let mut backend = Canvas2DBackend::with_surface(PointStyles::default(), &config);
        backend.render_frame(&FrameState {
            elapsed,
            rotation: RotationState::default(),
            projection: &projection,
            scene: &scene,
        });

        for (style, point) in backend.surface().0.iter().zip(scene.field().points()) {
            // The GPU draws the unquantized value
            let exact = shimmer(elapsed, point.phase);
            let drawn: f32 = style
                .trim_end_matches(')')
                .rsplit(',')
                .next()
                .and_then(|a| a.trim().parse().ok())
                .unwrap();
            assert!(
                (drawn - exact).abs() <= half_step + 1e-3,
                "t={} phase={}: canvas {} vs exact {}",
                elapsed,
                point.phase,
                drawn,
                exact
            );
            assert!((AlphaTable::quantize(exact) - exact).abs() <= half_step + 1e-6);
        }
    }
}

#[test]
fn reduced_motion_never_starts() {
    let result = ParticleSphere::new(
        SphereConfig::default(),
        Environment {
            motion_allowed: false,
            fine_pointer: true,
        },
    );
    assert_eq!(result.err(), Some(SphereError::ReducedMotion));
}

#[test]
fn scrolling_out_and_back_in() {
    let browser = FakeBrowser::default();
    let drawn = Rc::new(RefCell::new(Vec::new()));
    let mut sphere = ParticleSphere::new(
        SphereConfig::default().with_particle_count(100).with_seed(8),
        Environment {
            motion_allowed: true,
            fine_pointer: false,
        },
    )
    .unwrap();
    sphere.resize(800.0, 600.0, 1.0);
    sphere
        .attach_backend(
            Box::new(CountingBackend {
                frames: drawn.clone(),
            }),
            &browser,
        )
        .unwrap();
    sphere.set_visible(true, &browser).unwrap();

    let mut now = 0.0;
    for _ in 0..5 {
        let fired = browser.fire().unwrap();
        sphere.on_animation_frame(fired, now, &browser).unwrap();
        now += 16.0;
    }
    assert_eq!(drawn.borrow().len(), 5);

    // Leave the viewport: the queued callback is cancelled
    sphere.set_visible(false, &browser).unwrap();
    assert_eq!(sphere.state(), LifecycleState::Stopped);
    assert_eq!(browser.queued(), 0);
    let requested_while_hidden = *browser.total_requested.borrow();
    assert!(browser.fire().is_none());
    assert_eq!(*browser.total_requested.borrow(), requested_while_hidden);

    // Come back: one new request, same scene
    sphere.set_visible(true, &browser).unwrap();
    assert_eq!(browser.queued(), 1);
    let fired = browser.fire().unwrap();
    sphere.on_animation_frame(fired, now, &browser).unwrap();

    let drawn = drawn.borrow();
    assert_eq!(drawn.len(), 6);
    assert_eq!(drawn.first(), drawn.last());
}

#[test]
fn callback_in_flight_when_hidden_is_the_last_one() {
    let browser = FakeBrowser::default();
    let drawn = Rc::new(RefCell::new(Vec::new()));
    let mut sphere = ParticleSphere::new(
        SphereConfig::default().with_particle_count(50).with_seed(2),
        Environment {
            motion_allowed: true,
            fine_pointer: true,
        },
    )
    .unwrap();
    sphere.resize(400.0, 400.0, 2.0);
    sphere
        .attach_backend(
            Box::new(CountingBackend {
                frames: drawn.clone(),
            }),
            &browser,
        )
        .unwrap();
    sphere.set_visible(true, &browser).unwrap();

    // The browser has already dequeued the callback when visibility drops
    let fired = browser.fire().unwrap();
    sphere.set_visible(false, &browser).unwrap();
    assert!(!sphere.on_animation_frame(fired, 0.0, &browser).unwrap());

    assert_eq!(browser.queued(), 0);
    assert!(drawn.borrow().is_empty());
}

#[test]
fn late_callback_after_quick_scroll_back_does_not_fork_the_loop() {
    let browser = FakeBrowser::default();
    let drawn = Rc::new(RefCell::new(Vec::new()));
    let mut sphere = ParticleSphere::new(
        SphereConfig::default().with_particle_count(50).with_seed(4),
        Environment {
            motion_allowed: true,
            fine_pointer: false,
        },
    )
    .unwrap();
    sphere.resize(400.0, 300.0, 1.0);
    sphere
        .attach_backend(
            Box::new(CountingBackend {
                frames: drawn.clone(),
            }),
            &browser,
        )
        .unwrap();
    sphere.set_visible(true, &browser).unwrap();

    // Out and back in while the old callback is still on its way
    let late = browser.fire().unwrap();
    sphere.set_visible(false, &browser).unwrap();
    sphere.set_visible(true, &browser).unwrap();
    assert!(!sphere.on_animation_frame(late, 0.0, &browser).unwrap());
    assert_eq!(browser.queued(), 1);

    let mut now = 0.0;
    for _ in 0..20 {
        let fired = browser.fire().unwrap();
        assert!(sphere.on_animation_frame(fired, now, &browser).unwrap());
        assert_eq!(browser.queued(), 1);
        now += 16.0;
    }
    assert_eq!(drawn.borrow().len(), 20);
}
