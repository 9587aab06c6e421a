//! WebGPU strategy
//!
//! Geometry is uploaded once at startup. Each frame only the model matrix and
//! the time are written to the uniform buffer; rotation, projection, point
//! sizing and shimmer all run on the GPU.

use tracing::{info, warn};
use web_sys::HtmlCanvasElement;
use wgpu::util::DeviceExt;

use crate::backend::shaders::{self, ParticleVertex, QUAD_CORNERS, SceneUniforms};
use crate::backend::shell::{ShellMesh, ShellVertex};
use crate::backend::{BackendKind, FrameState, RenderBackend};
use crate::config::SphereConfig;
use crate::error::{SphereError, SphereResult};
use crate::sphere::Scene;
use crate::transform::ProjectionConfig;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const PARTICLE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![1 => Float32x3, 2 => Float32];
const EDGE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const SHELL_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// Points add up where they overlap, like the Canvas 2D "lighter" mode
const ADDITIVE_BLENDING: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// GPU-accelerated sphere renderer
pub struct WebGpuBackend {
    canvas: HtmlCanvasElement,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,

    uniforms: SceneUniforms,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,

    shell_pipeline: wgpu::RenderPipeline,
    shell_vertex_buffer: wgpu::Buffer,
    shell_index_buffer: wgpu::Buffer,
    shell_index_count: u32,

    edge_pipeline: wgpu::RenderPipeline,
    edge_index_buffer: wgpu::Buffer,
    edge_index_count: u32,

    point_pipeline: wgpu::RenderPipeline,
    quad_buffer: wgpu::Buffer,
    particle_buffer: wgpu::Buffer,
    particle_count: u32,

    sphere_radius: f32,
    disposed: bool,
}

impl WebGpuBackend {
    /// Acquire a device, compile the shaders and upload the scene.
    ///
    /// Any failure leaves nothing behind; the canvas may already hold a
    /// WebGPU context, so a fallback must draw into a fresh canvas.
    pub async fn initialize(
        canvas: HtmlCanvasElement,
        config: &SphereConfig,
        scene: &Scene,
        projection: &ProjectionConfig,
    ) -> SphereResult<Self> {
        let (width, height) = projection.pixel_size();
        let width = (width as u32).max(1);
        let height = (height as u32).max(1);
        canvas.set_width(width);
        canvas.set_height(height);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        let surface = instance
            .create_surface(wgpu::SurfaceTarget::Canvas(canvas.clone()))
            .map_err(|e| SphereError::Context(format!("Failed to create surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| SphereError::BackendUnavailable("no WebGPU adapter".to_string()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("particle-sphere"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| SphereError::Context(format!("Failed to create device: {}", e)))?;

        device.on_uncaptured_error(Box::new(|error| {
            warn!(%error, "uncaptured WebGPU error");
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        // Colors are already sRGB-encoded, as on the 2D canvas
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| SphereError::Context("surface reports no formats".to_string()))?;
        let alpha_mode = if surface_caps
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            wgpu::CompositeAlphaMode::Auto
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sphere_radius = scene.field().radius();
        let uniforms = SceneUniforms::new(config, projection, sphere_radius);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Shader and pipeline errors surface asynchronously on the web
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shell_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shell Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::shell_shader().into()),
        });
        let edge_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Edge Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::edge_shader().into()),
        });
        let point_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Point Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::point_shader().into()),
        });

        let shell_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            PipelineDesc {
                label: "Shell Pipeline",
                module: &shell_module,
                vertex_entry: "vs_shell",
                fragment_entry: "fs_shell",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ShellVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &SHELL_ATTRIBUTES,
                }],
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: wgpu::BlendState::ALPHA_BLENDING,
                format: surface_format,
            },
        );

        let edge_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            PipelineDesc {
                label: "Edge Pipeline",
                module: &edge_module,
                vertex_entry: "vs_edge",
                fragment_entry: "fs_edge",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ParticleVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &EDGE_ATTRIBUTES,
                }],
                topology: wgpu::PrimitiveTopology::LineList,
                blend: wgpu::BlendState::ALPHA_BLENDING,
                format: surface_format,
            },
        );

        let point_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            PipelineDesc {
                label: "Point Pipeline",
                module: &point_module,
                vertex_entry: "vs_point",
                fragment_entry: "fs_point",
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &QUAD_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<ParticleVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &PARTICLE_ATTRIBUTES,
                    },
                ],
                topology: wgpu::PrimitiveTopology::TriangleList,
                blend: ADDITIVE_BLENDING,
                format: surface_format,
            },
        );

        if let Some(error) = device.pop_error_scope().await {
            return Err(SphereError::ShaderCompilation(error.to_string()));
        }

        let shell = ShellMesh::for_sphere(sphere_radius);
        let shell_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shell Vertex Buffer"),
            contents: bytemuck::cast_slice(shell.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let shell_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shell Index Buffer"),
            contents: bytemuck::cast_slice(shell.indices()),
            usage: wgpu::BufferUsages::INDEX,
        });

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Point Quad Buffer"),
            contents: bytemuck::cast_slice(&QUAD_CORNERS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let particles = ParticleVertex::from_field(scene.field());
        let particle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Buffer"),
            contents: bytemuck::cast_slice(&particles),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // Zero-sized buffers are invalid, so an empty graph still gets one line
        let mut edge_indices = scene.edges().line_indices();
        let edge_index_count = edge_indices.len() as u32;
        if edge_indices.is_empty() {
            edge_indices = vec![0, 0];
        }
        let edge_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Edge Index Buffer"),
            contents: bytemuck::cast_slice(&edge_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        info!(
            format = ?surface_format,
            points = particles.len(),
            edges = edge_index_count / 2,
            "WebGPU backend ready"
        );

        Ok(Self {
            canvas,
            surface,
            device,
            queue,
            surface_config,
            uniforms,
            uniform_buffer,
            bind_group,
            shell_pipeline,
            shell_vertex_buffer,
            shell_index_buffer,
            shell_index_count: shell.indices().len() as u32,
            edge_pipeline,
            edge_index_buffer,
            edge_index_count,
            point_pipeline,
            quad_buffer,
            particle_buffer,
            particle_count: particles.len() as u32,
            sphere_radius,
            disposed: false,
        })
    }
}

impl RenderBackend for WebGpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::WebGpu
    }

    fn resize(&mut self, projection: &ProjectionConfig) {
        let (width, height) = projection.pixel_size();
        if self.disposed || width < 1.0 || height < 1.0 {
            return;
        }

        self.canvas.set_width(width as u32);
        self.canvas.set_height(height as u32);
        self.surface_config.width = width as u32;
        self.surface_config.height = height as u32;
        self.surface.configure(&self.device, &self.surface_config);

        self.uniforms.set_viewport(projection, self.sphere_radius);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.uniforms]));
    }

    fn render_frame(&mut self, frame: &FrameState<'_>) {
        if self.disposed {
            return;
        }

        self.uniforms.advance(frame.rotation, frame.elapsed);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.uniforms]));

        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(_) => {
                self.surface.configure(&self.device, &self.surface_config);
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sphere Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sphere Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &self.bind_group, &[]);

            // Glow behind everything
            pass.set_pipeline(&self.shell_pipeline);
            pass.set_vertex_buffer(0, self.shell_vertex_buffer.slice(..));
            pass.set_index_buffer(self.shell_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..self.shell_index_count, 0, 0..1);

            if self.edge_index_count > 0 {
                pass.set_pipeline(&self.edge_pipeline);
                pass.set_vertex_buffer(0, self.particle_buffer.slice(..));
                pass.set_index_buffer(self.edge_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..self.edge_index_count, 0, 0..1);
            }

            pass.set_pipeline(&self.point_pipeline);
            pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
            pass.set_vertex_buffer(1, self.particle_buffer.slice(..));
            pass.draw(0..QUAD_CORNERS.len() as u32, 0..self.particle_count);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        for buffer in [
            &self.uniform_buffer,
            &self.shell_vertex_buffer,
            &self.shell_index_buffer,
            &self.edge_index_buffer,
            &self.quad_buffer,
            &self.particle_buffer,
        ] {
            buffer.destroy();
        }
        self.device.destroy();
    }
}

/// What differs between the three pipelines
struct PipelineDesc<'a> {
    label: &'a str,
    module: &'a wgpu::ShaderModule,
    vertex_entry: &'a str,
    fragment_entry: &'a str,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    topology: wgpu::PrimitiveTopology,
    blend: wgpu::BlendState,
    format: wgpu::TextureFormat,
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    desc: PipelineDesc<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: Some(desc.vertex_entry),
            buffers: desc.buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.module,
            entry_point: Some(desc.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: desc.format,
                blend: Some(desc.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: desc.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
