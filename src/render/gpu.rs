use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4};
use log::{debug, warn};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::bloom::{create_target, BloomPass, HDR_FORMAT};
use super::chain::{FrameInputs, RenderBackend, RenderError};
use super::shaders;
use crate::fragment::{Geometry, VERTEX_STRIDE};
use crate::material::{Material, MaterialId, MaterialKind, TextureId, TextureStore};
use crate::scene::Scene;

/// wgpu backend drawing into a window or canvas surface.
pub struct GpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    lost: Arc<Mutex<Option<String>>>,
    depth: DepthBuffer,
    _hdr_texture: wgpu::Texture,
    hdr_view: wgpu::TextureView,
    opaque_pipeline: wgpu::RenderPipeline,
    blended_pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    material_sampler: wgpu::Sampler,
    white: GpuTexture,
    bloom: BloomPass,
    composite_pipeline: wgpu::RenderPipeline,
    composite_layout: wgpu::BindGroupLayout,
    composite_buffer: wgpu::Buffer,
    composite_sampler: wgpu::Sampler,
    composite_bind_group: wgpu::BindGroup,
    meshes: HashMap<usize, MeshBuffers>,
    materials: HashMap<MaterialId, MaterialSlot>,
    textures: HashMap<(TextureId, bool), GpuTexture>,
    objects: Vec<ObjectSlot>,
}

impl GpuBackend {
    /// Initializes the device and every pass for `target`, sized in
    /// physical pixels.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: backends(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance
            .create_surface(target)
            .context("failed to create rendering surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("showcase-device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits(&adapter),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let lost = Arc::new(Mutex::new(None));
        {
            let lost = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                *lost.lock() = Some(format!("{reason:?}: {message}"));
            });
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let (hdr_texture, hdr_view) = create_target(&device, config.width, config.height, "scene-hdr");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SCENE_SHADER.into()),
        });

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global-bind-layout"),
            entries: &[uniform_entry::<GlobalUniform>(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-bind-layout"),
            entries: &[
                uniform_entry::<MaterialUniform>(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        // Per-object uniform layout
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[uniform_entry::<ObjectConstants>(0, wgpu::ShaderStages::VERTEX)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &material_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let opaque_pipeline = scene_pipeline(&device, &pipeline_layout, &shader, false);
        let blended_pipeline = scene_pipeline(&device, &pipeline_layout, &shader, true);

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let white = GpuTexture::upload(
            &device,
            &queue,
            "white-texture",
            1,
            1,
            &[255, 255, 255, 255],
            false,
        );

        let bloom = BloomPass::new(&device, &hdr_view, config.width, config.height);

        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("composite-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::composite_shader().into()),
        });
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite-bind-layout"),
            entries: &[
                uniform_entry::<CompositeUniform>(0, wgpu::ShaderStages::FRAGMENT),
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let composite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("composite-pipeline-layout"),
                bind_group_layouts: &[&composite_layout],
                push_constant_ranges: &[],
            });
        let composite_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("composite-pipeline"),
            layout: Some(&composite_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &composite_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &composite_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        let composite_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("composite-uniform"),
            size: std::mem::size_of::<CompositeUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let composite_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("composite-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let composite_bind_group = composite_group(
            &device,
            &composite_layout,
            &composite_buffer,
            &hdr_view,
            bloom.output_view(),
            &composite_sampler,
        );

        debug!(
            "GPU backend ready: {:?}, {}x{}",
            surface_format, config.width, config.height
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            lost,
            depth,
            _hdr_texture: hdr_texture,
            hdr_view,
            opaque_pipeline,
            blended_pipeline,
            global_buffer,
            global_bind_group,
            material_layout,
            object_layout,
            material_sampler,
            white,
            bloom,
            composite_pipeline,
            composite_layout,
            composite_buffer,
            composite_sampler,
            composite_bind_group,
            meshes: HashMap::new(),
            materials: HashMap::new(),
            textures: HashMap::new(),
            objects: Vec::new(),
        })
    }

    fn update_globals(&self, frame: &FrameInputs<'_>) {
        let scene = frame.scene;
        let ambient = scene.ambient.color * scene.ambient.intensity;
        let [first, second] = scene.directional;
        let uniform = GlobalUniform {
            view_proj: frame.camera.view_projection().to_cols_array_2d(),
            camera_position: frame.camera.position.extend(1.0).into(),
            ambient: ambient.extend(1.0).into(),
            light_dir: [
                first.direction().extend(0.0).into(),
                second.direction().extend(0.0).into(),
            ],
            light_color: [
                (first.color * first.intensity).extend(1.0).into(),
                (second.color * second.intensity).extend(1.0).into(),
            ],
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    fn ensure_mesh(&mut self, geometry: &Arc<Geometry>) -> Option<usize> {
        if geometry.indices.is_empty() || geometry.vertices.is_empty() {
            return None;
        }
        let key = Arc::as_ptr(geometry) as usize;
        self.meshes
            .entry(key)
            .or_insert_with(|| MeshBuffers::from_geometry(&self.device, geometry));
        Some(key)
    }

    /// Uploads the material again when its revision moved since last frame.
    fn ensure_material(&mut self, id: MaterialId, scene: &Scene) -> Option<bool> {
        let registry = scene.materials();
        let material = registry.get(id)?;
        let revision = registry.revision(id)?;
        let blended = material.is_blended();
        if self
            .materials
            .get(&id)
            .is_some_and(|slot| slot.revision == revision)
        {
            return Some(blended);
        }

        let map = material.map.map(|texture| (texture, true));
        let alpha_map = material.alpha_map.map(|texture| (texture, false));
        for key in [map, alpha_map].into_iter().flatten() {
            self.ensure_texture(key, scene.textures());
        }
        let color_view = map
            .and_then(|key| self.textures.get(&key))
            .map_or(&self.white.view, |texture| &texture.view);
        let alpha_view = alpha_map
            .and_then(|key| self.textures.get(&key))
            .map_or(&self.white.view, |texture| &texture.view);

        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("material-{}", material.name)),
                contents: bytes_of(&MaterialUniform::from_material(material)),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material-bind-group"),
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(alpha_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.material_sampler),
                },
            ],
        });

        debug!("uploaded material {} at revision {revision}", material.name);
        self.materials.insert(
            id,
            MaterialSlot {
                revision,
                _buffer: buffer,
                bind_group,
            },
        );
        Some(blended)
    }

    fn ensure_texture(&mut self, key: (TextureId, bool), store: &TextureStore) {
        if self.textures.contains_key(&key) {
            return;
        }
        let Some(image) = store.get(key.0) else {
            warn!("material refers to unknown texture {:?}", key.0);
            return;
        };
        if image.rgba.len() != (image.width as usize) * (image.height as usize) * 4 {
            warn!("texture {} has inconsistent size, ignoring it", image.label);
            return;
        }
        let texture = GpuTexture::upload(
            &self.device,
            &self.queue,
            &image.label,
            image.width,
            image.height,
            &image.rgba,
            key.1,
        );
        self.textures.insert(key, texture);
    }

    fn object_slot(&mut self, index: usize, world: Mat4) {
        while self.objects.len() <= index {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("object-uniform"),
                size: std::mem::size_of::<ObjectConstants>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object-bind-group"),
                layout: &self.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.objects.push(ObjectSlot { buffer, bind_group });
        }

        let normal = Mat3::from_mat4(world).inverse().transpose();
        let constants = ObjectConstants {
            model: world.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
        };
        self.queue
            .write_buffer(&self.objects[index].buffer, 0, bytes_of(&constants));
    }
}

impl RenderBackend for GpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
        let (hdr_texture, hdr_view) = create_target(&self.device, width, height, "scene-hdr");
        self._hdr_texture = hdr_texture;
        self.hdr_view = hdr_view;
        self.bloom.resize(&self.device, &self.hdr_view, width, height);
        self.composite_bind_group = composite_group(
            &self.device,
            &self.composite_layout,
            &self.composite_buffer,
            &self.hdr_view,
            self.bloom.output_view(),
            &self.composite_sampler,
        );
    }

    fn submit(&mut self, frame: &FrameInputs<'_>) -> Result<(), RenderError> {
        if let Some(reason) = self.lost.lock().take() {
            return Err(RenderError::DeviceLost(reason));
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(err) => {
                warn!("skipping frame: {err}");
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.update_globals(frame);

        // Build the draw list and ensure GPU resources are cached
        let eye = frame.camera.position;
        let mut opaque = Vec::new();
        let mut blended = Vec::new();
        for (index, item) in frame.scene.draw_list().into_iter().enumerate() {
            let Some(mesh) = self.ensure_mesh(&item.geometry) else {
                continue;
            };
            let Some(is_blended) = self.ensure_material(item.material, frame.scene) else {
                continue;
            };
            self.object_slot(index, item.world);
            let draw = Draw {
                mesh,
                material: item.material,
                object: index,
                distance: item.world.w_axis.truncate().distance_squared(eye),
            };
            if is_blended {
                blended.push(draw);
            } else {
                opaque.push(draw);
            }
        }
        blended.sort_by(|a, b| b.distance.total_cmp(&a.distance));

        let chain = frame.chain;
        self.bloom.update_uniforms(&self.queue, &chain.bloom);
        let composite = CompositeUniform {
            exposure: chain.tone_mapping.exposure(),
            strength: chain.bloom.strength,
            _padding: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.composite_buffer, 0, bytes_of(&composite));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("showcase-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.hdr_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &self.global_bind_group, &[]);

            for (pipeline, draws) in [
                (&self.opaque_pipeline, &opaque),
                (&self.blended_pipeline, &blended),
            ] {
                pass.set_pipeline(pipeline);
                for draw in draws {
                    let (Some(mesh), Some(material)) =
                        (self.meshes.get(&draw.mesh), self.materials.get(&draw.material))
                    else {
                        continue;
                    };
                    pass.set_bind_group(1, &material.bind_group, &[]);
                    pass.set_bind_group(2, &self.objects[draw.object].bind_group, &[]);
                    pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                    pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }

        self.bloom.encode(&mut encoder);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.composite_pipeline);
            pass.set_bind_group(0, &self.composite_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
fn backends() -> wgpu::Backends {
    wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL
}

#[cfg(not(target_arch = "wasm32"))]
fn backends() -> wgpu::Backends {
    wgpu::Backends::PRIMARY
}

#[cfg(target_arch = "wasm32")]
fn limits(adapter: &wgpu::Adapter) -> wgpu::Limits {
    wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
}

#[cfg(not(target_arch = "wasm32"))]
fn limits(_adapter: &wgpu::Adapter) -> wgpu::Limits {
    wgpu::Limits::default()
}

fn uniform_entry<T>(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn scene_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    blended: bool,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(if blended {
            "scene-blended-pipeline"
        } else {
            "scene-opaque-pipeline"
        }),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: !blended,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend: blended.then_some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

fn composite_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    scene_view: &wgpu::TextureView,
    bloom_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("composite-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(scene_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(bloom_view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

struct Draw {
    mesh: usize,
    material: MaterialId,
    object: usize,
    distance: f32,
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_geometry(device: &wgpu::Device, geometry: &Geometry) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-vertices"),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-indices"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: geometry.indices.len() as u32,
        }
    }
}

struct MaterialSlot {
    revision: u64,
    _buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct ObjectSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
        srgb: bool,
    ) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: if srgb {
                    wgpu::TextureFormat::Rgba8UnormSrgb
                } else {
                    wgpu::TextureFormat::Rgba8Unorm
                },
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            rgba,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    ambient: [f32; 4],
    light_dir: [[f32; 4]; 2],
    light_color: [[f32; 4]; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct MaterialUniform {
    color: [f32; 4],
    emissive: [f32; 4],
    surface: [f32; 4],
    flags: [f32; 4],
}

impl MaterialUniform {
    fn from_material(material: &Material) -> Self {
        let opacity = if material.transparent {
            material.opacity
        } else {
            1.0
        };
        let emissive = material.emissive * material.emissive_intensity;
        let unlit = if material.kind == MaterialKind::Basic {
            1.0
        } else {
            0.0
        };
        Self {
            color: material.color.extend(opacity).into(),
            emissive: emissive.extend(0.0).into(),
            surface: [
                material.metalness,
                material.roughness,
                material.env_map_intensity,
                material.clearcoat,
            ],
            flags: [unlit, material.reflectivity, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CompositeUniform {
    exposure: f32,
    strength: f32,
    _padding: [f32; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_the_shaders() {
        assert_eq!(std::mem::size_of::<GlobalUniform>(), 160);
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 64);
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 112);
        assert_eq!(std::mem::size_of::<CompositeUniform>(), 16);
    }

    #[test]
    fn opaque_materials_ignore_opacity() {
        let mut material = Material::standard("frame");
        material.opacity = 0.3;
        assert_eq!(MaterialUniform::from_material(&material).color[3], 1.0);
        let glass = Material::physical("windows").with_opacity(0.2);
        assert_eq!(MaterialUniform::from_material(&glass).color[3], 0.2);
    }

    #[test]
    fn basic_materials_are_unlit() {
        let uniform = MaterialUniform::from_material(&Material::basic("backdrop"));
        assert_eq!(uniform.flags[0], 1.0);
        let emissive = Material::standard("lights").with_emissive(0xffffff, 2.0);
        let uniform = MaterialUniform::from_material(&emissive);
        assert!((uniform.emissive[0] - 2.0).abs() < 1e-6);
    }
}
