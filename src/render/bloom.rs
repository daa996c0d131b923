//! Bloom: bright pass, then a separable Gaussian blur.
//!
//! Pass 1: bright pass (scene → glow)
//! Pass 2: horizontal blur (glow → scratch)
//! Pass 3: vertical blur (scratch → glow)
//! The composite pass adds `glow` back onto the scene.

use bytemuck::{Pod, Zeroable};

use super::chain::BloomSettings;
use super::shaders;

pub(crate) const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BloomUniform {
    texel_size: [f32; 2],
    threshold: f32,
    spread: f32,
}

pub(crate) struct BloomPass {
    bright_pipeline: wgpu::RenderPipeline,
    blur_h_pipeline: wgpu::RenderPipeline,
    blur_v_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    targets: Targets,
}

struct Targets {
    _glow: wgpu::Texture,
    glow_view: wgpu::TextureView,
    _scratch: wgpu::Texture,
    scratch_view: wgpu::TextureView,
    bright_group: wgpu::BindGroup,
    blur_h_group: wgpu::BindGroup,
    blur_v_group: wgpu::BindGroup,
    size: (u32, u32),
}

impl BloomPass {
    pub(crate) fn new(
        device: &wgpu::Device,
        scene_view: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bloom-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::bloom_shader().into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("bloom-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bloom-uniform"),
            size: std::mem::size_of::<BloomUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bloom-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<BloomUniform>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bloom-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let create_pipeline = |label: &str, entry_point: &str| -> wgpu::RenderPipeline {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: HDR_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let bright_pipeline = create_pipeline("bloom-bright-pipeline", "fs_bright");
        let blur_h_pipeline = create_pipeline("bloom-blur-h-pipeline", "fs_blur_h");
        let blur_v_pipeline = create_pipeline("bloom-blur-v-pipeline", "fs_blur_v");

        let targets = Targets::create(
            device,
            &layout,
            &uniform_buffer,
            &sampler,
            scene_view,
            width,
            height,
        );

        Self {
            bright_pipeline,
            blur_h_pipeline,
            blur_v_pipeline,
            uniform_buffer,
            layout,
            sampler,
            targets,
        }
    }

    /// Recreates the targets after the scene texture changed size.
    pub(crate) fn resize(
        &mut self,
        device: &wgpu::Device,
        scene_view: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) {
        self.targets = Targets::create(
            device,
            &self.layout,
            &self.uniform_buffer,
            &self.sampler,
            scene_view,
            width,
            height,
        );
    }

    pub(crate) fn update_uniforms(&self, queue: &wgpu::Queue, settings: &BloomSettings) {
        let (width, height) = self.targets.size;
        let uniform = BloomUniform {
            texel_size: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32],
            threshold: settings.threshold,
            spread: settings.spread(),
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub(crate) fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let targets = &self.targets;
        let steps = [
            ("bloom-bright-pass", &self.bright_pipeline, &targets.bright_group, &targets.glow_view),
            ("bloom-blur-h-pass", &self.blur_h_pipeline, &targets.blur_h_group, &targets.scratch_view),
            ("bloom-blur-v-pass", &self.blur_v_pipeline, &targets.blur_v_group, &targets.glow_view),
        ];

        for (label, pipeline, bind_group, view) in steps {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
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
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    /// Blurred glow, ready to be composited.
    pub(crate) fn output_view(&self) -> &wgpu::TextureView {
        &self.targets.glow_view
    }
}

impl Targets {
    fn create(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniform_buffer: &wgpu::Buffer,
        sampler: &wgpu::Sampler,
        scene_view: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) -> Self {
        let (glow, glow_view) = create_target(device, width, height, "bloom-glow");
        let (scratch, scratch_view) = create_target(device, width, height, "bloom-scratch");

        let bind = |source: &wgpu::TextureView, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(source),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        };

        let bright_group = bind(scene_view, "bloom-bright-group");
        let blur_h_group = bind(&glow_view, "bloom-blur-h-group");
        let blur_v_group = bind(&scratch_view, "bloom-blur-v-group");

        Self {
            _glow: glow,
            glow_view,
            _scratch: scratch,
            scratch_view,
            bright_group,
            blur_h_group,
            blur_v_group,
            size: (width.max(1), height.max(1)),
        }
    }
}

/// Sampleable HDR render target.
pub(crate) fn create_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
