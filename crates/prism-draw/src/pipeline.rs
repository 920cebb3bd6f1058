//! Pipeline and bind-group construction plus their caches.
//!
//! A pipeline is a pure function of the capability descriptor: shader
//! modules synthesized for the caps, a binding layout whose optional slots
//! follow the caps, the fixed vertex layout and fixed-function state. Bind
//! groups only depend on the descriptor-subset projection, so distinct
//! pipelines share them.

use std::rc::Rc;

use prism_shadergen::{bindings, DescriptorSetCaps, PipelineCaps, PUSH_CONSTANTS_SIZE};
use tracing::debug;

use crate::cache::{BoundedCache, CacheStats};
use crate::context::DrawContext;
use crate::vertex::PrimVertex;

/// A compiled draw pipeline and the layouts it was built with. Never
/// mutated after creation.
pub struct DrawPipeline {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub pipeline: wgpu::RenderPipeline,
}

fn storage_buffer_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn lookup_image_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Uint,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn create_draw_pipeline(context: &DrawContext, caps: &PipelineCaps) -> DrawPipeline {
    let device = context.device.as_ref();

    let vertex_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("prism draw vs"),
        source: wgpu::ShaderSource::Wgsl(prism_shadergen::vertex_wgsl().into()),
    });
    let fragment_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("prism draw fs"),
        source: wgpu::ShaderSource::Wgsl(prism_shadergen::fragment_wgsl(caps).into()),
    });

    let mut entries = vec![
        storage_buffer_entry(bindings::VRAM),
        storage_buffer_entry(bindings::VRAM_LOCKS),
        lookup_image_entry(bindings::FB_SWIZZLE),
        lookup_image_entry(bindings::DEPTH_SWIZZLE),
    ];
    if caps.has_texture {
        entries.push(lookup_image_entry(bindings::TEX_SWIZZLE));
        if caps.texture_format.is_indexed() {
            entries.push(lookup_image_entry(bindings::CLUT));
        }
    }
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("prism draw bindings"),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("prism draw layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[wgpu::PushConstantRange {
            stages: wgpu::ShaderStages::FRAGMENT,
            range: 0..PUSH_CONSTANTS_SIZE,
        }],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("prism draw pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_shader,
            entry_point: "vs_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[PrimVertex::layout()],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_shader,
            entry_point: "fs_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                // All emulated blending happens in the fragment program;
                // the attachment itself writes every channel unblended.
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
    });

    DrawPipeline {
        bind_group_layout,
        pipeline_layout,
        pipeline,
    }
}

/// Bounded cache of compiled pipelines keyed by the full capability
/// descriptor.
pub struct PipelineCache {
    cache: BoundedCache<PipelineCaps, DrawPipeline>,
}

impl PipelineCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new(capacity),
        }
    }

    pub fn try_get(&mut self, caps: &PipelineCaps) -> Option<Rc<DrawPipeline>> {
        self.cache.get(caps)
    }

    pub fn register(&mut self, caps: PipelineCaps, pipeline: DrawPipeline) -> Rc<DrawPipeline> {
        self.cache.insert(caps, pipeline)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Bounded cache of bind groups keyed by the descriptor-subset projection.
pub struct BindGroupCache {
    cache: BoundedCache<DescriptorSetCaps, wgpu::BindGroup>,
}

impl BindGroupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new(capacity),
        }
    }

    /// Returns the cached bind group for the subset key, creating and
    /// caching it on first use.
    pub fn prepare(
        &mut self,
        context: &DrawContext,
        layout: &wgpu::BindGroupLayout,
        caps: DescriptorSetCaps,
    ) -> Rc<wgpu::BindGroup> {
        if let Some(bind_group) = self.cache.get(&caps) {
            return bind_group;
        }
        debug!(?caps, "creating draw bind group");

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: bindings::VRAM,
                resource: context.memory_buffer().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: bindings::VRAM_LOCKS,
                resource: context.lock_buffer().as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: bindings::FB_SWIZZLE,
                resource: wgpu::BindingResource::TextureView(
                    context.swizzle_table(caps.framebuffer_format),
                ),
            },
            wgpu::BindGroupEntry {
                binding: bindings::DEPTH_SWIZZLE,
                resource: wgpu::BindingResource::TextureView(
                    context.swizzle_table(caps.depthbuffer_format),
                ),
            },
        ];
        if caps.has_texture {
            entries.push(wgpu::BindGroupEntry {
                binding: bindings::TEX_SWIZZLE,
                resource: wgpu::BindingResource::TextureView(
                    context.swizzle_table(caps.texture_format),
                ),
            });
            if caps.texture_format.is_indexed() {
                entries.push(wgpu::BindGroupEntry {
                    binding: bindings::CLUT,
                    resource: wgpu::BindingResource::TextureView(context.clut_view()),
                });
            }
        }

        let bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("prism draw bind group"),
                layout,
                entries: &entries,
            });
        self.cache.insert(caps, bind_group)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
