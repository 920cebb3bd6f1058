//! The draw orchestrator: dirty-tracked state setters, vertex batching and
//! flush submission.
//!
//! Every state setter flushes the pending batch under the *old* state
//! before committing a change, so a flushed batch is always drawn under
//! one consistent snapshot. Draws go to a dedicated off-screen attachment;
//! the real output is the fragment programs' writes into the
//! emulated-memory buffer.

use std::cell::RefCell;
use std::rc::Rc;

use prism_shadergen::{PipelineCaps, DRAW_AREA_SIZE};
use tracing::{debug, trace};

use crate::batch::BatchRange;
use crate::cache::CacheStats;
use crate::config::DrawConfig;
use crate::context::DrawContext;
use crate::frame::FrameLifecycle;
use crate::pipeline::{create_draw_pipeline, BindGroupCache, PipelineCache};
use crate::state::{
    DepthbufferParams, DrawState, FramebufferParams, ScissorRect, TextureAlphaParams,
    TextureClampParams, TextureParams,
};
use crate::stats::DrawStats;
use crate::vertex::PrimVertex;

/// Hard bound on vertices per frame slot.
pub const MAX_VERTEX_COUNT: u32 = 128 * 1024;

struct FrameSlot {
    vertex_buffer: wgpu::Buffer,
}

/// The draw-pipeline orchestrator for one rendering context.
pub struct Draw {
    context: Rc<DrawContext>,
    frame: Rc<RefCell<dyn FrameLifecycle>>,
    pipelines: PipelineCache,
    bind_groups: BindGroupCache,
    frames: Vec<FrameSlot>,
    batch: BatchRange,
    state: DrawState,
    stats: DrawStats,
    // Some drivers discard fragment-program side effects when nothing is
    // written to a color attachment, so every pass targets this image.
    _draw_image: wgpu::Texture,
    draw_image_view: wgpu::TextureView,
}

impl Draw {
    pub fn new(
        context: Rc<DrawContext>,
        frame: Rc<RefCell<dyn FrameLifecycle>>,
        config: DrawConfig,
    ) -> Self {
        let device = context.device.clone();
        let frames = (0..config.frame_slots)
            .map(|index| FrameSlot {
                vertex_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("prism vertex buffer {index}")),
                    size: MAX_VERTEX_COUNT as u64 * PrimVertex::STRIDE,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
            })
            .collect();

        let draw_image = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("prism draw image"),
            size: wgpu::Extent3d {
                width: DRAW_AREA_SIZE,
                height: DRAW_AREA_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let draw_image_view = draw_image.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            context,
            frame,
            pipelines: PipelineCache::new(config.max_pipelines),
            bind_groups: BindGroupCache::new(config.max_bind_groups),
            frames,
            batch: BatchRange::new(MAX_VERTEX_COUNT),
            state: DrawState::default(),
            stats: DrawStats::default(),
            _draw_image: draw_image,
            draw_image_view,
        }
    }

    pub fn stats(&self) -> DrawStats {
        self.stats
    }

    pub fn pipeline_cache_stats(&self) -> CacheStats {
        self.pipelines.stats()
    }

    pub fn bind_group_cache_stats(&self) -> CacheStats {
        self.bind_groups.stats()
    }

    /// The committed state; read-only from outside.
    pub fn state(&self) -> &DrawState {
        &self.state
    }

    fn flush_for_state_change(&mut self) {
        if self.batch.pending() > 0 {
            self.stats.state_flushes += 1;
        }
        self.flush_vertices();
    }

    pub fn set_pipeline_caps(&mut self, caps: PipelineCaps) {
        if self.state.caps == caps {
            return;
        }
        self.flush_for_state_change();
        self.state.caps = caps;
    }

    pub fn set_framebuffer_params(&mut self, params: FramebufferParams) {
        if self.state.framebuffer == params {
            return;
        }
        self.flush_for_state_change();
        self.state.framebuffer = params;
    }

    pub fn set_depthbuffer_params(&mut self, params: DepthbufferParams) {
        if self.state.depthbuffer == params {
            return;
        }
        self.flush_for_state_change();
        self.state.depthbuffer = params;
    }

    pub fn set_texture_params(&mut self, params: TextureParams) {
        if self.state.texture == params {
            return;
        }
        self.flush_for_state_change();
        self.state.texture = params;
    }

    pub fn set_texture_alpha_params(&mut self, params: TextureAlphaParams) {
        if self.state.texture_alpha == params {
            return;
        }
        self.flush_for_state_change();
        self.state.texture_alpha = params;
    }

    pub fn set_alpha_test_params(&mut self, alpha_ref: u32) {
        if self.state.alpha_ref == alpha_ref {
            return;
        }
        self.flush_for_state_change();
        self.state.alpha_ref = alpha_ref;
    }

    pub fn set_texture_clamp_params(&mut self, params: TextureClampParams) {
        if self.state.clamp == params {
            return;
        }
        self.flush_for_state_change();
        self.state.clamp = params;
    }

    pub fn set_alpha_blending_params(&mut self, alpha_fix: u32) {
        if self.state.alpha_fix == alpha_fix {
            return;
        }
        self.flush_for_state_change();
        self.state.alpha_fix = alpha_fix;
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        if self.state.scissor == scissor {
            return;
        }
        self.flush_for_state_change();
        self.state.scissor = scissor;
    }

    /// Appends a contiguous vertex run to the current frame's batch.
    ///
    /// When the run does not fit the frame slot's region, the pending batch
    /// is flushed and an out-of-band frame submission is forced first; a
    /// single run larger than the region itself is a caller bug.
    pub fn add_vertices(&mut self, vertices: &[PrimVertex]) {
        let count = vertices.len() as u32;
        if !self.batch.fits(count) {
            self.flush_vertices();
            self.frame.borrow_mut().flush();
            self.post_flush_frame();
            self.stats.forced_frame_submissions += 1;
            assert!(
                self.batch.fits(count),
                "vertex run exceeds the frame vertex region even after a forced submission"
            );
        }
        let at = self.batch.append(count);
        let slot = self.frame.borrow().current_frame();
        self.context.queue.write_buffer(
            &self.frames[slot].vertex_buffer,
            at as u64 * PrimVertex::STRIDE,
            bytemuck::cast_slice(vertices),
        );
    }

    /// Draws the pending batch under the committed state. No-op when the
    /// batch is empty.
    pub fn flush_vertices(&mut self) {
        let pending = self.batch.pending();
        if pending == 0 {
            return;
        }
        assert!(
            pending % 3 == 0,
            "pending vertices do not form whole triangles"
        );

        let caps = self.state.caps;
        let pipeline = match self.pipelines.try_get(&caps) {
            Some(pipeline) => pipeline,
            None => {
                debug!(?caps, "pipeline cache miss, compiling");
                let pipeline = create_draw_pipeline(&self.context, &caps);
                self.pipelines.register(caps, pipeline)
            }
        };
        let bind_group =
            self.bind_groups
                .prepare(&self.context, &pipeline.bind_group_layout, caps.descriptor_caps());

        let push = self.state.push_constants();
        let scissor = self.state.scissor;
        let range = self.batch.take();
        let slot = self.frame.borrow().current_frame();
        let vertex_buffer = &self.frames[slot].vertex_buffer;

        let mut frame = self.frame.borrow_mut();
        let encoder = frame.encoder();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("prism draw pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.draw_image_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Discard,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(
                0.0,
                0.0,
                DRAW_AREA_SIZE as f32,
                DRAW_AREA_SIZE as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
            pass.set_bind_group(0, bind_group.as_ref(), &[]);
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_vertex_buffer(0, vertex_buffer.slice(range.start as u64 * PrimVertex::STRIDE..));
            pass.set_push_constants(wgpu::ShaderStages::FRAGMENT, 0, bytemuck::bytes_of(&push));
            pass.draw(0..pending, 0..1);
        }
        drop(frame);

        self.stats.batches_drawn += 1;
        self.stats.vertices_drawn += pending as u64;
        trace!(vertices = pending, "flushed batch");
    }

    /// Frame hook: call before the frame manager submits, so the last
    /// batch of the frame is recorded.
    pub fn pre_flush_frame(&mut self) {
        self.flush_vertices();
    }

    /// Frame hook: call after submission. The new frame slot gets a fresh
    /// vertex region, so the GPU can still be reading the previous one.
    pub fn post_flush_frame(&mut self) {
        self.batch.reset();
    }
}
