//! The rendering-context collaborator surface: the device/queue pair and
//! the shared emulated-memory resources the draw pipeline binds.
//!
//! Population of the memory buffer, the CLUT image and the swizzle-lookup
//! images belongs to the memory-management side of the renderer; this
//! layer only binds and reads/writes through them.

use std::rc::Rc;

use hashbrown::HashMap;
use prism_formats::{PixelFormat, VRAM_BYTES};
use thiserror::Error;

/// Construction-time validation failures. Everything past construction is
/// a programming error and panics instead.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("emulated memory buffer is {actual} bytes, expected {expected}")]
    MemoryBufferSize { expected: u64, actual: u64 },
    #[error("lock buffer is {actual} bytes, expected {expected}")]
    LockBufferSize { expected: u64, actual: u64 },
}

/// Shared handles the draw pipeline renders through.
pub struct DrawContext {
    pub device: Rc<wgpu::Device>,
    pub queue: Rc<wgpu::Queue>,
    memory: wgpu::Buffer,
    locks: wgpu::Buffer,
    clut_view: wgpu::TextureView,
    swizzle_views: HashMap<PixelFormat, wgpu::TextureView>,
}

impl DrawContext {
    /// Wraps externally owned resources. The memory buffer must span the
    /// full emulated video memory; the lock buffer shadows it one lock
    /// word per memory word (the interlock substitute spins on it).
    pub fn new(
        device: Rc<wgpu::Device>,
        queue: Rc<wgpu::Queue>,
        memory: wgpu::Buffer,
        locks: wgpu::Buffer,
        clut_view: wgpu::TextureView,
        swizzle_views: HashMap<PixelFormat, wgpu::TextureView>,
    ) -> Result<Self, ContextError> {
        if memory.size() != VRAM_BYTES as u64 {
            return Err(ContextError::MemoryBufferSize {
                expected: VRAM_BYTES as u64,
                actual: memory.size(),
            });
        }
        if locks.size() != VRAM_BYTES as u64 {
            return Err(ContextError::LockBufferSize {
                expected: VRAM_BYTES as u64,
                actual: locks.size(),
            });
        }
        Ok(Self {
            device,
            queue,
            memory,
            locks,
            clut_view,
            swizzle_views,
        })
    }

    pub fn memory_buffer(&self) -> &wgpu::Buffer {
        &self.memory
    }

    pub fn lock_buffer(&self) -> &wgpu::Buffer {
        &self.locks
    }

    pub fn clut_view(&self) -> &wgpu::TextureView {
        &self.clut_view
    }

    /// The swizzle-lookup image for `format`. Drawing with a format whose
    /// table was never registered is an upstream configuration defect.
    pub fn swizzle_table(&self, format: PixelFormat) -> &wgpu::TextureView {
        self.swizzle_views
            .get(&format)
            .unwrap_or_else(|| panic!("no swizzle table registered for {format:?}"))
    }
}
