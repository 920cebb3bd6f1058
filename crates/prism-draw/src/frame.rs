//! The frame-lifecycle collaborator boundary.

use std::rc::Rc;

/// What the orchestrator needs from the frame/command-buffer manager: the
/// active frame-in-flight slot, a command encoder to record into, and a
/// way to force a submission when the vertex region runs out mid-frame.
///
/// The implementation owns frame pacing. It must not hand out a slot index
/// again until the GPU has finished consuming that slot's vertex storage.
pub trait FrameLifecycle {
    /// Index of the frame slot currently recording, in `0..slot count`.
    fn current_frame(&self) -> usize;

    /// The encoder commands for the current frame are recorded into.
    fn encoder(&mut self) -> &mut wgpu::CommandEncoder;

    /// Submits everything recorded so far and advances to the next slot.
    fn flush(&mut self);
}

/// Minimal reference implementation over a device/queue pair.
///
/// It round-robins slot indices on every submission and performs no GPU
/// throttling of its own; embedders with real frames in flight should wrap
/// their frame pacer in the trait instead.
pub struct FrameQueue {
    device: Rc<wgpu::Device>,
    queue: Rc<wgpu::Queue>,
    slots: usize,
    current: usize,
    encoder: Option<wgpu::CommandEncoder>,
}

impl FrameQueue {
    pub fn new(device: Rc<wgpu::Device>, queue: Rc<wgpu::Queue>, slots: usize) -> Self {
        assert!(slots > 0, "at least one frame slot is required");
        Self {
            device,
            queue,
            slots,
            current: 0,
            encoder: None,
        }
    }
}

impl FrameLifecycle for FrameQueue {
    fn current_frame(&self) -> usize {
        self.current
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("prism frame encoder"),
                })
        })
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit([encoder.finish()]);
        }
        self.current = (self.current + 1) % self.slots;
    }
}
