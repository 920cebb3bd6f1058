//! End-to-end draws against a real WebGPU device.
//!
//! These tests skip when no suitable adapter is available (set
//! `PRISM_REQUIRE_WEBGPU=1` to make that a failure instead). They build a
//! minimal context with linear swizzle tables, drive the orchestrator the
//! way the GS renderer would, and read the emulated memory buffer back.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use prism_draw::{
    Draw, DrawConfig, DrawContext, FrameLifecycle, FrameQueue, FramebufferParams,
    DepthbufferParams, PipelineCaps, PixelFormat, PrimVertex, ScissorRect, StorageClass,
    MAX_VERTEX_COUNT, VRAM_BYTES,
};
use prism_formats::address::{linear_page_offset, pixel_address};
use prism_formats::codec::pack_rgba32;

fn require_webgpu() -> bool {
    std::env::var("PRISM_REQUIRE_WEBGPU")
        .map(|v| v.trim() == "1")
        .unwrap_or(false)
}

fn request_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::None,
        force_fallback_adapter: false,
        compatible_surface: None,
    }));
    let Some(adapter) = adapter else {
        assert!(!require_webgpu(), "PRISM_REQUIRE_WEBGPU=1 but no adapter found");
        return None;
    };
    if !adapter.features().contains(wgpu::Features::PUSH_CONSTANTS) {
        assert!(
            !require_webgpu(),
            "PRISM_REQUIRE_WEBGPU=1 but the adapter lacks push constants"
        );
        return None;
    }
    let result = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("prism draw tests"),
            required_features: wgpu::Features::PUSH_CONSTANTS,
            required_limits: adapter.limits(),
        },
        None,
    ));
    match result {
        Ok(pair) => Some(pair),
        Err(err) => {
            assert!(
                !require_webgpu(),
                "PRISM_REQUIRE_WEBGPU=1 but device creation failed: {err}"
            );
            None
        }
    }
}

struct Harness {
    device: Rc<wgpu::Device>,
    queue: Rc<wgpu::Queue>,
    context: Rc<DrawContext>,
    frame: Rc<RefCell<FrameQueue>>,
}

fn linear_swizzle_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    storage: StorageClass,
) -> wgpu::TextureView {
    let width = storage.page_width();
    let height = storage.page_height();
    let table = linear_page_offset(storage);
    let mut data = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push(table(x, y));
        }
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("linear swizzle table"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Uint,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&data),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn harness() -> Option<Harness> {
    let (device, queue) = request_device()?;
    let device = Rc::new(device);
    let queue = Rc::new(queue);

    let memory = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("emulated memory"),
        size: VRAM_BYTES as u64,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let locks = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("memory locks"),
        size: VRAM_BYTES as u64,
        usage: wgpu::BufferUsages::STORAGE,
        mapped_at_creation: false,
    });
    let clut = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("clut"),
        size: wgpu::Extent3d {
            width: 1024,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Uint,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let mut swizzle_views = HashMap::new();
    swizzle_views.insert(
        PixelFormat::Psmct32,
        linear_swizzle_texture(&device, &queue, StorageClass::Ct32),
    );
    swizzle_views.insert(
        PixelFormat::Psmz32,
        linear_swizzle_texture(&device, &queue, StorageClass::Z32),
    );

    let context = Rc::new(
        DrawContext::new(
            device.clone(),
            queue.clone(),
            memory,
            locks,
            clut.create_view(&wgpu::TextureViewDescriptor::default()),
            swizzle_views,
        )
        .expect("context resources are correctly sized"),
    );
    let frame = Rc::new(RefCell::new(FrameQueue::new(
        device.clone(),
        queue.clone(),
        3,
    )));
    Some(Harness {
        device,
        queue,
        context,
        frame,
    })
}

fn read_memory(harness: &Harness, bytes: u64) -> Vec<u32> {
    let staging = harness.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: bytes,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = harness
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_buffer_to_buffer(harness.context.memory_buffer(), 0, &staging, 0, bytes);
    harness.queue.submit([encoder.finish()]);

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).expect("receiver alive");
    });
    let _ = harness.device.poll(wgpu::Maintain::Wait);
    rx.recv().expect("map_async callback ran").expect("mapped");
    let data = bytemuck::cast_slice::<u8, u32>(&slice.get_mapped_range()).to_vec();
    staging.unmap();
    data
}

fn vertex(x: f32, y: f32, color: [u8; 4]) -> PrimVertex {
    PrimVertex {
        x,
        y,
        z: 0,
        color,
        s: 0.0,
        t: 0.0,
        q: 1.0,
    }
}

/// Two triangles covering pixels [0,4)x[0,4).
fn quad(color: [u8; 4]) -> [PrimVertex; 6] {
    [
        vertex(0.0, 0.0, color),
        vertex(4.0, 0.0, color),
        vertex(0.0, 4.0, color),
        vertex(4.0, 0.0, color),
        vertex(4.0, 4.0, color),
        vertex(0.0, 4.0, color),
    ]
}

const DEPTH_BASE: u32 = 0x10_0000;

fn base_caps() -> PipelineCaps {
    // Untextured, always-pass tests, no blending: plain color fill.
    PipelineCaps::default()
}

fn apply_base_state(draw: &mut Draw) {
    draw.set_pipeline_caps(base_caps());
    draw.set_framebuffer_params(FramebufferParams {
        addr: 0,
        width: 64,
        write_mask: 0xFFFF_FFFF,
    });
    draw.set_depthbuffer_params(DepthbufferParams {
        addr: DEPTH_BASE,
        width: 64,
    });
    draw.set_scissor(ScissorRect {
        x: 0,
        y: 0,
        width: 1024,
        height: 1024,
    });
}

#[test]
fn quad_writes_packed_pixels_into_emulated_memory() {
    let Some(harness) = harness() else {
        eprintln!("skipping: no suitable WebGPU adapter");
        return;
    };
    let mut draw = Draw::new(
        harness.context.clone(),
        harness.frame.clone(),
        DrawConfig::default(),
    );
    apply_base_state(&mut draw);

    let color = [0xFF, 0x00, 0xFF, 0xFF];
    draw.add_vertices(&quad(color));
    draw.pre_flush_frame();
    harness.frame.borrow_mut().flush();
    draw.post_flush_frame();
    let _ = harness.device.poll(wgpu::Maintain::Wait);

    assert_eq!(draw.stats().batches_drawn, 1);
    assert_eq!(draw.stats().vertices_drawn, 6);
    assert_eq!(draw.pipeline_cache_stats().entries, 1);

    let memory = read_memory(&harness, 4096);
    let table = linear_page_offset(StorageClass::Ct32);
    let expected = pack_rgba32(color);
    for y in 0..4 {
        for x in 0..4 {
            let addr = pixel_address(StorageClass::Ct32, 0, 64, x, y, &table);
            assert_eq!(
                memory[(addr / 4) as usize],
                expected,
                "pixel ({x}, {y}) at address {addr:#x}"
            );
        }
    }
    // Just outside the quad: untouched.
    let outside = pixel_address(StorageClass::Ct32, 0, 64, 4, 0, &table);
    assert_eq!(memory[(outside / 4) as usize], 0);
    // Depth writes were disabled.
    let depth = read_memory(&harness, (DEPTH_BASE + 4) as u64);
    assert_eq!(depth[(DEPTH_BASE / 4) as usize], 0);
}

#[test]
fn setters_flush_once_per_change() {
    let Some(harness) = harness() else {
        eprintln!("skipping: no suitable WebGPU adapter");
        return;
    };
    let mut draw = Draw::new(
        harness.context.clone(),
        harness.frame.clone(),
        DrawConfig::default(),
    );
    apply_base_state(&mut draw);

    let params_a = FramebufferParams {
        addr: 0,
        width: 64,
        write_mask: 0xFFFF_FFFF,
    };
    let params_b = FramebufferParams {
        addr: 0x2000,
        ..params_a
    };

    draw.add_vertices(&quad([0x10, 0x20, 0x30, 0xFF]));
    // Re-setting the committed value is a no-op.
    draw.set_framebuffer_params(params_a);
    assert_eq!(draw.stats().state_flushes, 0);
    assert_eq!(draw.stats().batches_drawn, 0);

    // A real change flushes the pending batch under the old state first.
    draw.set_framebuffer_params(params_b);
    assert_eq!(draw.stats().state_flushes, 1);
    assert_eq!(draw.stats().batches_drawn, 1);

    // Changing with an empty batch commits without a counted flush.
    draw.set_framebuffer_params(params_a);
    assert_eq!(draw.stats().state_flushes, 1);
    assert_eq!(draw.stats().batches_drawn, 1);

    draw.pre_flush_frame();
    harness.frame.borrow_mut().flush();
    draw.post_flush_frame();
    let _ = harness.device.poll(wgpu::Maintain::Wait);
}

#[test]
fn vertex_region_exhaustion_forces_one_frame_submission() {
    let Some(harness) = harness() else {
        eprintln!("skipping: no suitable WebGPU adapter");
        return;
    };
    let mut draw = Draw::new(
        harness.context.clone(),
        harness.frame.clone(),
        DrawConfig::default(),
    );
    apply_base_state(&mut draw);

    // Degenerate (zero-area) triangles: vertex-heavy, fragment-free.
    let filler_count = (MAX_VERTEX_COUNT - 2) / 3 * 3;
    let filler = vec![PrimVertex::default(); filler_count as usize];
    let frame_before = harness.frame.borrow().current_frame();
    draw.add_vertices(&filler);
    assert_eq!(draw.stats().forced_frame_submissions, 0);

    // This run no longer fits: the pending batch is drawn and an
    // out-of-band submission is forced between the two appends.
    draw.add_vertices(&quad([0xFF; 4]));
    assert_eq!(draw.stats().forced_frame_submissions, 1);
    assert_eq!(draw.stats().batches_drawn, 1);
    assert_ne!(harness.frame.borrow().current_frame(), frame_before);

    draw.pre_flush_frame();
    assert_eq!(draw.stats().batches_drawn, 2);
    harness.frame.borrow_mut().flush();
    draw.post_flush_frame();
    let _ = harness.device.poll(wgpu::Maintain::Wait);
}
