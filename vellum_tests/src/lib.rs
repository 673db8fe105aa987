// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vellum tests.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(
    missing_debug_implementations,
    unreachable_pub,
    missing_docs,
    clippy::missing_assert_message,
    reason = "Deferred"
)]

use anyhow::{anyhow, bail, Result};
use vellum::kurbo::{Cap, Join};
use vellum::low_level::{GpuCommand, Recording, Topology};
use vellum::peniko::{Color, Compose};
use vellum::vellum_encoding::{InstructionQueue, PathCache, TessellationConfig};
use vellum::wgpu::{
    self, BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Extent3d, TextureDescriptor,
    TextureFormat, TextureUsages,
};
use vellum::{Paint, Renderer, RendererOptions, Scissor, WgpuBackend};

/// The fringe width used throughout the tests, for a device pixel ratio of one.
pub const FRINGE: f32 = 1.0;

/// Converts a renderer error, which is not `Sync` when it wraps a wgpu error.
pub fn vellum_error(err: vellum::Error) -> anyhow::Error {
    anyhow!("{err}")
}

pub fn recording_renderer(options: RendererOptions) -> Result<Renderer<Recording>> {
    Renderer::new(Recording::default(), options).map_err(vellum_error)
}

/// Flattens `queue` with the default tessellation settings.
pub fn flatten(queue: &InstructionQueue) -> PathCache {
    let mut cache = PathCache::new(TessellationConfig::default());
    cache.flatten(queue);
    cache
}

/// Expands and fills every contour of `queue` with a solid color.
pub fn fill<B: vellum::Backend>(
    renderer: &mut Renderer<B>,
    queue: &InstructionQueue,
    color: Color,
) -> PathCache {
    let fringe = if renderer.edge_antialias() { FRINGE } else { 0.0 };
    let mut cache = flatten(queue);
    cache.expand_fill(fringe, Join::Miter, 2.4);
    renderer.fill(
        &Paint::color(color),
        Compose::SrcOver.into(),
        &Scissor::none(),
        FRINGE,
        cache.bounds(),
        cache.paths(),
    )
    .expect("fill fits in the frame");
    cache
}

/// Expands and strokes every contour of `queue` with a solid color.
pub fn stroke<B: vellum::Backend>(
    renderer: &mut Renderer<B>,
    queue: &InstructionQueue,
    color: Color,
    width: f32,
) -> PathCache {
    let fringe = if renderer.edge_antialias() { FRINGE } else { 0.0 };
    let mut cache = flatten(queue);
    cache.expand_stroke(width * 0.5, fringe, Cap::Butt, Join::Miter, 10.0);
    renderer.stroke(
        &Paint::color(color),
        Compose::SrcOver.into(),
        &Scissor::none(),
        FRINGE,
        width,
        cache.paths(),
    )
    .expect("stroke fits in the frame");
    cache
}

/// The draws in a command stream, in order.
pub fn draws(commands: &[GpuCommand]) -> Vec<(Topology, u32, u32)> {
    commands
        .iter()
        .filter_map(|command| match *command {
            GpuCommand::Draw {
                topology,
                first,
                count,
            } => Some((topology, first, count)),
            _ => None,
        })
        .collect()
}

/// A renderer drawing into an offscreen RGBA texture.
pub struct GpuTarget {
    pub renderer: Renderer<WgpuBackend>,
    texture: wgpu::Texture,
    width: u32,
    height: u32,
}

impl GpuTarget {
    /// Creates a target cleared to `background`, or `None` when the machine
    /// has no usable adapter.
    pub fn new(
        width: u32,
        height: u32,
        options: RendererOptions,
        background: Color,
    ) -> Result<Option<Self>> {
        let handle = match vellum::util::create_headless_device() {
            Ok(handle) => handle,
            Err(vellum::Error::NoCompatibleDevice) => return Ok(None),
            Err(err) => return Err(vellum_error(err)),
        };
        let (adapter, device, queue) = handle.into_parts();
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("Target texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let mut backend = WgpuBackend::new(&adapter, device, queue, TextureFormat::Rgba8Unorm);
        backend.set_clear_color(Some(background));
        let renderer = match Renderer::new(backend, options) {
            Ok(renderer) => renderer,
            Err(vellum::Error::UnsupportedDevice(_)) => return Ok(None),
            Err(err) => return Err(vellum_error(err)),
        };
        let mut target = Self {
            renderer,
            texture,
            width,
            height,
        };
        target.attach();
        target
            .renderer
            .begin_frame(width as f32, height as f32, 1.0)
            .map_err(vellum_error)?;
        Ok(Some(target))
    }

    /// Points the backend at this target's texture.
    pub fn attach(&mut self) {
        let view = self
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.renderer
            .backend_mut()
            .set_target(view, self.width, self.height);
    }

    /// Flushes the renderer and reads the target back as tightly packed RGBA.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.renderer.flush().map_err(vellum_error)?;
        let device = self.renderer.backend().device();
        let queue = self.renderer.backend().queue();

        let padded_byte_width = (self.width * 4).next_multiple_of(256);
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some("val"),
            size: u64::from(padded_byte_width) * u64::from(self.height),
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Copy out buffer"),
        });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_byte_width),
                    rows_per_image: None,
                },
            },
            Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit([encoder.finish()]);

        let buf_slice = buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        if let Some(recv_result) = pollster::block_on(receiver.receive()) {
            recv_result?;
        } else {
            bail!("channel was closed");
        }

        let data = buf_slice.get_mapped_range();
        let row_bytes = (self.width * 4) as usize;
        let mut result = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * padded_byte_width as usize;
            result.extend(&data[start..start + row_bytes]);
        }
        drop(data);
        buffer.unmap();
        Ok(result)
    }
}

/// The RGBA value of one pixel in tightly packed image data.
pub fn pixel(data: &[u8], width: u32, x: u32, y: u32) -> Result<[u8; 4]> {
    let start = ((y * width + x) * 4) as usize;
    data.get(start..start + 4)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(|| anyhow!("pixel ({x}, {y}) is out of bounds"))
}
