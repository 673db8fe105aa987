// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interface between the renderer and a GPU.

use core::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use vellum_encoding::Vertex;

use crate::state::GpuCommand;
use crate::{Error, RendererOptions, Result};

/// Handle to a texture owned by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(NonZeroU64);

impl ImageId {
    /// Returns a handle that has never been returned before in this process.
    pub fn next() -> Self {
        // We initialize with 1 so that the conversion below succeeds
        static ID_COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Pixel layout of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// One 8-bit coverage channel per pixel.
    Alpha,
    /// Four 8-bit channels per pixel.
    Rgba,
}

impl TextureKind {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Alpha => 1,
            Self::Rgba => 4,
        }
    }
}

bitflags! {
    /// Sampling and interpretation flags for a texture.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ImageFlags: u32 {
        /// Repeat horizontally instead of clamping.
        const REPEAT_X = 1 << 0;
        /// Repeat vertically instead of clamping.
        const REPEAT_Y = 1 << 1;
        /// Rows are stored bottom to top.
        const FLIP_Y = 1 << 2;
        /// Color channels are already multiplied by alpha.
        const PREMULTIPLIED = 1 << 3;
        /// Sample with nearest filtering instead of linear.
        const NEAREST = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub flags: ImageFlags,
}

impl TextureDesc {
    /// Number of bytes of pixel data for a region of this texture.
    pub fn data_len(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.kind.bytes_per_pixel()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Checks that `region` lies entirely within the texture.
    pub fn check_region(&self, region: TextureRegion) -> Result<()> {
        let fits = |start: u32, len: u32, size: u32| {
            start.checked_add(len).is_some_and(|end| end <= size)
        };
        if fits(region.x, region.width, self.width) && fits(region.y, region.height, self.height) {
            Ok(())
        } else {
            Err(Error::TextureRegionOutOfBounds {
                region,
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// A rectangle of texels, used for partial texture updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Everything a backend uploads once at the start of a flush.
#[derive(Clone, Copy, Debug)]
pub struct FrameData<'a> {
    /// Logical size of the viewport.
    pub view_size: [f32; 2],
    pub device_pixel_ratio: f32,
    pub vertices: &'a [Vertex],
    /// Uniform blocks, laid out at the backend's uniform alignment.
    pub uniforms: &'a [u8],
}

/// A GPU that can execute the renderer's draw calls.
///
/// A flush is bracketed by [`Backend::begin_frame`] and
/// [`Backend::end_frame`]; in between, [`Backend::execute`] is called once
/// per command in submission order.
pub trait Backend {
    /// Prepares shaders and other long lived state.
    fn create(&mut self, options: &RendererOptions) -> Result<()>;

    /// Byte alignment required between uniform blocks.
    fn uniform_alignment(&self) -> u32;

    /// Creates a texture. Without `data` the contents are zeroed.
    fn create_texture(&mut self, id: ImageId, desc: TextureDesc, data: Option<&[u8]>)
        -> Result<()>;

    /// Replaces a region of a texture with `data`, which is tightly packed.
    fn update_texture(&mut self, id: ImageId, region: TextureRegion, data: &[u8]) -> Result<()>;

    fn delete_texture(&mut self, id: ImageId) -> Result<()>;

    fn texture_desc(&self, id: ImageId) -> Option<TextureDesc>;

    fn begin_frame(&mut self, frame: FrameData<'_>) -> Result<()>;

    fn execute(&mut self, command: &GpuCommand);

    fn end_frame(&mut self) -> Result<()>;
}
