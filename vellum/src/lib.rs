// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vellum renders antialiased 2D paths on the GPU.
//!
//! Paths are flattened and expanded into triangles by
//! [`vellum_encoding`], then handed to a [`Renderer`] which copies their
//! vertices into a single per-frame buffer and records one [`Call`] per
//! fill, stroke or triangle batch. Convex fills are drawn directly; all
//! other fills, and optionally strokes, go through the stencil buffer.
//! At [`Renderer::flush`] every call is replayed against a [`Backend`] in
//! submission order, with redundant state changes filtered out.
//!
//! ```ignore
//! use vellum::{Renderer, RendererOptions, Paint, Scissor};
//! use vellum_encoding::{InstructionQueue, PathCache, kurbo::{Circle, Join}};
//!
//! let mut renderer = Renderer::new(backend, RendererOptions::default())?;
//! renderer.begin_frame(width, height, 1.0)?;
//!
//! let mut queue = InstructionQueue::new();
//! queue.shape(&Circle::new((50.0, 50.0), 20.0), 0.1);
//! let mut cache = PathCache::default();
//! cache.flatten(&queue);
//! cache.expand_fill(1.0, Join::Miter, 2.4);
//! renderer.fill(
//!     &Paint::color(Color::RED),
//!     Compose::SrcOver.into(),
//!     &Scissor::none(),
//!     1.0,
//!     cache.bounds(),
//!     cache.paths(),
//! )?;
//! renderer.flush()?;
//! ```

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    unreachable_pub,
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    reason = "Deferred"
)]

mod backend;
mod call;
mod paint;
mod recording;
mod renderer;
mod state;
mod uniforms;
mod vertex_collection;

#[cfg(feature = "wgpu")]
pub mod util;
#[cfg(feature = "wgpu")]
mod wgpu_engine;

pub mod low_level {
    //! Pieces of the renderer that are useful for building or testing
    //! alternative backends.

    pub use crate::call::{Call, CallQueue, PathRange};
    pub use crate::recording::Recording;
    pub use crate::state::{
        BlendFactor, Capability, CompareFunction, Face, FrontFace, GpuCommand, StencilFunc,
        StencilOp, StencilOps, Topology,
    };
    pub use crate::uniforms::{FragUniforms, ShaderType};
    pub use crate::vertex_collection::VertexCollection;
}

pub use backend::{
    Backend, FrameData, ImageFlags, ImageId, TextureDesc, TextureKind, TextureRegion,
};
pub use call::Call;
pub use paint::{Paint, Scissor};
pub use renderer::Renderer;
pub use state::CompositeOperationState;

pub use peniko;
pub use peniko::kurbo;
pub use vellum_encoding;

#[cfg(feature = "wgpu")]
pub use wgpu;
#[cfg(feature = "wgpu")]
pub use wgpu_engine::WgpuBackend;

/// Errors that can occur in Vellum.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Shader or pipeline setup failed when the renderer was created.
    #[error("Failed to compile shaders: {0}")]
    ShaderCompilation(String),
    /// A texture handle that the backend does not know about.
    #[error("Image {0:?} not found")]
    ImageNotFound(ImageId),
    /// Pixel data whose length does not match the texture region.
    #[error("Texture data is {actual} bytes, expected {expected}")]
    InvalidTextureData { expected: usize, actual: usize },
    /// A texture with no texels.
    #[error("Texture size {width}x{height} is empty")]
    EmptyTexture { width: u32, height: u32 },
    /// An update that reaches past the edge of its texture.
    #[error("Region {region:?} does not fit in a {width}x{height} texture")]
    TextureRegionOutOfBounds {
        region: TextureRegion,
        width: u32,
        height: u32,
    },
    /// A frame needs more vertices than 32-bit offsets can address.
    #[error("Too many vertices in one frame")]
    TooManyVertices,
    /// A frame was begun while another one was still recording.
    #[error("A frame is already being recorded")]
    FrameInProgress,
    /// There is no available device with the features required by Vellum.
    #[cfg(feature = "wgpu")]
    #[error("Couldn't find suitable device")]
    NoCompatibleDevice,
    /// A frame was flushed before a render target was set.
    #[cfg(feature = "wgpu")]
    #[error("No render target set")]
    NoRenderTarget,
    /// The device lacks a capability the wgpu backend draws with.
    #[cfg(feature = "wgpu")]
    #[error("Device is missing {0:?}")]
    UnsupportedDevice(wgpu::DownlevelFlags),
    #[cfg(feature = "wgpu")]
    #[error("wgpu Error from scope")]
    WgpuErrorFromScope(#[from] wgpu::Error),
    #[cfg(feature = "wgpu")]
    #[error("Couldn't request a device")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Options chosen when a [`Renderer`] is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RendererOptions {
    /// Fade coverage across a fringe at path edges.
    pub edge_antialias: bool,
    /// Draw strokes through the stencil buffer so overlapping parts of a
    /// stroke are blended once.
    pub stencil_strokes: bool,
    /// Validate GPU work as it is submitted and report errors.
    pub debug: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            edge_antialias: true,
            stencil_strokes: false,
            debug: false,
        }
    }
}

#[cfg(feature = "wgpu")]
static_assertions::assert_impl_all!(Renderer<WgpuBackend>: Send);
static_assertions::assert_impl_all!(Renderer<low_level::Recording>: Send);
