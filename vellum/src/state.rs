// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GL-style pipeline state commands and the filter that skips redundant ones.

use peniko::Compose;

use crate::backend::{Backend, ImageId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    CullFace,
    Blend,
    DepthTest,
    ScissorTest,
    StencilTest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Separate color and alpha blend factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompositeOperationState {
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl CompositeOperationState {
    /// The same factors for color and alpha.
    pub const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }
}

impl Default for CompositeOperationState {
    fn default() -> Self {
        Compose::SrcOver.into()
    }
}

impl From<Compose> for CompositeOperationState {
    /// Porter-Duff operators on premultiplied colors.
    fn from(compose: Compose) -> Self {
        use BlendFactor::*;
        let (src, dst) = match compose {
            Compose::Clear => (Zero, Zero),
            Compose::Copy => (One, Zero),
            Compose::Dest => (Zero, One),
            Compose::SrcOver => (One, OneMinusSrcAlpha),
            Compose::DestOver => (OneMinusDstAlpha, One),
            Compose::SrcIn => (DstAlpha, Zero),
            Compose::DestIn => (Zero, SrcAlpha),
            Compose::SrcOut => (OneMinusDstAlpha, Zero),
            Compose::DestOut => (Zero, OneMinusSrcAlpha),
            Compose::SrcAtop => (DstAlpha, OneMinusSrcAlpha),
            Compose::DestAtop => (OneMinusDstAlpha, SrcAlpha),
            Compose::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
            Compose::Plus | Compose::PlusLighter => (One, One),
        };
        Self::new(src, dst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFunc {
    pub func: CompareFunction,
    pub reference: u32,
    pub mask: u32,
}

impl StencilFunc {
    pub const fn new(func: CompareFunction, reference: u32, mask: u32) -> Self {
        Self {
            func,
            reference,
            mask,
        }
    }
}

/// Actions on stencil test failure, depth test failure and pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilOps {
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl StencilOps {
    pub const KEEP: Self = Self::on_pass(StencilOp::Keep);
    pub const ZERO: Self = Self {
        fail: StencilOp::Zero,
        depth_fail: StencilOp::Zero,
        pass: StencilOp::Zero,
    };

    /// Keeps the stencil value unless the test passes.
    pub const fn on_pass(pass: StencilOp) -> Self {
        Self {
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass,
        }
    }
}

/// A single state change or draw, in the order the renderer issues them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GpuCommand {
    Enable(Capability),
    Disable(Capability),
    CullFace(Face),
    FrontFace(FrontFace),
    ColorMask(bool),
    StencilMask(u32),
    StencilFunc(StencilFunc),
    StencilOp { face: Face, ops: StencilOps },
    BlendFuncSeparate(CompositeOperationState),
    /// Binds a texture, or none, for the following draws.
    BindTexture(Option<ImageId>),
    /// Selects the uniform block at a byte offset into the frame's uniforms.
    BindUniforms(u32),
    Draw {
        topology: Topology,
        first: u32,
        count: u32,
    },
}

/// The last state set through the filtered commands.
///
/// `None` means unknown; the next command of that kind is always issued.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct StateFilter {
    blend: Option<CompositeOperationState>,
    stencil_mask: Option<u32>,
    stencil_func: Option<StencilFunc>,
    texture: Option<Option<ImageId>>,
}

impl StateFilter {
    /// Records the baseline established at the start of a flush. Blending is
    /// left unknown.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            blend: None,
            stencil_mask: Some(!0),
            stencil_func: Some(StencilFunc::new(CompareFunction::Always, 0, !0)),
            texture: Some(None),
        };
    }
}

/// Issues commands to a backend, dropping state changes that would not
/// change anything.
pub(crate) struct Encoder<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    filter: &'a mut StateFilter,
}

impl<'a, B: Backend + ?Sized> Encoder<'a, B> {
    pub(crate) fn new(backend: &'a mut B, filter: &'a mut StateFilter) -> Self {
        Self { backend, filter }
    }

    /// Issues a command without consulting the filter.
    pub(crate) fn raw(&mut self, command: GpuCommand) {
        self.backend.execute(&command);
    }

    pub(crate) fn enable(&mut self, capability: Capability) {
        self.raw(GpuCommand::Enable(capability));
    }

    pub(crate) fn disable(&mut self, capability: Capability) {
        self.raw(GpuCommand::Disable(capability));
    }

    pub(crate) fn color_mask(&mut self, write: bool) {
        self.raw(GpuCommand::ColorMask(write));
    }

    pub(crate) fn stencil_op(&mut self, face: Face, ops: StencilOps) {
        self.raw(GpuCommand::StencilOp { face, ops });
    }

    pub(crate) fn bind_uniforms(&mut self, offset: u32) {
        self.raw(GpuCommand::BindUniforms(offset));
    }

    pub(crate) fn draw(&mut self, topology: Topology, first: u32, count: u32) {
        if count > 0 {
            self.raw(GpuCommand::Draw {
                topology,
                first,
                count,
            });
        }
    }

    pub(crate) fn blend_func(&mut self, blend: CompositeOperationState) {
        if self.filter.blend != Some(blend) {
            self.filter.blend = Some(blend);
            self.raw(GpuCommand::BlendFuncSeparate(blend));
        }
    }

    pub(crate) fn stencil_mask(&mut self, mask: u32) {
        if self.filter.stencil_mask != Some(mask) {
            self.filter.stencil_mask = Some(mask);
            self.raw(GpuCommand::StencilMask(mask));
        }
    }

    pub(crate) fn stencil_func(&mut self, func: CompareFunction, reference: u32, mask: u32) {
        let func = StencilFunc::new(func, reference, mask);
        if self.filter.stencil_func != Some(func) {
            self.filter.stencil_func = Some(func);
            self.raw(GpuCommand::StencilFunc(func));
        }
    }

    pub(crate) fn bind_texture(&mut self, image: Option<ImageId>) {
        if self.filter.texture != Some(image) {
            self.filter.texture = Some(image);
            self.raw(GpuCommand::BindTexture(image));
        }
    }
}
