// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};
use peniko::kurbo::Affine;
use peniko::Color;

use crate::backend::{ImageFlags, TextureDesc, TextureKind};
use crate::paint::{Paint, Scissor};

/// Selects the fragment shading path. Must match `fill.wgsl`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ShaderType {
    FillGradient = 0,
    FillImage = 1,
    /// Flat white, used while writing the stencil buffer.
    Simple = 2,
    /// Textured triangles addressed by their own texture coordinates.
    Image = 3,
}

/// The fragment uniform block. Must match `FragUniforms` in `fill.wgsl`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FragUniforms {
    /// Inverse scissor transform, as three padded columns.
    pub scissor_mat: [f32; 12],
    /// Inverse paint transform, as three padded columns.
    pub paint_mat: [f32; 12],
    /// Premultiplied.
    pub inner_color: [f32; 4],
    /// Premultiplied.
    pub outer_color: [f32; 4],
    pub scissor_ext: [f32; 2],
    pub scissor_scale: [f32; 2],
    pub extent: [f32; 2],
    pub radius: f32,
    pub feather: f32,
    pub stroke_mult: f32,
    /// Fragments with less stroke coverage than this are discarded.
    pub stroke_thr: f32,
    pub tex_type: i32,
    pub shader_type: i32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<FragUniforms>(), 176);

impl FragUniforms {
    /// Uniforms for passes that only write the stencil buffer.
    pub fn stencil() -> Self {
        Self {
            stroke_thr: -1.0,
            shader_type: ShaderType::Simple as i32,
            ..Self::zeroed()
        }
    }

    /// Converts a paint and scissor for geometry of the given `width`.
    ///
    /// `texture` describes `paint.image`; when it is `None` the paint is
    /// treated as a gradient.
    pub fn from_paint(
        paint: &Paint,
        scissor: &Scissor,
        width: f32,
        fringe: f32,
        stroke_thr: f32,
        texture: Option<&TextureDesc>,
    ) -> Self {
        // Coverage is measured in fringes, which must not be zero.
        let fringe = if fringe > 0.0 { fringe } else { 1.0 };
        let mut frag = Self {
            inner_color: premultiply(paint.inner_color),
            outer_color: premultiply(paint.outer_color),
            extent: paint.extent,
            stroke_mult: (width * 0.5 + fringe * 0.5) / fringe,
            stroke_thr,
            ..Self::zeroed()
        };

        if scissor.is_none() {
            frag.scissor_ext = [1.0, 1.0];
            frag.scissor_scale = [1.0, 1.0];
        } else {
            let [a, b, c, d, _, _] = scissor.transform.as_coeffs();
            frag.scissor_mat = to_mat3x4(inverse(scissor.transform));
            frag.scissor_ext = scissor.extent;
            frag.scissor_scale = [
                (a.hypot(c) as f32) / fringe,
                (b.hypot(d) as f32) / fringe,
            ];
        }

        let paint_transform = match texture {
            Some(desc) => {
                frag.shader_type = ShaderType::FillImage as i32;
                frag.tex_type = tex_type(desc);
                if desc.flags.contains(ImageFlags::FLIP_Y) {
                    let half = f64::from(frag.extent[1]) * 0.5;
                    paint.transform
                        * Affine::translate((0.0, half))
                        * Affine::scale_non_uniform(1.0, -1.0)
                        * Affine::translate((0.0, -half))
                } else {
                    paint.transform
                }
            }
            None => {
                frag.shader_type = ShaderType::FillGradient as i32;
                frag.radius = paint.radius;
                frag.feather = paint.feather;
                paint.transform
            }
        };
        frag.paint_mat = to_mat3x4(inverse(paint_transform));
        frag
    }
}

/// How the shader interprets texels: premultiplied RGBA, straight RGBA, or
/// coverage in the red channel.
fn tex_type(desc: &TextureDesc) -> i32 {
    match desc.kind {
        TextureKind::Rgba if desc.flags.contains(ImageFlags::PREMULTIPLIED) => 0,
        TextureKind::Rgba => 1,
        TextureKind::Alpha => 2,
    }
}

fn premultiply(color: Color) -> [f32; 4] {
    let a = f32::from(color.a) / 255.0;
    [
        f32::from(color.r) / 255.0 * a,
        f32::from(color.g) / 255.0 * a,
        f32::from(color.b) / 255.0 * a,
        a,
    ]
}

/// Singular transforms invert to the identity.
fn inverse(transform: Affine) -> Affine {
    if transform.determinant().abs() < 1e-6 {
        Affine::IDENTITY
    } else {
        transform.inverse()
    }
}

fn to_mat3x4(transform: Affine) -> [f32; 12] {
    let [a, b, c, d, e, f] = transform.as_coeffs().map(|x| x as f32);
    [a, b, 0.0, 0.0, c, d, 0.0, 0.0, e, f, 1.0, 0.0]
}

/// Uniform blocks for one frame, each at a stride satisfying the backend's
/// alignment.
#[derive(Clone, Debug)]
pub(crate) struct UniformBuffer {
    data: Vec<u8>,
    stride: usize,
}

impl UniformBuffer {
    pub(crate) fn new(alignment: u32) -> Self {
        let size = core::mem::size_of::<FragUniforms>();
        let alignment = (alignment as usize).max(1);
        Self {
            data: Vec::new(),
            stride: size.div_ceil(alignment) * alignment,
        }
    }

    /// Appends a block and returns its byte offset.
    pub(crate) fn push(&mut self, uniforms: &FragUniforms) -> u32 {
        let offset = self.data.len();
        self.data.resize(offset + self.stride, 0);
        let bytes = bytemuck::bytes_of(uniforms);
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        offset as u32
    }

    #[cfg(test)]
    pub(crate) fn stride(&self) -> usize {
        self.stride
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len() / self.stride
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_aligned() {
        let mut buffer = UniformBuffer::new(256);
        assert_eq!(buffer.stride(), 256);
        assert_eq!(buffer.push(&FragUniforms::stencil()), 0);
        assert_eq!(buffer.push(&FragUniforms::default()), 256);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.as_bytes().len(), 512);

        let packed = UniformBuffer::new(16);
        assert_eq!(packed.stride(), 176);
    }

    #[test]
    fn colors_are_premultiplied() {
        let paint = Paint::color(Color::rgba8(255, 0, 0, 51));
        let frag = FragUniforms::from_paint(&paint, &Scissor::none(), 1.0, 1.0, -1.0, None);
        assert_eq!(frag.inner_color, [0.2, 0.0, 0.0, 0.2]);
        assert_eq!(frag.shader_type, ShaderType::FillGradient as i32);
        assert_eq!(frag.scissor_ext, [1.0, 1.0]);
        assert_eq!(frag.stroke_mult, 1.0);
    }

    #[test]
    fn texture_kind_selects_tex_type() {
        let desc = TextureDesc {
            kind: TextureKind::Alpha,
            width: 4,
            height: 4,
            flags: ImageFlags::empty(),
        };
        let paint = Paint::color(Color::WHITE);
        let frag = FragUniforms::from_paint(&paint, &Scissor::none(), 1.0, 1.0, -1.0, Some(&desc));
        assert_eq!(frag.shader_type, ShaderType::FillImage as i32);
        assert_eq!(frag.tex_type, 2);
        let rgba = TextureDesc {
            kind: TextureKind::Rgba,
            flags: ImageFlags::PREMULTIPLIED,
            ..desc
        };
        assert_eq!(tex_type(&rgba), 0);
    }

    #[test]
    fn scissor_is_inverted() {
        let scissor = Scissor::new(Affine::translate((10.0, 20.0)), [5.0, 5.0]);
        let paint = Paint::color(Color::WHITE);
        let frag = FragUniforms::from_paint(&paint, &scissor, 1.0, 1.0, -1.0, None);
        assert_eq!(frag.scissor_mat[8], -10.0);
        assert_eq!(frag.scissor_mat[9], -20.0);
        assert_eq!(frag.scissor_scale, [1.0, 1.0]);
    }
}
