// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::ops::Range;

use crate::backend::{Backend, ImageId};
use crate::state::{
    Capability, CompareFunction, CompositeOperationState, Encoder, Face, StencilOp, StencilOps,
    Topology,
};
use crate::Result;

/// Where one path's geometry lives in the frame's vertex collection.
///
/// A path without fill or stroke geometry has a zero count for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathRange {
    pub fill_offset: u32,
    pub fill_count: u32,
    pub stroke_offset: u32,
    pub stroke_count: u32,
}

/// A draw operation recorded during a frame.
///
/// `paths` indexes the [`PathRange`]s owned by the [`CallQueue`]. Uniform
/// fields are byte offsets into the frame's uniform blocks.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    /// A single convex path, drawn directly.
    ConvexFill {
        image: Option<ImageId>,
        paths: Range<usize>,
        uniforms: u32,
        blend: CompositeOperationState,
    },
    /// Arbitrary paths, drawn by accumulating winding in the stencil buffer
    /// and then covering the four bounding vertices at `bounds_offset`.
    Fill {
        image: Option<ImageId>,
        paths: Range<usize>,
        bounds_offset: u32,
        stencil_uniforms: u32,
        uniforms: u32,
        blend: CompositeOperationState,
    },
    Stroke {
        image: Option<ImageId>,
        paths: Range<usize>,
        uniforms: u32,
        blend: CompositeOperationState,
    },
    /// A stroke drawn through the stencil buffer so that overlapping parts
    /// are blended once.
    StencilStroke {
        image: Option<ImageId>,
        paths: Range<usize>,
        stencil_uniforms: u32,
        uniforms: u32,
        blend: CompositeOperationState,
    },
    /// A raw triangle list.
    Triangles {
        image: Option<ImageId>,
        first: u32,
        count: u32,
        uniforms: u32,
        blend: CompositeOperationState,
    },
}

impl Call {
    pub fn blend(&self) -> CompositeOperationState {
        match self {
            Self::ConvexFill { blend, .. }
            | Self::Fill { blend, .. }
            | Self::Stroke { blend, .. }
            | Self::StencilStroke { blend, .. }
            | Self::Triangles { blend, .. } => *blend,
        }
    }

    pub fn image(&self) -> Option<ImageId> {
        match self {
            Self::ConvexFill { image, .. }
            | Self::Fill { image, .. }
            | Self::Stroke { image, .. }
            | Self::StencilStroke { image, .. }
            | Self::Triangles { image, .. } => *image,
        }
    }

    fn run<B: Backend + ?Sized>(
        &self,
        ranges: &[PathRange],
        encoder: &mut Encoder<'_, B>,
        edge_antialias: bool,
    ) {
        encoder.blend_func(self.blend());
        match self {
            Self::ConvexFill {
                image,
                paths,
                uniforms,
                ..
            } => {
                set_uniforms(encoder, *uniforms, *image);
                for path in &ranges[paths.clone()] {
                    encoder.draw(Topology::TriangleFan, path.fill_offset, path.fill_count);
                    // Fringe.
                    encoder.draw(
                        Topology::TriangleStrip,
                        path.stroke_offset,
                        path.stroke_count,
                    );
                }
            }
            Self::Fill {
                image,
                paths,
                bounds_offset,
                stencil_uniforms,
                uniforms,
                ..
            } => {
                let paths = &ranges[paths.clone()];

                // Accumulate winding into the stencil buffer.
                encoder.enable(Capability::StencilTest);
                encoder.stencil_mask(0xff);
                encoder.stencil_func(CompareFunction::Always, 0, 0xff);
                encoder.color_mask(false);
                set_uniforms(encoder, *stencil_uniforms, None);
                encoder.stencil_op(Face::Front, StencilOps::on_pass(StencilOp::IncrementWrap));
                encoder.stencil_op(Face::Back, StencilOps::on_pass(StencilOp::DecrementWrap));
                encoder.disable(Capability::CullFace);
                for path in paths {
                    encoder.draw(Topology::TriangleFan, path.fill_offset, path.fill_count);
                }
                encoder.enable(Capability::CullFace);

                // Antialiased edges, outside the stenciled area.
                encoder.color_mask(true);
                set_uniforms(encoder, *uniforms, *image);
                if edge_antialias {
                    encoder.stencil_func(CompareFunction::Equal, 0, 0xff);
                    encoder.stencil_op(Face::FrontAndBack, StencilOps::KEEP);
                    draw_strips(encoder, paths);
                }

                // Cover the bounds where the winding is non-zero, zeroing the
                // stencil as we go.
                encoder.stencil_func(CompareFunction::NotEqual, 0, 0xff);
                encoder.stencil_op(Face::FrontAndBack, StencilOps::ZERO);
                encoder.draw(Topology::TriangleStrip, *bounds_offset, 4);
                encoder.disable(Capability::StencilTest);
            }
            Self::Stroke {
                image,
                paths,
                uniforms,
                ..
            } => {
                set_uniforms(encoder, *uniforms, *image);
                draw_strips(encoder, &ranges[paths.clone()]);
            }
            Self::StencilStroke {
                image,
                paths,
                stencil_uniforms,
                uniforms,
                ..
            } => {
                let paths = &ranges[paths.clone()];

                encoder.enable(Capability::StencilTest);
                encoder.stencil_mask(0xff);

                // Solid interior, marking each pixel once.
                encoder.stencil_func(CompareFunction::Equal, 0, 0xff);
                encoder.stencil_op(Face::FrontAndBack, StencilOps::on_pass(StencilOp::Increment));
                set_uniforms(encoder, *stencil_uniforms, *image);
                draw_strips(encoder, paths);

                // Antialiased edges around the marked pixels.
                set_uniforms(encoder, *uniforms, *image);
                encoder.stencil_func(CompareFunction::Equal, 0, 0xff);
                encoder.stencil_op(Face::FrontAndBack, StencilOps::KEEP);
                draw_strips(encoder, paths);

                // Clear the stencil.
                encoder.color_mask(false);
                encoder.stencil_func(CompareFunction::Always, 0, 0xff);
                encoder.stencil_op(Face::FrontAndBack, StencilOps::ZERO);
                draw_strips(encoder, paths);
                encoder.color_mask(true);

                encoder.disable(Capability::StencilTest);
            }
            Self::Triangles {
                image,
                first,
                count,
                uniforms,
                ..
            } => {
                set_uniforms(encoder, *uniforms, *image);
                encoder.draw(Topology::Triangles, *first, *count);
            }
        }
    }
}

fn draw_strips<B: Backend + ?Sized>(encoder: &mut Encoder<'_, B>, paths: &[PathRange]) {
    for path in paths {
        encoder.draw(
            Topology::TriangleStrip,
            path.stroke_offset,
            path.stroke_count,
        );
    }
}

fn set_uniforms<B: Backend + ?Sized>(
    encoder: &mut Encoder<'_, B>,
    offset: u32,
    image: Option<ImageId>,
) {
    encoder.bind_uniforms(offset);
    encoder.bind_texture(image);
}

/// The calls of one frame, in submission order.
#[derive(Clone, Debug, Default)]
pub struct CallQueue {
    calls: Vec<Call>,
    paths: Vec<PathRange>,
}

impl CallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, call: Call) {
        self.calls.push(call);
    }

    /// Stores the ranges of a call's paths and returns their indices.
    ///
    /// Stops at the first failed range, keeping none of them.
    pub fn push_paths(
        &mut self,
        ranges: impl IntoIterator<Item = Result<PathRange>>,
    ) -> Result<Range<usize>> {
        let start = self.paths.len();
        for range in ranges {
            match range {
                Ok(range) => self.paths.push(range),
                Err(err) => {
                    self.paths.truncate(start);
                    return Err(err);
                }
            }
        }
        Ok(start..self.paths.len())
    }

    /// Forgets every path range from index `len` on.
    pub fn truncate_paths(&mut self, len: usize) {
        self.paths.truncate(len);
    }

    pub fn has_pending(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn paths(&self) -> &[PathRange] {
        &self.paths
    }

    pub fn clear(&mut self) {
        self.calls.clear();
        self.paths.clear();
    }

    /// Issues every call, in order.
    pub(crate) fn run<B: Backend + ?Sized>(
        &self,
        encoder: &mut Encoder<'_, B>,
        edge_antialias: bool,
    ) {
        for call in &self.calls {
            call.run(&self.paths, encoder, edge_antialias);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::low_level::Recording;
    use crate::state::{GpuCommand, StateFilter};

    fn draws(commands: &[GpuCommand]) -> Vec<(Topology, u32, u32)> {
        commands
            .iter()
            .filter_map(|c| match *c {
                GpuCommand::Draw {
                    topology,
                    first,
                    count,
                } => Some((topology, first, count)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fill_stencils_then_covers() {
        let mut queue = CallQueue::new();
        let paths = queue
            .push_paths(
                [
                    PathRange {
                        fill_offset: 0,
                        fill_count: 5,
                        stroke_offset: 5,
                        stroke_count: 12,
                    },
                    PathRange {
                        fill_offset: 17,
                        fill_count: 4,
                        stroke_offset: 21,
                        stroke_count: 10,
                    },
                ]
                .map(Ok),
            )
            .unwrap();
        queue.enqueue(Call::Fill {
            image: None,
            paths,
            bounds_offset: 31,
            stencil_uniforms: 0,
            uniforms: 256,
            blend: CompositeOperationState::default(),
        });

        let mut backend = Recording::default();
        let mut filter = StateFilter::default();
        queue.run(&mut Encoder::new(&mut backend, &mut filter), true);
        assert_eq!(
            draws(&backend.commands),
            [
                (Topology::TriangleFan, 0, 5),
                (Topology::TriangleFan, 17, 4),
                (Topology::TriangleStrip, 5, 12),
                (Topology::TriangleStrip, 21, 10),
                (Topology::TriangleStrip, 31, 4),
            ]
        );
        assert_eq!(
            backend.commands.last(),
            Some(&GpuCommand::Disable(Capability::StencilTest))
        );

        // Without antialiasing the fringes are skipped.
        let mut backend = Recording::default();
        queue.run(&mut Encoder::new(&mut backend, &mut filter), false);
        assert_eq!(draws(&backend.commands).len(), 3);
    }

    #[test]
    fn stencil_stroke_draws_three_passes() {
        let mut queue = CallQueue::new();
        let paths = queue
            .push_paths([Ok(PathRange {
                stroke_offset: 0,
                stroke_count: 10,
                ..Default::default()
            })])
            .unwrap();
        queue.enqueue(Call::StencilStroke {
            image: None,
            paths,
            stencil_uniforms: 256,
            uniforms: 0,
            blend: CompositeOperationState::default(),
        });
        let mut backend = Recording::default();
        let mut filter = StateFilter::default();
        queue.run(&mut Encoder::new(&mut backend, &mut filter), true);
        assert_eq!(draws(&backend.commands).len(), 3);
        let uniforms: Vec<_> = backend
            .commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::BindUniforms(offset) => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(uniforms, [256, 0]);
    }

    #[test]
    fn empty_ranges_are_not_drawn() {
        let mut queue = CallQueue::new();
        let paths = queue.push_paths([PathRange::default(); 3].map(Ok)).unwrap();
        queue.enqueue(Call::Stroke {
            image: None,
            paths,
            uniforms: 0,
            blend: CompositeOperationState::default(),
        });
        let mut backend = Recording::default();
        let mut filter = StateFilter::default();
        queue.run(&mut Encoder::new(&mut backend, &mut filter), true);
        assert!(draws(&backend.commands).is_empty());
        queue.clear();
        assert!(!queue.has_pending());
        assert!(queue.paths().is_empty());
    }
}
