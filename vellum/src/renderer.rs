// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use vellum_encoding::{Bounds, RenderPath, Vertex};

use crate::backend::{Backend, FrameData, ImageId, TextureDesc, TextureKind, TextureRegion};
use crate::call::{Call, CallQueue, PathRange};
use crate::paint::{Paint, Scissor};
use crate::state::{
    Capability, CompareFunction, CompositeOperationState, Encoder, Face, FrontFace, GpuCommand,
    StateFilter, StencilFunc, StencilOps,
};
use crate::uniforms::{FragUniforms, ShaderType, UniformBuffer};
use crate::vertex_collection::VertexCollection;
use crate::{Error, ImageFlags, RendererOptions, Result};

/// Stencil strokes discard fragments below this coverage in their first
/// pass, leaving the faint edge to the second.
const STROKE_THRESHOLD: f32 = 1.0 - 0.5 / 255.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameState {
    Idle,
    Recording,
}

/// Batches fills and strokes into draw calls for a [`Backend`].
///
/// A frame starts with [`Renderer::begin_frame`], or implicitly with the
/// first draw, and ends with [`Renderer::flush`] or [`Renderer::cancel`].
#[derive(Debug)]
pub struct Renderer<B: Backend> {
    backend: B,
    options: RendererOptions,
    state: FrameState,
    view_size: [f32; 2],
    device_pixel_ratio: f32,
    vertices: VertexCollection,
    calls: CallQueue,
    uniforms: UniformBuffer,
    filter: StateFilter,
}

impl<B: Backend> Renderer<B> {
    /// Creates a renderer, preparing the backend's shaders.
    pub fn new(mut backend: B, options: RendererOptions) -> Result<Self> {
        backend.create(&options)?;
        log::debug!("Created renderer with {options:?}");
        let uniforms = UniformBuffer::new(backend.uniform_alignment());
        Ok(Self {
            backend,
            options,
            state: FrameState::Idle,
            view_size: [0.0; 2],
            device_pixel_ratio: 1.0,
            vertices: VertexCollection::new(),
            calls: CallQueue::new(),
            uniforms,
            filter: StateFilter::default(),
        })
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Whether fringes were enabled at creation.
    pub fn edge_antialias(&self) -> bool {
        self.options.edge_antialias
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Starts recording a frame of the given logical size.
    pub fn begin_frame(&mut self, width: f32, height: f32, device_pixel_ratio: f32) -> Result<()> {
        if self.state == FrameState::Recording {
            return Err(Error::FrameInProgress);
        }
        self.viewport(width, height, device_pixel_ratio);
        self.start_recording();
        Ok(())
    }

    /// Sets the viewport uploaded at the next flush.
    pub fn viewport(&mut self, width: f32, height: f32, device_pixel_ratio: f32) {
        self.view_size = [width, height];
        self.device_pixel_ratio = device_pixel_ratio;
    }

    pub fn is_recording(&self) -> bool {
        self.state == FrameState::Recording
    }

    pub fn pending_calls(&self) -> &[Call] {
        self.calls.calls()
    }

    pub fn pending_vertices(&self) -> &[Vertex] {
        self.vertices.as_slice()
    }

    pub fn path_ranges(&self) -> &[PathRange] {
        self.calls.paths()
    }

    fn start_recording(&mut self) {
        if self.state == FrameState::Idle {
            log::trace!("Recording frame of size {:?}", self.view_size);
            self.state = FrameState::Recording;
        }
    }

    /// Looks up the texture a paint refers to.
    fn paint_texture(&self, paint: &Paint) -> (Option<ImageId>, Option<TextureDesc>) {
        let Some(image) = paint.image else {
            return (None, None);
        };
        match self.backend.texture_desc(image) {
            Some(desc) => (Some(image), Some(desc)),
            None => {
                log::warn!("Paint refers to unknown image {image:?}, drawing without it");
                (None, None)
            }
        }
    }

    /// Runs `record`, discarding the vertices and path ranges it added if
    /// it fails.
    fn rollback_on_error(&mut self, record: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let vertices = self.vertices.len();
        let paths = self.calls.paths().len();
        let result = record(self);
        if result.is_err() {
            self.vertices.truncate(vertices);
            self.calls.truncate_paths(paths);
        }
        result
    }

    /// Fills `paths`, which must have been expanded with
    /// [`PathCache::expand_fill`](vellum_encoding::PathCache::expand_fill).
    ///
    /// `bounds` must cover every path. A single convex path is drawn
    /// directly, anything else through the stencil buffer.
    ///
    /// Fails with [`Error::TooManyVertices`] if the frame can no longer
    /// address the geometry. Nothing is recorded in that case.
    pub fn fill<'a>(
        &mut self,
        paint: &Paint,
        composite: CompositeOperationState,
        scissor: &Scissor,
        fringe_width: f32,
        bounds: Bounds,
        paths: impl IntoIterator<Item = RenderPath<'a>>,
    ) -> Result<()> {
        self.start_recording();
        self.rollback_on_error(|this| {
            this.record_fill(paint, composite, scissor, fringe_width, bounds, paths)
        })
    }

    fn record_fill<'a>(
        &mut self,
        paint: &Paint,
        composite: CompositeOperationState,
        scissor: &Scissor,
        fringe_width: f32,
        bounds: Bounds,
        paths: impl IntoIterator<Item = RenderPath<'a>>,
    ) -> Result<()> {
        let mut convex = false;
        let vertices = &mut self.vertices;
        let paths = self.calls.push_paths(paths.into_iter().map(|path| -> Result<PathRange> {
            convex = path.convex;
            let fill = vertices.append(path.fill)?;
            let stroke = vertices.append(path.stroke)?;
            Ok(PathRange {
                fill_offset: fill.start,
                fill_count: fill.end - fill.start,
                stroke_offset: stroke.start,
                stroke_count: stroke.end - stroke.start,
            })
        }))?;
        if paths.is_empty() {
            return Ok(());
        }

        let (image, texture) = self.paint_texture(paint);
        let frag = FragUniforms::from_paint(
            paint,
            scissor,
            fringe_width,
            fringe_width,
            -1.0,
            texture.as_ref(),
        );

        let call = if paths.len() == 1 && convex {
            Call::ConvexFill {
                image,
                paths,
                uniforms: self.uniforms.push(&frag),
                blend: composite,
            }
        } else {
            let (min, max) = if bounds.is_empty() {
                Default::default()
            } else {
                (bounds.min, bounds.max)
            };
            let quad = [
                Vertex::new(max.x, max.y, 0.5, 1.0),
                Vertex::new(max.x, min.y, 0.5, 1.0),
                Vertex::new(min.x, max.y, 0.5, 1.0),
                Vertex::new(min.x, min.y, 0.5, 1.0),
            ];
            let bounds_offset = self.vertices.append(&quad)?.start;
            let stencil_uniforms = self.uniforms.push(&FragUniforms::stencil());
            Call::Fill {
                image,
                paths,
                bounds_offset,
                stencil_uniforms,
                uniforms: self.uniforms.push(&frag),
                blend: composite,
            }
        };
        self.calls.enqueue(call);
        Ok(())
    }

    /// Strokes `paths`, which must have been expanded with
    /// [`PathCache::expand_stroke`](vellum_encoding::PathCache::expand_stroke).
    pub fn stroke<'a>(
        &mut self,
        paint: &Paint,
        composite: CompositeOperationState,
        scissor: &Scissor,
        fringe_width: f32,
        stroke_width: f32,
        paths: impl IntoIterator<Item = RenderPath<'a>>,
    ) -> Result<()> {
        self.start_recording();
        self.rollback_on_error(|this| {
            this.record_stroke(paint, composite, scissor, fringe_width, stroke_width, paths)
        })
    }

    fn record_stroke<'a>(
        &mut self,
        paint: &Paint,
        composite: CompositeOperationState,
        scissor: &Scissor,
        fringe_width: f32,
        stroke_width: f32,
        paths: impl IntoIterator<Item = RenderPath<'a>>,
    ) -> Result<()> {
        let vertices = &mut self.vertices;
        let paths = self.calls.push_paths(paths.into_iter().map(|path| -> Result<PathRange> {
            if path.stroke.is_empty() {
                return Ok(PathRange::default());
            }
            let stroke = vertices.append(path.stroke)?;
            Ok(PathRange {
                stroke_offset: stroke.start,
                stroke_count: stroke.end - stroke.start,
                ..Default::default()
            })
        }))?;
        if paths.is_empty() {
            return Ok(());
        }

        let (image, texture) = self.paint_texture(paint);
        let frag = |stroke_thr| {
            FragUniforms::from_paint(
                paint,
                scissor,
                stroke_width,
                fringe_width,
                stroke_thr,
                texture.as_ref(),
            )
        };

        let call = if self.options.stencil_strokes {
            let uniforms = self.uniforms.push(&frag(-1.0));
            let stencil_uniforms = self.uniforms.push(&frag(STROKE_THRESHOLD));
            Call::StencilStroke {
                image,
                paths,
                stencil_uniforms,
                uniforms,
                blend: composite,
            }
        } else {
            Call::Stroke {
                image,
                paths,
                uniforms: self.uniforms.push(&frag(-1.0)),
                blend: composite,
            }
        };
        self.calls.enqueue(call);
        Ok(())
    }

    /// Draws a raw triangle list. The vertices' `u` and `v` address the
    /// paint's image directly.
    pub fn triangles(
        &mut self,
        paint: &Paint,
        composite: CompositeOperationState,
        scissor: &Scissor,
        fringe_width: f32,
        vertices: &[Vertex],
    ) -> Result<()> {
        self.start_recording();
        if vertices.is_empty() {
            return Ok(());
        }
        let range = self.vertices.append(vertices)?;
        let (image, texture) = self.paint_texture(paint);
        let mut frag =
            FragUniforms::from_paint(paint, scissor, 1.0, fringe_width, -1.0, texture.as_ref());
        frag.shader_type = ShaderType::Image as i32;
        self.calls.enqueue(Call::Triangles {
            image,
            first: range.start,
            count: range.end - range.start,
            uniforms: self.uniforms.push(&frag),
            blend: composite,
        });
        Ok(())
    }

    /// Discards everything recorded since the last flush.
    pub fn cancel(&mut self) {
        if self.state == FrameState::Recording {
            log::trace!("Cancelled frame with {} calls", self.calls.calls().len());
        }
        self.reset_frame();
    }

    /// Submits the recorded calls to the backend.
    ///
    /// The recorded frame is discarded afterwards, whether or not
    /// submission succeeded.
    pub fn flush(&mut self) -> Result<()> {
        let result = if self.calls.has_pending() {
            self.submit()
        } else {
            Ok(())
        };
        self.reset_frame();
        result
    }

    fn submit(&mut self) -> Result<()> {
        log::debug!(
            "Flushing {} calls, {} vertices, {} uniform blocks",
            self.calls.calls().len(),
            self.vertices.len(),
            self.uniforms.len(),
        );
        self.backend.begin_frame(FrameData {
            view_size: self.view_size,
            device_pixel_ratio: self.device_pixel_ratio,
            vertices: self.vertices.as_slice(),
            uniforms: self.uniforms.as_bytes(),
        })?;

        self.filter.reset();
        let mut encoder = Encoder::new(&mut self.backend, &mut self.filter);
        encoder.enable(Capability::CullFace);
        encoder.raw(GpuCommand::CullFace(Face::Back));
        encoder.raw(GpuCommand::FrontFace(FrontFace::Ccw));
        encoder.enable(Capability::Blend);
        encoder.disable(Capability::DepthTest);
        encoder.disable(Capability::ScissorTest);
        encoder.color_mask(true);
        encoder.raw(GpuCommand::StencilMask(!0));
        encoder.stencil_op(Face::FrontAndBack, StencilOps::KEEP);
        encoder.raw(GpuCommand::StencilFunc(StencilFunc::new(
            CompareFunction::Always,
            0,
            !0,
        )));
        encoder.raw(GpuCommand::BindTexture(None));

        self.calls.run(&mut encoder, self.options.edge_antialias);

        encoder.disable(Capability::CullFace);
        encoder.bind_texture(None);
        self.backend.end_frame()
    }

    fn reset_frame(&mut self) {
        self.vertices.clear();
        self.calls.clear();
        self.uniforms.clear();
        self.state = FrameState::Idle;
    }

    /// Creates a texture. `data`, when given, must hold exactly
    /// `width * height` pixels of `kind`.
    ///
    /// Both dimensions must be non-zero.
    pub fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
        flags: ImageFlags,
        data: Option<&[u8]>,
    ) -> Result<ImageId> {
        let desc = TextureDesc {
            kind,
            width,
            height,
            flags,
        };
        if desc.is_empty() {
            return Err(Error::EmptyTexture { width, height });
        }
        if let Some(data) = data {
            check_len(desc.data_len(width, height), data.len())?;
        }
        let id = ImageId::next();
        self.backend.create_texture(id, desc, data)?;
        Ok(id)
    }

    /// Replaces `region` of a texture with tightly packed `data`.
    ///
    /// The region must lie within the texture.
    pub fn update_texture(
        &mut self,
        image: ImageId,
        region: TextureRegion,
        data: &[u8],
    ) -> Result<()> {
        let desc = self
            .backend
            .texture_desc(image)
            .ok_or(Error::ImageNotFound(image))?;
        desc.check_region(region)?;
        check_len(desc.data_len(region.width, region.height), data.len())?;
        self.backend.update_texture(image, region, data)
    }

    pub fn delete_texture(&mut self, image: ImageId) -> Result<()> {
        self.backend.delete_texture(image)
    }

    /// Width and height of a texture.
    pub fn texture_size(&self, image: ImageId) -> Result<(u32, u32)> {
        self.backend
            .texture_desc(image)
            .map(|desc| (desc.width, desc.height))
            .ok_or(Error::ImageNotFound(image))
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::InvalidTextureData { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use peniko::Color;
    use vellum_encoding::kurbo::{Cap, Join};
    use vellum_encoding::{Instruction, PathCache};
    use vellum_encoding::math::Point;

    use super::*;
    use crate::low_level::Recording;

    fn renderer(options: RendererOptions) -> Renderer<Recording> {
        Renderer::new(Recording::default(), options).unwrap()
    }

    fn square() -> PathCache {
        let mut cache = PathCache::default();
        cache.flatten(&[
            Instruction::MoveTo(Point::new(0., 0.)),
            Instruction::LineTo(Point::new(10., 0.)),
            Instruction::LineTo(Point::new(10., 10.)),
            Instruction::LineTo(Point::new(0., 10.)),
            Instruction::Close,
        ]);
        cache
    }

    fn fill(renderer: &mut Renderer<Recording>, cache: &PathCache) {
        renderer.fill(
            &Paint::color(Color::BLACK),
            CompositeOperationState::default(),
            &Scissor::none(),
            1.0,
            cache.bounds(),
            cache.paths(),
        )
        .unwrap();
    }

    #[test]
    fn frame_lifecycle() {
        let mut renderer = renderer(RendererOptions::default());
        assert!(!renderer.is_recording());
        renderer.begin_frame(100.0, 100.0, 1.0).unwrap();
        assert!(matches!(
            renderer.begin_frame(100.0, 100.0, 1.0),
            Err(Error::FrameInProgress)
        ));
        renderer.flush().unwrap();
        assert!(!renderer.is_recording());

        // Drawing starts a frame implicitly.
        let mut cache = square();
        cache.expand_fill(1.0, Join::Miter, 2.4);
        fill(&mut renderer, &cache);
        assert!(renderer.is_recording());
        renderer.cancel();
        renderer.cancel();
        assert!(!renderer.is_recording());
        renderer.begin_frame(100.0, 100.0, 1.0).unwrap();
    }

    #[test]
    fn cancel_leaves_filter_untouched() {
        let mut renderer = renderer(RendererOptions::default());
        let mut cache = square();
        cache.expand_fill(1.0, Join::Miter, 2.4);
        fill(&mut renderer, &cache);
        renderer.flush().unwrap();
        let filter = renderer.filter;
        let commands = renderer.backend().commands.len();

        fill(&mut renderer, &cache);
        renderer.cancel();
        renderer.flush().unwrap();
        assert_eq!(renderer.filter, filter);
        assert_eq!(renderer.backend().commands.len(), commands);
        assert!(renderer.pending_calls().is_empty());
        assert!(renderer.pending_vertices().is_empty());
        assert_eq!(renderer.uniforms.len(), 0);
    }

    #[test]
    fn flush_uploads_once_and_restores_state() {
        let mut renderer = renderer(RendererOptions::default());
        renderer.viewport(200.0, 100.0, 2.0);
        let mut cache = square();
        cache.expand_fill(1.0, Join::Miter, 2.4);
        fill(&mut renderer, &cache);
        let vertices = renderer.pending_vertices().to_vec();
        renderer.flush().unwrap();

        let backend = renderer.backend();
        assert_eq!(backend.frames, 1);
        assert_eq!(backend.vertices, vertices);
        assert_eq!(backend.view_size, [200.0, 100.0]);
        assert_eq!(
            backend.commands.first(),
            Some(&GpuCommand::Enable(Capability::CullFace))
        );
        assert!(backend
            .commands
            .contains(&GpuCommand::Disable(Capability::CullFace)));
    }

    #[test]
    fn strokes_use_stencil_when_enabled() {
        let mut cache = square();
        cache.expand_stroke(1.0, 1.0, Cap::Butt, Join::Miter, 10.0);
        for stencil_strokes in [false, true] {
            let mut renderer = renderer(RendererOptions {
                stencil_strokes,
                ..Default::default()
            });
            renderer.stroke(
                &Paint::color(Color::BLACK),
                CompositeOperationState::default(),
                &Scissor::none(),
                1.0,
                2.0,
                cache.paths(),
            )
            .unwrap();
            match (stencil_strokes, renderer.pending_calls()) {
                (false, [Call::Stroke { .. }]) => {}
                (true, [Call::StencilStroke {
                    stencil_uniforms,
                    uniforms,
                    ..
                }]) => assert_ne!(stencil_uniforms, uniforms),
                (_, calls) => panic!("unexpected calls {calls:?}"),
            }
        }
    }

    #[test]
    fn texture_data_is_validated() {
        let mut renderer = renderer(RendererOptions::default());
        let err = renderer
            .create_texture(TextureKind::Rgba, 2, 2, ImageFlags::empty(), Some(&[0; 15]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTextureData {
                expected: 16,
                actual: 15
            }
        ));
        let image = renderer
            .create_texture(TextureKind::Alpha, 2, 2, ImageFlags::empty(), Some(&[0; 4]))
            .unwrap();
        assert_eq!(renderer.texture_size(image).unwrap(), (2, 2));
        let region = TextureRegion {
            x: 1,
            y: 0,
            width: 1,
            height: 2,
        };
        renderer.update_texture(image, region, &[255, 255]).unwrap();
        renderer.delete_texture(image).unwrap();
        assert!(matches!(
            renderer.texture_size(image),
            Err(Error::ImageNotFound(_))
        ));
    }

    #[test]
    fn unknown_images_fall_back_to_gradients() {
        let mut renderer = renderer(RendererOptions::default());
        let mut paint = Paint::color(Color::WHITE);
        paint.image = Some(ImageId::next());
        let quad = [Vertex::default(); 3];
        renderer.triangles(
            &paint,
            CompositeOperationState::default(),
            &Scissor::none(),
            1.0,
            &quad,
        )
        .unwrap();
        assert_eq!(renderer.pending_calls()[0].image(), None);
    }

    #[test]
    fn texture_updates_must_fit() {
        let mut renderer = renderer(RendererOptions::default());
        assert!(matches!(
            renderer.create_texture(TextureKind::Rgba, 0, 0, ImageFlags::empty(), Some(&[])),
            Err(Error::EmptyTexture {
                width: 0,
                height: 0
            })
        ));
        assert!(matches!(
            renderer.create_texture(TextureKind::Alpha, 4, 0, ImageFlags::empty(), None),
            Err(Error::EmptyTexture { .. })
        ));
        assert_eq!(renderer.backend().texture_count(), 0);

        let image = renderer
            .create_texture(TextureKind::Alpha, 2, 2, ImageFlags::empty(), None)
            .unwrap();
        let overhanging = TextureRegion {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        };
        assert!(matches!(
            renderer.update_texture(image, overhanging, &[0; 4]),
            Err(Error::TextureRegionOutOfBounds {
                width: 2,
                height: 2,
                ..
            })
        ));
        let wrapping = TextureRegion {
            x: u32::MAX,
            y: 0,
            width: 2,
            height: 1,
        };
        assert!(matches!(
            renderer.update_texture(image, wrapping, &[0; 2]),
            Err(Error::TextureRegionOutOfBounds { .. })
        ));
        let corner = TextureRegion {
            x: 1,
            y: 1,
            width: 1,
            height: 1,
        };
        assert!(matches!(
            renderer.update_texture(image, corner, &[0; 2]),
            Err(Error::InvalidTextureData {
                expected: 1,
                actual: 2
            })
        ));
        renderer.update_texture(image, corner, &[7]).unwrap();

        let unknown = ImageId::next();
        assert!(matches!(
            renderer.update_texture(unknown, corner, &[7]),
            Err(Error::ImageNotFound(id)) if id == unknown
        ));
        assert!(matches!(
            renderer.delete_texture(unknown),
            Err(Error::ImageNotFound(_))
        ));
    }

    #[test]
    fn fills_past_the_vertex_limit_record_nothing() {
        let mut cache = square();
        cache.expand_fill(1.0, Join::Miter, 2.4);
        let mut reference = renderer(RendererOptions::default());
        fill(&mut reference, &cache);
        let used = reference.pending_vertices().len() as u32;

        let mut renderer = renderer(RendererOptions::default());
        renderer.vertices = VertexCollection::with_limit(2 * used - 1);
        fill(&mut renderer, &cache);
        let err = renderer
            .fill(
                &Paint::color(Color::BLACK),
                CompositeOperationState::default(),
                &Scissor::none(),
                1.0,
                cache.bounds(),
                cache.paths(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::TooManyVertices));
        assert_eq!(renderer.pending_vertices().len(), used as usize);
        assert_eq!(renderer.path_ranges().len(), 1);
        assert_eq!(renderer.pending_calls().len(), 1);
        renderer.flush().unwrap();
        assert_eq!(renderer.backend().frames, 1);
    }
}
