// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A [`Backend`] that replays the renderer's command stream with wgpu.
//!
//! GL style state changes are folded into a shadow state. Each draw captures
//! that state as a [`PipelineKey`], and all draws of a frame are recorded
//! into a single render pass when the frame ends.

use std::collections::HashMap;
use std::num::NonZeroU64;

use peniko::Color;
use wgpu::util::DeviceExt;
use wgpu::{
    Adapter, BindGroup, BindGroupLayout, Buffer, Device, DownlevelFlags, PipelineLayout, Queue,
    RenderPipeline, ShaderModule, Texture, TextureFormat, TextureView,
};

use vellum_encoding::Vertex;

use crate::backend::{
    Backend, FrameData, ImageFlags, ImageId, TextureDesc, TextureKind, TextureRegion,
};
use crate::state::{
    BlendFactor, Capability, CompareFunction, CompositeOperationState, Face, FrontFace,
    GpuCommand, StencilFunc, StencilOp, StencilOps, Topology,
};
use crate::uniforms::FragUniforms;
use crate::{Error, RendererOptions, Result};

const SHADER: &str = include_str!("../shaders/fill.wgsl");
const STENCIL_FORMAT: TextureFormat = TextureFormat::Stencil8;
const VIEW_SIZE: u64 = 16;
/// Fans are drawn through a shared index buffer offset by a base vertex.
const REQUIRED_DOWNLEVEL_FLAGS: DownlevelFlags = DownlevelFlags::BASE_VERTEX;

/// The GL state most recently set through [`GpuCommand`]s.
#[derive(Clone, Copy, Debug)]
struct GlState {
    cull: bool,
    cull_face: Face,
    front_face: FrontFace,
    blend_enabled: bool,
    stencil_test: bool,
    color_write: bool,
    stencil_mask: u32,
    stencil_func: StencilFunc,
    front_ops: StencilOps,
    back_ops: StencilOps,
    blend: CompositeOperationState,
    texture: Option<ImageId>,
    uniforms: u32,
}

impl Default for GlState {
    fn default() -> Self {
        Self {
            cull: false,
            cull_face: Face::Back,
            front_face: FrontFace::Ccw,
            blend_enabled: false,
            stencil_test: false,
            color_write: true,
            stencil_mask: !0,
            stencil_func: StencilFunc::new(CompareFunction::Always, 0, !0),
            front_ops: StencilOps::KEEP,
            back_ops: StencilOps::KEEP,
            blend: CompositeOperationState::default(),
            texture: None,
            uniforms: 0,
        }
    }
}

impl GlState {
    fn set(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::CullFace => self.cull = enabled,
            Capability::Blend => self.blend_enabled = enabled,
            Capability::StencilTest => self.stencil_test = enabled,
            // Neither a depth buffer nor a scissor rectangle is ever bound.
            Capability::DepthTest | Capability::ScissorTest => {}
        }
    }

    /// The pipeline a draw with this state needs, or `None` if it would
    /// rasterize nothing.
    fn pipeline_key(&self, topology: Topology) -> Option<PipelineKey> {
        let cull = match (self.cull, self.cull_face) {
            (false, _) => None,
            (true, Face::FrontAndBack) => return None,
            (true, face) => Some(face),
        };
        Some(PipelineKey {
            strip: topology == Topology::TriangleStrip,
            cull,
            front_face: self.front_face,
            color_write: self.color_write,
            blend: self.blend_enabled.then_some(self.blend),
            stencil: self.stencil_test.then_some(StencilKey {
                compare: self.stencil_func.func,
                read_mask: self.stencil_func.mask,
                write_mask: self.stencil_mask,
                front: self.front_ops,
                back: self.back_ops,
            }),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct StencilKey {
    compare: CompareFunction,
    read_mask: u32,
    write_mask: u32,
    front: StencilOps,
    back: StencilOps,
}

/// Everything about a draw that wgpu bakes into a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    /// Triangle strips; everything else is drawn as a list.
    strip: bool,
    cull: Option<Face>,
    front_face: FrontFace,
    color_write: bool,
    blend: Option<CompositeOperationState>,
    stencil: Option<StencilKey>,
}

#[derive(Debug)]
struct PendingDraw {
    key: PipelineKey,
    stencil_reference: u32,
    uniforms: u32,
    texture: Option<ImageId>,
    topology: Topology,
    first: u32,
    count: u32,
}

#[derive(Debug)]
struct GpuTexture {
    texture: Texture,
    bind_group: BindGroup,
    desc: TextureDesc,
}

#[derive(Debug)]
struct RenderTarget {
    view: TextureView,
    width: u32,
    height: u32,
}

/// Buffers uploaded by [`Backend::begin_frame`].
#[derive(Debug)]
struct FrameResources {
    vertices: Buffer,
    bind_group: BindGroup,
}

/// Renders into a wgpu texture view.
///
/// A render target must be set with [`WgpuBackend::set_target`] before
/// the first flush.
#[derive(Debug)]
pub struct WgpuBackend {
    device: Device,
    queue: Queue,
    format: TextureFormat,
    downlevel_flags: DownlevelFlags,
    debug: bool,
    uniform_layout: BindGroupLayout,
    texture_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
    shader: Option<ShaderModule>,
    pipelines: HashMap<PipelineKey, RenderPipeline>,
    textures: HashMap<ImageId, GpuTexture>,
    /// Bound when a call has no texture, or an unknown one.
    blank: BindGroup,
    target: Option<RenderTarget>,
    clear_color: Option<Color>,
    stencil: Option<RenderTarget>,
    fan_indices: Option<(Buffer, u32)>,
    frame: Option<FrameResources>,
    state: GlState,
    draws: Vec<PendingDraw>,
}

impl WgpuBackend {
    /// Creates a backend that renders to targets of the given `format`.
    ///
    /// `device` must have been requested from `adapter`.
    pub fn new(adapter: &Adapter, device: Device, queue: Queue, format: TextureFormat) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vellum uniforms"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(VIEW_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(frag_uniforms_size()),
                    },
                    count: None,
                },
            ],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vellum texture"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("vellum"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let white = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("vellum blank"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0xff; 4],
        );
        let blank = texture_bind_group(&device, &texture_layout, &white, ImageFlags::empty());

        Self {
            device,
            queue,
            format,
            downlevel_flags: adapter.get_downlevel_capabilities().flags,
            debug: false,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            shader: None,
            pipelines: HashMap::new(),
            textures: HashMap::new(),
            blank,
            target: None,
            clear_color: None,
            stencil: None,
            fan_indices: None,
            frame: None,
            state: GlState::default(),
            draws: Vec::new(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Sets the view that following frames are drawn into.
    ///
    /// `width` and `height` are the size of the view in pixels.
    pub fn set_target(&mut self, view: TextureView, width: u32, height: u32) {
        self.target = Some(RenderTarget {
            view,
            width,
            height,
        });
    }

    /// Detaches the render target. Flushes fail until another is set.
    pub fn take_target(&mut self) -> Option<TextureView> {
        self.target.take().map(|target| target.view)
    }

    /// Clears the target to `color` at the start of the next frame, instead
    /// of drawing over its contents.
    pub fn set_clear_color(&mut self, color: Option<Color>) {
        self.clear_color = color;
    }

    /// Number of distinct pipelines created so far.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn push_draw(&mut self, topology: Topology, first: u32, count: u32) {
        if topology == Topology::TriangleFan && count < 3 {
            return;
        }
        let Some(key) = self.state.pipeline_key(topology) else {
            return;
        };
        self.draws.push(PendingDraw {
            key,
            stencil_reference: self.state.stencil_func.reference,
            uniforms: self.state.uniforms,
            texture: self.state.texture,
            topology,
            first,
            count,
        });
    }

    fn ensure_stencil(&mut self, width: u32, height: u32) {
        if self
            .stencil
            .as_ref()
            .is_some_and(|s| s.width == width && s.height == height)
        {
            return;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("vellum stencil"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        self.stencil = Some(RenderTarget {
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            width,
            height,
        });
    }

    /// Makes sure indices exist for a triangle fan of `size` vertices.
    fn ensure_fan_indices(&mut self, size: u32) {
        if size < 3 || self.fan_indices.as_ref().is_some_and(|(_, n)| *n >= size) {
            return;
        }
        let indices: Vec<u32> = (1..size - 1).flat_map(|i| [0, i, i + 1]).collect();
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vellum fan indices"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        self.fan_indices = Some((buffer, size));
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let shader = self
            .shader
            .as_ref()
            .ok_or_else(|| Error::ShaderCompilation("backend was never created".into()))?;
        let stencil = match key.stencil {
            Some(stencil) => wgpu::StencilState {
                front: stencil_face(stencil.compare, stencil.front),
                back: stencil_face(stencil.compare, stencil.back),
                read_mask: stencil.read_mask,
                write_mask: stencil.write_mask,
            },
            None => wgpu::StencilState::default(),
        };
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("vellum fill"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: "vs_main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: core::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: key.blend.map(blend_state),
                        write_mask: if key.color_write {
                            wgpu::ColorWrites::ALL
                        } else {
                            wgpu::ColorWrites::empty()
                        },
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: if key.strip {
                        wgpu::PrimitiveTopology::TriangleStrip
                    } else {
                        wgpu::PrimitiveTopology::TriangleList
                    },
                    strip_index_format: None,
                    front_face: match key.front_face {
                        FrontFace::Ccw => wgpu::FrontFace::Ccw,
                        FrontFace::Cw => wgpu::FrontFace::Cw,
                    },
                    cull_mode: key.cull.map(|face| match face {
                        Face::Front => wgpu::Face::Front,
                        Face::Back | Face::FrontAndBack => wgpu::Face::Back,
                    }),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: STENCIL_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil,
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        log::debug!("Created pipeline {} for {key:?}", self.pipelines.len());
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn texture_bind_group(&self, image: Option<ImageId>) -> &BindGroup {
        image
            .and_then(|id| self.textures.get(&id))
            .map_or(&self.blank, |texture| &texture.bind_group)
    }

    /// Records and submits the frame's render pass.
    fn encode_frame(
        &mut self,
        draws: &[PendingDraw],
        frame: Option<&FrameResources>,
    ) -> Result<()> {
        let (width, height) = self
            .target
            .as_ref()
            .map(|target| (target.width, target.height))
            .ok_or(Error::NoRenderTarget)?;

        self.ensure_stencil(width, height);
        for draw in draws {
            self.ensure_pipeline(draw.key)?;
        }
        let largest_fan = draws
            .iter()
            .filter(|draw| draw.topology == Topology::TriangleFan)
            .map(|draw| draw.count)
            .max()
            .unwrap_or(0);
        self.ensure_fan_indices(largest_fan);

        let load = match self.clear_color.take() {
            Some(color) => wgpu::LoadOp::Clear(premultiplied(color)),
            None => wgpu::LoadOp::Load,
        };
        let (Some(target), Some(stencil)) = (&self.target, &self.stencil) else {
            return Err(Error::NoRenderTarget);
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vellum frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vellum frame"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &stencil.view,
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Discard,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(frame) = frame {
                pass.set_vertex_buffer(0, frame.vertices.slice(..));
                if let Some((indices, _)) = &self.fan_indices {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                }
                for draw in draws {
                    let Some(pipeline) = self.pipelines.get(&draw.key) else {
                        continue;
                    };
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &frame.bind_group, &[draw.uniforms]);
                    pass.set_bind_group(1, self.texture_bind_group(draw.texture), &[]);
                    pass.set_stencil_reference(draw.stencil_reference);
                    if draw.topology == Topology::TriangleFan {
                        let base_vertex =
                            i32::try_from(draw.first).map_err(|_| Error::TooManyVertices)?;
                        pass.draw_indexed(0..3 * (draw.count - 2), base_vertex, 0..1);
                    } else {
                        pass.draw(draw.first..draw.first + draw.count, 0..1);
                    }
                }
            }
        }
        self.queue.submit([encoder.finish()]);
        Ok(())
    }
}

impl Backend for WgpuBackend {
    fn create(&mut self, options: &RendererOptions) -> Result<()> {
        check_downlevel_flags(self.downlevel_flags)?;
        self.debug = options.debug;
        let source = format!(
            "const EDGE_AA: bool = {};\n{SHADER}",
            options.edge_antialias
        );
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("vellum fill"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::ShaderCompilation(error.to_string()));
        }
        self.shader = Some(shader);
        self.pipelines.clear();
        Ok(())
    }

    fn uniform_alignment(&self) -> u32 {
        self.device.limits().min_uniform_buffer_offset_alignment
    }

    fn create_texture(
        &mut self,
        id: ImageId,
        desc: TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<()> {
        if desc.is_empty() {
            return Err(Error::EmptyTexture {
                width: desc.width,
                height: desc.height,
            });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("vellum image"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: match desc.kind {
                TextureKind::Alpha => TextureFormat::R8Unorm,
                TextureKind::Rgba => TextureFormat::Rgba8Unorm,
            },
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let bind_group =
            texture_bind_group(&self.device, &self.texture_layout, &texture, desc.flags);
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                bind_group,
                desc,
            },
        );
        if let Some(data) = data {
            self.update_texture(
                id,
                TextureRegion {
                    x: 0,
                    y: 0,
                    width: desc.width,
                    height: desc.height,
                },
                data,
            )?;
        }
        Ok(())
    }

    fn update_texture(&mut self, id: ImageId, region: TextureRegion, data: &[u8]) -> Result<()> {
        let texture = self.textures.get(&id).ok_or(Error::ImageNotFound(id))?;
        texture.desc.check_region(region)?;
        let expected = texture.desc.data_len(region.width, region.height);
        if data.len() != expected {
            return Err(Error::InvalidTextureData {
                expected,
                actual: data.len(),
            });
        }
        let bytes_per_pixel = texture.desc.kind.bytes_per_pixel() as u32;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(region.width * bytes_per_pixel),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn delete_texture(&mut self, id: ImageId) -> Result<()> {
        let texture = self.textures.remove(&id).ok_or(Error::ImageNotFound(id))?;
        texture.texture.destroy();
        Ok(())
    }

    fn texture_desc(&self, id: ImageId) -> Option<TextureDesc> {
        self.textures.get(&id).map(|texture| texture.desc)
    }

    fn begin_frame(&mut self, frame: FrameData<'_>) -> Result<()> {
        self.draws.clear();

        let mut view = [0_u8; VIEW_SIZE as usize];
        view[..8].copy_from_slice(bytemuck::cast_slice(&frame.view_size));
        let view = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vellum view"),
                contents: &view,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        // wgpu rejects empty buffers, and a binding must see a whole block.
        let mut uniforms = frame.uniforms.to_vec();
        let min_uniforms = frag_uniforms_size() as usize;
        if uniforms.len() < min_uniforms {
            uniforms.resize(min_uniforms, 0);
        }
        let uniforms = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vellum uniforms"),
                contents: &uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let blank = [Vertex::default()];
        let vertices = if frame.vertices.is_empty() {
            &blank[..]
        } else {
            frame.vertices
        };
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vellum vertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vellum uniforms"),
            layout: &self.uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: view.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniforms,
                        offset: 0,
                        size: NonZeroU64::new(frag_uniforms_size()),
                    }),
                },
            ],
        });
        self.frame = Some(FrameResources {
            vertices,
            bind_group,
        });
        Ok(())
    }

    fn execute(&mut self, command: &GpuCommand) {
        let state = &mut self.state;
        match *command {
            GpuCommand::Enable(capability) => state.set(capability, true),
            GpuCommand::Disable(capability) => state.set(capability, false),
            GpuCommand::CullFace(face) => state.cull_face = face,
            GpuCommand::FrontFace(front_face) => state.front_face = front_face,
            GpuCommand::ColorMask(write) => state.color_write = write,
            GpuCommand::StencilMask(mask) => state.stencil_mask = mask,
            GpuCommand::StencilFunc(func) => state.stencil_func = func,
            GpuCommand::StencilOp { face, ops } => match face {
                Face::Front => state.front_ops = ops,
                Face::Back => state.back_ops = ops,
                Face::FrontAndBack => {
                    state.front_ops = ops;
                    state.back_ops = ops;
                }
            },
            GpuCommand::BlendFuncSeparate(blend) => state.blend = blend,
            GpuCommand::BindTexture(texture) => state.texture = texture,
            GpuCommand::BindUniforms(offset) => state.uniforms = offset,
            GpuCommand::Draw {
                topology,
                first,
                count,
            } => self.push_draw(topology, first, count),
        }
    }

    fn end_frame(&mut self) -> Result<()> {
        let draws = core::mem::take(&mut self.draws);
        let frame = self.frame.take();
        if !self.debug {
            return self.encode_frame(&draws, frame.as_ref());
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = self.encode_frame(&draws, frame.as_ref());
        let error = pollster::block_on(self.device.pop_error_scope());
        result?;
        if let Some(error) = error {
            log::error!("Validation failed while drawing a frame: {error}");
            return Err(error.into());
        }
        Ok(())
    }
}

fn check_downlevel_flags(flags: DownlevelFlags) -> Result<()> {
    let missing = REQUIRED_DOWNLEVEL_FLAGS - flags;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::UnsupportedDevice(missing))
    }
}

fn frag_uniforms_size() -> u64 {
    core::mem::size_of::<FragUniforms>() as u64
}

fn texture_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    texture: &Texture,
    flags: ImageFlags,
) -> BindGroup {
    let address_mode = |repeat| {
        if repeat {
            wgpu::AddressMode::Repeat
        } else {
            wgpu::AddressMode::ClampToEdge
        }
    };
    let filter = if flags.contains(ImageFlags::NEAREST) {
        wgpu::FilterMode::Nearest
    } else {
        wgpu::FilterMode::Linear
    };
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("vellum image"),
        address_mode_u: address_mode(flags.contains(ImageFlags::REPEAT_X)),
        address_mode_v: address_mode(flags.contains(ImageFlags::REPEAT_Y)),
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("vellum image"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    })
}

fn stencil_face(compare: CompareFunction, ops: StencilOps) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: match compare {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        },
        fail_op: stencil_operation(ops.fail),
        depth_fail_op: stencil_operation(ops.depth_fail),
        pass_op: stencil_operation(ops.pass),
    }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
        StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
        StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
    }
}

fn blend_state(blend: CompositeOperationState) -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(blend.src_rgb),
            dst_factor: blend_factor(blend.dst_rgb),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(blend.src_alpha),
            dst_factor: blend_factor(blend.dst_alpha),
            operation: wgpu::BlendOperation::Add,
        },
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

fn premultiplied(color: Color) -> wgpu::Color {
    let a = f64::from(color.a) / 255.0;
    let channel = |c: u8| f64::from(c) / 255.0 * a;
    wgpu::Color {
        r: channel(color.r),
        g: channel(color.g),
        b: channel(color.b),
        a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_need_base_vertex_support() {
        assert!(check_downlevel_flags(DownlevelFlags::all()).is_ok());
        let flags = DownlevelFlags::all() - DownlevelFlags::BASE_VERTEX;
        assert!(matches!(
            check_downlevel_flags(flags),
            Err(Error::UnsupportedDevice(missing)) if missing == DownlevelFlags::BASE_VERTEX
        ));
    }

    #[test]
    fn culling_both_faces_draws_nothing() {
        let mut state = GlState {
            cull: true,
            cull_face: Face::FrontAndBack,
            ..GlState::default()
        };
        assert!(state.pipeline_key(Topology::Triangles).is_none());
        state.cull = false;
        assert!(state.pipeline_key(Topology::Triangles).is_some());
    }

    #[test]
    fn disabled_tests_are_left_out_of_the_key() {
        let mut state = GlState::default();
        state.stencil_func = StencilFunc::new(CompareFunction::Equal, 0, 0xff);
        state.blend = CompositeOperationState::new(BlendFactor::One, BlendFactor::One);
        let key = state.pipeline_key(Topology::TriangleStrip);
        assert_eq!(key, GlState::default().pipeline_key(Topology::TriangleStrip));

        state.stencil_test = true;
        let stenciled = state.pipeline_key(Topology::TriangleStrip);
        assert_ne!(stenciled, key);
        assert_eq!(
            stenciled.and_then(|key| key.stencil).map(|s| s.compare),
            Some(CompareFunction::Equal)
        );
    }

    #[test]
    fn fans_and_lists_share_pipelines() {
        let state = GlState::default();
        assert_eq!(
            state.pipeline_key(Topology::TriangleFan),
            state.pipeline_key(Topology::Triangles)
        );
        assert_ne!(
            state.pipeline_key(Topology::TriangleFan),
            state.pipeline_key(Topology::TriangleStrip)
        );
    }
}
