// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;

use vellum_encoding::Vertex;

use crate::backend::{Backend, FrameData, ImageId, TextureDesc, TextureRegion};
use crate::state::GpuCommand;
use crate::{Error, RendererOptions, Result};

/// A backend that records everything it is asked to do instead of drawing.
///
/// Useful for inspecting the command stream a frame produces.
#[derive(Debug)]
pub struct Recording {
    /// Commands issued since the recording was created or last cleared.
    pub commands: Vec<GpuCommand>,
    /// The vertices uploaded by the most recent frame.
    pub vertices: Vec<Vertex>,
    /// The uniform bytes uploaded by the most recent frame.
    pub uniforms: Vec<u8>,
    pub view_size: [f32; 2],
    /// Number of frames that reached [`Backend::end_frame`].
    pub frames: usize,
    pub options: Option<RendererOptions>,
    alignment: u32,
    textures: HashMap<ImageId, TextureDesc>,
}

impl Recording {
    pub fn new(uniform_alignment: u32) -> Self {
        Self {
            commands: Vec::new(),
            vertices: Vec::new(),
            uniforms: Vec::new(),
            view_size: [0.0; 2],
            frames: 0,
            options: None,
            alignment: uniform_alignment,
            textures: HashMap::new(),
        }
    }

    /// Forgets the recorded commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Backend for Recording {
    fn create(&mut self, options: &RendererOptions) -> Result<()> {
        self.options = Some(*options);
        Ok(())
    }

    fn uniform_alignment(&self) -> u32 {
        self.alignment
    }

    fn create_texture(
        &mut self,
        id: ImageId,
        desc: TextureDesc,
        _data: Option<&[u8]>,
    ) -> Result<()> {
        self.textures.insert(id, desc);
        Ok(())
    }

    fn update_texture(&mut self, id: ImageId, region: TextureRegion, _data: &[u8]) -> Result<()> {
        self.textures
            .get(&id)
            .ok_or(Error::ImageNotFound(id))?
            .check_region(region)
    }

    fn delete_texture(&mut self, id: ImageId) -> Result<()> {
        self.textures
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::ImageNotFound(id))
    }

    fn texture_desc(&self, id: ImageId) -> Option<TextureDesc> {
        self.textures.get(&id).copied()
    }

    fn begin_frame(&mut self, frame: FrameData<'_>) -> Result<()> {
        self.view_size = frame.view_size;
        self.vertices.clear();
        self.vertices.extend_from_slice(frame.vertices);
        self.uniforms.clear();
        self.uniforms.extend_from_slice(frame.uniforms);
        Ok(())
    }

    fn execute(&mut self, command: &GpuCommand) {
        self.commands.push(*command);
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}
