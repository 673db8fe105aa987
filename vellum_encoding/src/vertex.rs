// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

use crate::math::Point;

/// A shader-ready vertex.
///
/// `u` and `v` are the antialiasing coordinates read by the fragment stage:
/// `u` runs across a stroke or fringe from `0` on one edge to `1` on the
/// other, with `0.5` on the centre line, and `v` fades coverage towards `0`
/// past the end of a butt or square cap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
}

impl Vertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self { x, y, u, v }
    }

    pub(crate) fn at(p: Point, u: f32, v: f32) -> Self {
        Self::new(p.x, p.y, u, v)
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}
