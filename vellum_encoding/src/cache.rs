// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::ops::Range;

use bitflags::bitflags;

use crate::config::TessellationConfig;
use crate::math::{polygon_area, Point, PI};
use crate::vertex::Vertex;

/// Maximum recursion depth when subdividing a cubic Bézier.
const MAX_BEZIER_DEPTH: u32 = 10;

/// Extrusion vectors are clamped to this length, so that joins between
/// nearly antiparallel segments stay bounded.
const MAX_EXTRUSION: f32 = 600.0;

/// Turns smaller than this, in either direction, count as collinear.
const TURN_EPSILON: f32 = 1e-6;

/// Fill orientation of a contour.
///
/// Orientation is judged as seen on a y-down screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Winding {
    /// Counter-clockwise. Used for solid shapes.
    #[default]
    Ccw,
    /// Clockwise. Used for holes.
    Cw,
}

impl Winding {
    pub const SOLID: Self = Self::Ccw;
    pub const HOLE: Self = Self::Cw;
}

bitflags! {
    /// Per-point flags computed by join analysis.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PointFlags: u8 {
        /// The point was an explicit vertex of the input, not a curve sample.
        const CORNER = 1 << 0;
        /// The path turns left at this point.
        const LEFT = 1 << 1;
        /// The outer side of the join gets a bevel.
        const BEVEL = 1 << 2;
        /// The segments are too short for the inner side to be mitered.
        const INNER_BEVEL = 1 << 3;
    }
}

/// A flattened point with the segment and join data derived from it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PathPoint {
    pub pos: Point,
    /// Unit direction towards the next point of the contour.
    pub dir: Point,
    /// Distance to the next point of the contour.
    pub len: f32,
    /// Extrusion vector of the join at this point, scaled so that offsetting
    /// by `dm * half_width` lands on the miter tip.
    pub dm: Point,
    pub flags: PointFlags,
}

impl PathPoint {
    fn new(pos: Point, flags: PointFlags) -> Self {
        Self {
            pos,
            flags,
            ..Default::default()
        }
    }
}

/// One flattened contour, stored as ranges into the owning [`PathCache`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Path {
    pub(crate) first: usize,
    pub(crate) count: usize,
    pub(crate) closed: bool,
    pub(crate) bevel_count: usize,
    pub(crate) winding: Winding,
    pub(crate) convex: bool,
    pub(crate) fill: Range<usize>,
    pub(crate) stroke: Range<usize>,
}

impl Path {
    pub(crate) fn points(&self) -> Range<usize> {
        self.first..self.first + self.count
    }
}

/// Axis aligned bounding box of everything that was flattened.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Bounds that contain nothing. Any point added replaces them.
    pub const EMPTY: Self = Self {
        min: Point::new(f32::MAX, f32::MAX),
        max: Point::new(f32::MIN, f32::MIN),
    };

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn width(&self) -> f32 {
        (self.max.x - self.min.x).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.max.y - self.min.y).max(0.0)
    }

    pub fn add_point(&mut self, p: Point) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Borrowed view of one contour's generated geometry.
#[derive(Clone, Copy, Debug)]
pub struct RenderPath<'a> {
    /// Interior fan vertices. Empty when the contour has no fill geometry.
    pub fill: &'a [Vertex],
    /// Triangle strip for the stroke or the antialiasing fringe.
    pub stroke: &'a [Vertex],
    pub points: &'a [PathPoint],
    pub closed: bool,
    pub convex: bool,
    pub winding: Winding,
}

/// Flattened contours and the geometry expanded from them.
///
/// The cache is reused between draws; each [`PathCache::flatten`] replaces
/// its contents, and each expansion replaces the generated vertices.
#[derive(Clone, Debug, Default)]
pub struct PathCache {
    pub(crate) config: TessellationConfig,
    pub(crate) points: Vec<PathPoint>,
    pub(crate) paths: Vec<Path>,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) bounds: Bounds,
}

impl PathCache {
    pub fn new(config: TessellationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &TessellationConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TessellationConfig) {
        self.config = config;
    }

    /// Drops all contours and generated geometry, keeping allocations.
    pub fn clear(&mut self) {
        self.points.clear();
        self.paths.clear();
        self.vertices.clear();
        self.bounds = Bounds::EMPTY;
    }

    /// Replays `instructions` into fresh contours.
    ///
    /// Afterwards every contour has its winding enforced, its segment
    /// directions and lengths computed, and [`PathCache::bounds`] covers all
    /// of its points.
    pub fn flatten<'a, I>(&mut self, instructions: I)
    where
        I: IntoIterator<Item = &'a crate::Instruction>,
    {
        self.clear();
        for instruction in instructions {
            instruction.apply(self);
        }
        self.finish_paths();
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// All generated vertices, in the order they were produced.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Whether the cache holds exactly one convex contour.
    pub fn is_convex(&self) -> bool {
        self.paths.len() == 1 && self.paths[0].convex
    }

    pub fn paths(&self) -> impl ExactSizeIterator<Item = RenderPath<'_>> + '_ {
        self.paths.iter().map(|path| RenderPath {
            fill: &self.vertices[path.fill.clone()],
            stroke: &self.vertices[path.stroke.clone()],
            points: &self.points[path.points()],
            closed: path.closed,
            convex: path.convex,
            winding: path.winding,
        })
    }

    pub(crate) fn begin_path(&mut self) {
        self.paths.push(Path {
            first: self.points.len(),
            ..Default::default()
        });
    }

    pub(crate) fn add_point(&mut self, pos: Point, flags: PointFlags) {
        let distance_tolerance = self.config.distance_tolerance;
        let Some(path) = self.paths.last_mut() else {
            return;
        };
        if path.count > 0 {
            if let Some(last) = self.points.last_mut() {
                if last.pos.approx_eq(pos, distance_tolerance) {
                    last.flags |= flags;
                    return;
                }
            }
        }
        self.points.push(PathPoint::new(pos, flags));
        path.count += 1;
    }

    pub(crate) fn close_path(&mut self) {
        if let Some(path) = self.paths.last_mut() {
            path.closed = true;
        }
    }

    pub(crate) fn set_winding(&mut self, winding: Winding) {
        if let Some(path) = self.paths.last_mut() {
            path.winding = winding;
        }
    }

    pub(crate) fn last_point(&self) -> Option<Point> {
        let path = self.paths.last()?;
        if path.count == 0 {
            return None;
        }
        self.points.last().map(|p| p.pos)
    }

    /// Appends the flattening of a cubic Bézier from the current point.
    pub(crate) fn add_cubic(&mut self, p1: Point, p2: Point, p3: Point) {
        let Some(p0) = self.last_point() else {
            // An open contour without points starts at the curve's end.
            self.add_point(p3, PointFlags::CORNER);
            return;
        };
        self.tessellate_cubic(p0, p1, p2, p3, 0, PointFlags::CORNER);
    }

    fn tessellate_cubic(
        &mut self,
        p0: Point,
        p1: Point,
        p2: Point,
        p3: Point,
        depth: u32,
        flags: PointFlags,
    ) {
        if depth > MAX_BEZIER_DEPTH {
            self.add_point(p3, flags);
            return;
        }
        let d = p3 - p0;
        let d2 = ((p1.x - p3.x) * d.y - (p1.y - p3.y) * d.x).abs();
        let d3 = ((p2.x - p3.x) * d.y - (p2.y - p3.y) * d.x).abs();
        let tol = self.config.tolerance;
        if (d2 + d3) * (d2 + d3) < tol * tol * d.dot(d) {
            self.add_point(p3, flags);
            return;
        }
        let p01 = (p0 + p1) * 0.5;
        let p12 = (p1 + p2) * 0.5;
        let p23 = (p2 + p3) * 0.5;
        let p012 = (p01 + p12) * 0.5;
        let p123 = (p12 + p23) * 0.5;
        let mid = (p012 + p123) * 0.5;
        self.tessellate_cubic(p0, p01, p012, mid, depth + 1, PointFlags::empty());
        self.tessellate_cubic(mid, p123, p23, p3, depth + 1, flags);
    }

    /// Finalizes contours after all instructions were applied.
    fn finish_paths(&mut self) {
        let distance_tolerance = self.config.distance_tolerance;
        let mut bounds = Bounds::EMPTY;
        for path in &mut self.paths {
            let pts = &mut self.points[path.first..path.first + path.count];
            if pts.iter().any(|p| p.pos.is_nan()) {
                log::warn!("Dropping a contour with NaN coordinates");
                path.count = 0;
                continue;
            }
            // A contour that ends where it started is closed.
            if path.count > 1 {
                let first = pts[0].pos;
                let last = pts[path.count - 1].pos;
                if first.approx_eq(last, distance_tolerance) {
                    path.count -= 1;
                    path.closed = true;
                }
            }
            let pts = &mut self.points[path.first..path.first + path.count];
            if path.count > 2 {
                let area = polygon_area(pts.iter().map(|p| p.pos));
                // In screen space a counter-clockwise contour has negative area.
                let reverse = match path.winding {
                    Winding::Ccw => area > 0.0,
                    Winding::Cw => area < 0.0,
                };
                if reverse {
                    pts.reverse();
                }
            }
            let n = pts.len();
            for i in 0..n {
                let next = pts[(i + 1) % n].pos;
                let p = &mut pts[i];
                let (dir, len) = (next - p.pos).normalize();
                p.dir = dir;
                p.len = len;
                bounds.add_point(p.pos);
            }
        }
        self.bounds = bounds;
    }

    /// Computes extrusion vectors, join flags and convexity.
    ///
    /// `half_width` is the distance from the centre line to the outer edge of
    /// the geometry about to be generated.
    pub(crate) fn calculate_joins(
        &mut self,
        half_width: f32,
        join: peniko::kurbo::Join,
        miter_limit: f32,
    ) {
        use peniko::kurbo::Join;

        let inv_width = if half_width > 0.0 { 1.0 / half_width } else { 0.0 };
        for path in &mut self.paths {
            path.bevel_count = 0;
            path.convex = false;
            let n = path.count;
            if n == 0 {
                continue;
            }
            let pts = &mut self.points[path.first..path.first + n];
            let mut left_turns = 0;
            let mut right_turns = 0;
            let mut turning = 0.0_f32;
            for i in 0..n {
                let p0 = pts[(i + n - 1) % n];
                let p1 = &mut pts[i];
                let dl0 = p0.dir.perp();
                let dl1 = p1.dir.perp();
                let mut dm = (dl0 + dl1) * 0.5;
                let dmr2 = dm.dot(dm);
                if dmr2 > 1e-6 {
                    let scale = (1.0 / dmr2).min(MAX_EXTRUSION);
                    dm = dm * scale;
                }
                p1.dm = dm;
                p1.flags = if p1.flags.contains(PointFlags::CORNER) {
                    PointFlags::CORNER
                } else {
                    PointFlags::empty()
                };

                let cross = p1.dir.cross(p0.dir);
                if cross > TURN_EPSILON {
                    left_turns += 1;
                    p1.flags.insert(PointFlags::LEFT);
                } else if cross < -TURN_EPSILON {
                    right_turns += 1;
                }
                turning += (-cross).atan2(p0.dir.dot(p1.dir));

                let limit = (p0.len.min(p1.len) * inv_width).max(1.01);
                if dmr2 * limit * limit < 1.0 {
                    p1.flags.insert(PointFlags::INNER_BEVEL);
                }
                if p1.flags.contains(PointFlags::CORNER)
                    && (dmr2 * miter_limit * miter_limit < 1.0
                        || matches!(join, Join::Bevel | Join::Round))
                {
                    p1.flags.insert(PointFlags::BEVEL);
                }
                if p1.flags.contains(PointFlags::BEVEL)
                    || p1.flags.contains(PointFlags::INNER_BEVEL)
                {
                    path.bevel_count += 1;
                }
            }
            // Self-intersecting contours such as stars turn more than once.
            let simple = turning.abs() < 3.0 * PI;
            path.convex = n > 2 && right_turns == 0 && left_turns > 0 && simple;
        }
    }
}
