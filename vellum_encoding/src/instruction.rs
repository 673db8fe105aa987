// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use peniko::kurbo::{self, Affine, PathEl, Shape};

use crate::cache::{PathCache, PointFlags, Winding};
use crate::math::Point;

/// A single recorded path command, already in device space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Instruction {
    /// Starts a new contour.
    MoveTo(Point),
    LineTo(Point),
    /// Cubic Bézier from the current point.
    BezierTo {
        control1: Point,
        control2: Point,
        end: Point,
    },
    /// Marks the current contour as closed.
    Close,
    /// Sets the fill orientation of the current contour.
    Winding(Winding),
}

impl Instruction {
    /// Applies this instruction to the contours being built in `cache`.
    pub fn apply(&self, cache: &mut PathCache) {
        match *self {
            Self::MoveTo(p) => {
                cache.begin_path();
                cache.add_point(p, PointFlags::CORNER);
            }
            Self::LineTo(p) => cache.add_point(p, PointFlags::CORNER),
            Self::BezierTo {
                control1,
                control2,
                end,
            } => cache.add_cubic(control1, control2, end),
            Self::Close => cache.close_path(),
            Self::Winding(winding) => cache.set_winding(winding),
        }
    }
}

/// Records path commands, transforming coordinates as they are added.
///
/// The transform in effect when a command is recorded is baked into it, so
/// changing the transform later does not affect earlier commands.
#[derive(Clone, Debug, Default)]
pub struct InstructionQueue {
    instructions: Vec<Instruction>,
    transform: Affine,
    /// Current point in device space.
    current: Option<Point>,
}

impl InstructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    fn map(&self, x: f32, y: f32) -> Point {
        Point::from_kurbo(self.transform * kurbo::Point::new(x.into(), y.into()))
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.current = Some(p);
        self.instructions.push(Instruction::MoveTo(p));
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.current = Some(p);
        self.instructions.push(Instruction::LineTo(p));
    }

    pub fn bezier_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) {
        let end = self.map(x, y);
        self.instructions.push(Instruction::BezierTo {
            control1: self.map(c1x, c1y),
            control2: self.map(c2x, c2y),
            end,
        });
        self.current = Some(end);
    }

    /// Records a quadratic Bézier, elevated to a cubic.
    ///
    /// Without a current point this behaves like [`InstructionQueue::move_to`]
    /// to the end point.
    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        let Some(p0) = self.current else {
            self.move_to(x, y);
            return;
        };
        let c = self.map(cx, cy);
        let end = self.map(x, y);
        self.instructions.push(Instruction::BezierTo {
            control1: p0 + (c - p0) * (2.0 / 3.0),
            control2: end + (c - end) * (2.0 / 3.0),
            end,
        });
        self.current = Some(end);
    }

    pub fn close(&mut self) {
        self.instructions.push(Instruction::Close);
    }

    pub fn winding(&mut self, winding: Winding) {
        self.instructions.push(Instruction::Winding(winding));
    }

    /// Records every element of a kurbo shape.
    pub fn shape(&mut self, shape: &impl Shape, tolerance: f64) {
        for el in shape.path_elements(tolerance) {
            let f = |p: kurbo::Point| (p.x as f32, p.y as f32);
            match el {
                PathEl::MoveTo(p) => {
                    let (x, y) = f(p);
                    self.move_to(x, y);
                }
                PathEl::LineTo(p) => {
                    let (x, y) = f(p);
                    self.line_to(x, y);
                }
                PathEl::QuadTo(c, p) => {
                    let ((cx, cy), (x, y)) = (f(c), f(p));
                    self.quad_to(cx, cy, x, y);
                }
                PathEl::CurveTo(c1, c2, p) => {
                    let ((c1x, c1y), (c2x, c2y), (x, y)) = (f(c1), f(c2), f(p));
                    self.bezier_to(c1x, c1y, c2x, c2y, x, y);
                }
                PathEl::ClosePath => self.close(),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Drops all commands. The transform is kept.
    pub fn clear(&mut self) {
        self.instructions.clear();
        self.current = None;
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl<'a> IntoIterator for &'a InstructionQueue {
    type Item = &'a Instruction;
    type IntoIter = core::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_is_applied_when_recording() {
        let mut queue = InstructionQueue::new();
        queue.set_transform(Affine::translate((10.0, 20.0)));
        queue.move_to(1.0, 2.0);
        queue.set_transform(Affine::IDENTITY);
        queue.line_to(1.0, 2.0);
        let recorded: Vec<_> = queue.iter().copied().collect();
        assert_eq!(
            recorded,
            [
                Instruction::MoveTo(Point::new(11.0, 22.0)),
                Instruction::LineTo(Point::new(1.0, 2.0)),
            ]
        );
    }

    #[test]
    fn quad_is_elevated() {
        let mut queue = InstructionQueue::new();
        queue.move_to(0.0, 0.0);
        queue.quad_to(3.0, 3.0, 6.0, 0.0);
        let Some(Instruction::BezierTo {
            control1,
            control2,
            end,
        }) = queue.iter().nth(1).copied()
        else {
            panic!("expected a cubic");
        };
        assert_eq!(control1, Point::new(2.0, 2.0));
        assert_eq!(control2, Point::new(4.0, 2.0));
        assert_eq!(end, Point::new(6.0, 0.0));
    }

    #[test]
    fn shapes_record_closed_contours() {
        let mut queue = InstructionQueue::new();
        queue.shape(&kurbo::Rect::new(0.0, 0.0, 4.0, 4.0), 0.1);
        assert!(matches!(queue.iter().next(), Some(Instruction::MoveTo(_))));
        assert_eq!(queue.iter().last(), Some(&Instruction::Close));

        let mut cache = PathCache::default();
        cache.flatten(&queue);
        assert_eq!(cache.path_count(), 1);
        assert!(cache.paths().next().unwrap().closed);

        queue.clear();
        assert!(queue.is_empty());
    }
}
