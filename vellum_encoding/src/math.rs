// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small `f32` geometry helpers used while flattening and expanding paths.

use core::ops::{Add, Mul, Neg, Sub};

use peniko::kurbo;

pub const PI: f32 = core::f32::consts::PI;

/// A point, or a vector, in device space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// The point `(0, 0)`.
    pub const ZERO: Self = Self::new(0., 0.);

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Converts a kurbo point, narrowing to `f32`.
    pub fn from_kurbo(point: kurbo::Point) -> Self {
        Self::new(point.x as f32, point.y as f32)
    }

    pub fn to_kurbo(self) -> kurbo::Point {
        kurbo::Point::new(self.x.into(), self.y.into())
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// The z component of the 3D cross product of `self` and `other`.
    pub fn cross(self, other: Self) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Returns the unit vector pointing the same way and the original length.
    ///
    /// Vectors shorter than `1e-6` are returned unchanged.
    pub fn normalize(self) -> (Self, f32) {
        let d = self.length();
        if d > 1e-6 {
            (self * (1.0 / d), d)
        } else {
            (self, d)
        }
    }

    /// The vector rotated a quarter turn, `(dy, -dx)`.
    pub fn perp(self) -> Self {
        Self::new(self.y, -self.x)
    }

    pub fn is_nan(self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }

    /// Whether `self` and `other` are within `tolerance` of each other.
    pub fn approx_eq(self, other: Self, tolerance: f32) -> bool {
        let d = other - self;
        d.dot(d) < tolerance * tolerance
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Twice the signed area of the triangle `a`, `b`, `c`.
pub fn triangle_area2(a: Point, b: Point, c: Point) -> f32 {
    (b - a).cross(c - a)
}

/// Signed area of a simple polygon. Positive for counter-clockwise polygons
/// in a y-up frame.
pub fn polygon_area(points: impl IntoIterator<Item = Point>) -> f32 {
    let mut points = points.into_iter();
    let Some(first) = points.next() else {
        return 0.0;
    };
    let Some(mut prev) = points.next() else {
        return 0.0;
    };
    let mut area = 0.0;
    for p in points {
        area += triangle_area2(first, prev, p);
        prev = p;
    }
    area * 0.5
}

/// Number of segments needed to approximate an arc of radius `radius`
/// spanning `arc` radians to within `tolerance`.
///
/// Never returns less than two.
pub fn curve_divisions(radius: f32, arc: f32, tolerance: f32) -> usize {
    let da = (radius / (radius + tolerance)).acos() * 2.0;
    let divs = (arc / da).ceil();
    if divs.is_finite() {
        (divs as usize).max(2)
    } else {
        2
    }
}
