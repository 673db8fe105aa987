// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use peniko::kurbo::{Affine, Point, Rect, Size};
use peniko::Color;

use crate::backend::ImageId;

/// How a fill or stroke is colored.
///
/// Every paint is a rounded rectangle gradient in its own coordinate space:
/// `extent` is the half size of the rectangle, `radius` its corner radius and
/// `feather` the distance over which `inner_color` blends into
/// `outer_color`. With an image, the image is instead stretched over
/// `extent` and tinted by `inner_color`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Paint {
    /// Maps paint space to device space.
    pub transform: Affine,
    pub extent: [f32; 2],
    pub radius: f32,
    pub feather: f32,
    pub inner_color: Color,
    pub outer_color: Color,
    pub image: Option<ImageId>,
}

impl Paint {
    /// A solid color.
    pub fn color(color: Color) -> Self {
        Self {
            transform: Affine::IDENTITY,
            extent: [0.0, 0.0],
            radius: 0.0,
            feather: 1.0,
            inner_color: color,
            outer_color: color,
            image: None,
        }
    }

    /// A linear gradient from `start` to `end`.
    pub fn linear_gradient(start: Point, end: Point, inner: Color, outer: Color) -> Self {
        const LARGE: f64 = 1e5;
        let (mut dx, mut dy) = (end.x - start.x, end.y - start.y);
        let d = dx.hypot(dy);
        if d > 0.0001 {
            dx /= d;
            dy /= d;
        } else {
            (dx, dy) = (0.0, 1.0);
        }
        Self {
            transform: Affine::new([
                dy,
                -dx,
                dx,
                dy,
                start.x - dx * LARGE,
                start.y - dy * LARGE,
            ]),
            extent: [LARGE as f32, (LARGE + d * 0.5) as f32],
            radius: 0.0,
            feather: (d as f32).max(1.0),
            inner_color: inner,
            outer_color: outer,
            image: None,
        }
    }

    /// A radial gradient around `center`, blending between the two radii.
    pub fn radial_gradient(
        center: Point,
        inner_radius: f32,
        outer_radius: f32,
        inner: Color,
        outer: Color,
    ) -> Self {
        let r = (inner_radius + outer_radius) * 0.5;
        let f = outer_radius - inner_radius;
        Self {
            transform: Affine::translate(center.to_vec2()),
            extent: [r, r],
            radius: r,
            feather: f.max(1.0),
            inner_color: inner,
            outer_color: outer,
            image: None,
        }
    }

    /// A feathered rounded rectangle, commonly used for drop shadows.
    pub fn box_gradient(rect: Rect, radius: f32, feather: f32, inner: Color, outer: Color) -> Self {
        let center = rect.center();
        Self {
            transform: Affine::translate(center.to_vec2()),
            extent: [(rect.width() * 0.5) as f32, (rect.height() * 0.5) as f32],
            radius,
            feather: feather.max(1.0),
            inner_color: inner,
            outer_color: outer,
            image: None,
        }
    }

    /// A repeating image whose top left corner is at `origin`, rotated by
    /// `angle` radians around it.
    pub fn image_pattern(
        origin: Point,
        size: Size,
        angle: f64,
        image: ImageId,
        alpha: f32,
    ) -> Self {
        let tint = Color::rgba8(255, 255, 255, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8);
        Self {
            transform: Affine::translate(origin.to_vec2()) * Affine::rotate(angle),
            extent: [size.width as f32, size.height as f32],
            radius: 0.0,
            feather: 0.0,
            inner_color: tint,
            outer_color: tint,
            image: Some(image),
        }
    }

    /// Places the paint under an additional transform.
    #[must_use]
    pub fn transformed(mut self, transform: Affine) -> Self {
        self.transform = transform * self.transform;
        self
    }
}

/// A transformed rectangle outside of which nothing is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scissor {
    /// Maps scissor space, centered on the rectangle, to device space.
    pub transform: Affine,
    /// Half size of the rectangle. Negative when scissoring is off.
    pub extent: [f32; 2],
}

impl Scissor {
    pub fn none() -> Self {
        Self {
            transform: Affine::IDENTITY,
            extent: [-1.0, -1.0],
        }
    }

    pub fn new(transform: Affine, extent: [f32; 2]) -> Self {
        Self { transform, extent }
    }

    /// Scissors to `rect` as seen through `transform`.
    pub fn from_rect(rect: Rect, transform: Affine) -> Self {
        let rect = rect.abs();
        Self {
            transform: transform * Affine::translate(rect.center().to_vec2()),
            extent: [(rect.width() * 0.5) as f32, (rect.height() * 0.5) as f32],
        }
    }

    pub fn is_none(&self) -> bool {
        self.extent[0] < -0.5 || self.extent[1] < -0.5
    }
}

impl Default for Scissor {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_linear_gradient_points_down() {
        let p = Point::new(3.0, 4.0);
        let paint = Paint::linear_gradient(p, p, Color::WHITE, Color::BLACK);
        let [a, b, c, d, _, _] = paint.transform.as_coeffs();
        assert_eq!((a, b, c, d), (1.0, 0.0, 0.0, 1.0));
        assert_eq!(paint.feather, 1.0);
    }

    #[test]
    fn box_gradient_is_centered() {
        let paint = Paint::box_gradient(
            Rect::new(10.0, 20.0, 30.0, 60.0),
            4.0,
            0.5,
            Color::WHITE,
            Color::TRANSPARENT,
        );
        assert_eq!(paint.transform.translation().x, 20.0);
        assert_eq!(paint.transform.translation().y, 40.0);
        assert_eq!(paint.extent, [10.0, 20.0]);
        assert_eq!(paint.feather, 1.0);
    }

    #[test]
    fn scissor_from_rect() {
        assert!(Scissor::none().is_none());
        let scissor = Scissor::from_rect(Rect::new(0.0, 0.0, 8.0, 4.0), Affine::IDENTITY);
        assert!(!scissor.is_none());
        assert_eq!(scissor.extent, [4.0, 2.0]);
    }
}
