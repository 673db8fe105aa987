// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// How contours that were never closed are stroked.
///
/// Fills always treat every contour as closed; this only affects strokes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenContours {
    /// Open contours get a cap at each end.
    #[default]
    Cap,
    /// Open contours are stroked as if they had been closed.
    Close,
}

/// Tolerances used while flattening and expanding paths.
///
/// All distances are in device pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TessellationConfig {
    /// Maximum distance between a flattened polyline and the curve it
    /// approximates.
    pub tolerance: f32,
    /// Consecutive points closer than this are merged.
    pub distance_tolerance: f32,
    /// Width of the antialiasing fringe.
    pub fringe_width: f32,
    pub open_contours: OpenContours,
}

impl TessellationConfig {
    /// Scales the default tolerances for a surface with the given ratio of
    /// physical to logical pixels.
    pub fn from_device_pixel_ratio(ratio: f32) -> Self {
        let ratio = if ratio > 0.0 { ratio } else { 1.0 };
        Self {
            tolerance: 0.25 / ratio,
            distance_tolerance: 0.01 / ratio,
            fringe_width: 1.0 / ratio,
            open_contours: OpenContours::default(),
        }
    }
}

impl Default for TessellationConfig {
    fn default() -> Self {
        Self::from_device_pixel_ratio(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerances_shrink_on_dense_displays() {
        let base = TessellationConfig::default();
        let retina = TessellationConfig::from_device_pixel_ratio(2.0);
        assert_eq!(retina.tolerance, base.tolerance / 2.0);
        assert_eq!(retina.fringe_width, 0.5);
        // Nonsensical ratios fall back to 1.
        assert_eq!(TessellationConfig::from_device_pixel_ratio(0.0), base);
        assert_eq!(TessellationConfig::from_device_pixel_ratio(f32::NAN), base);
    }
}
