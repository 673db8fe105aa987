// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renders simple scenes on the GPU and checks a few pixels.
//!
//! Each test passes trivially when no adapter is available.

use vellum::peniko::Color;
use vellum::vellum_encoding::{InstructionQueue, Winding};
use vellum::{Backend, Call, ImageFlags, RendererOptions, TextureKind, TextureRegion};
use vellum_tests::{fill, pixel, stroke, GpuTarget};

const SIZE: u32 = 20;
const RED: [u8; 4] = [255, 0, 0, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

fn rect(queue: &mut InstructionQueue, x0: f32, y0: f32, x1: f32, y1: f32) {
    queue.move_to(x0, y0);
    queue.line_to(x1, y0);
    queue.line_to(x1, y1);
    queue.line_to(x0, y1);
    queue.close();
}

fn target(options: RendererOptions) -> Option<GpuTarget> {
    GpuTarget::new(SIZE, SIZE, options, Color::BLACK).unwrap()
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn filled_square() {
    let Some(mut target) = target(RendererOptions::default()) else {
        return;
    };
    let mut queue = InstructionQueue::new();
    rect(&mut queue, 5., 5., 15., 15.);
    fill(&mut target.renderer, &queue, Color::RED);
    let image = target.finish().unwrap();

    assert_eq!(pixel(&image, SIZE, 10, 10).unwrap(), RED);
    assert_eq!(pixel(&image, SIZE, 1, 1).unwrap(), BLACK);
    assert_eq!(pixel(&image, SIZE, 18, 10).unwrap(), BLACK);
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn holes_are_left_unfilled() {
    for edge_antialias in [true, false] {
        let Some(mut target) = target(RendererOptions {
            edge_antialias,
            ..Default::default()
        }) else {
            return;
        };
        let mut queue = InstructionQueue::new();
        rect(&mut queue, 2., 2., 18., 18.);
        rect(&mut queue, 7., 7., 13., 13.);
        queue.winding(Winding::Cw);
        fill(&mut target.renderer, &queue, Color::RED);
        let image = target.finish().unwrap();

        assert_eq!(pixel(&image, SIZE, 4, 10).unwrap(), RED);
        assert_eq!(pixel(&image, SIZE, 10, 10).unwrap(), BLACK);
        assert_eq!(pixel(&image, SIZE, 0, 0).unwrap(), BLACK);
    }
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn stroked_line() {
    for stencil_strokes in [false, true] {
        let Some(mut target) = target(RendererOptions {
            stencil_strokes,
            ..Default::default()
        }) else {
            return;
        };
        let mut queue = InstructionQueue::new();
        queue.move_to(2., 10.);
        queue.line_to(18., 10.);
        stroke(&mut target.renderer, &queue, Color::RED, 4.0);
        let image = target.finish().unwrap();

        assert_eq!(pixel(&image, SIZE, 10, 9).unwrap(), RED);
        assert_eq!(pixel(&image, SIZE, 10, 3).unwrap(), BLACK);
    }
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn concave_fill_leaves_its_notch_empty() {
    for edge_antialias in [true, false] {
        let Some(mut target) = target(RendererOptions {
            edge_antialias,
            ..Default::default()
        }) else {
            return;
        };
        let mut queue = InstructionQueue::new();
        queue.move_to(2., 2.);
        queue.line_to(18., 2.);
        queue.line_to(18., 18.);
        queue.line_to(10., 10.);
        queue.line_to(2., 18.);
        queue.close();
        fill(&mut target.renderer, &queue, Color::RED);
        assert!(matches!(
            target.renderer.pending_calls(),
            [Call::Fill { .. }]
        ));
        let image = target.finish().unwrap();

        assert_eq!(pixel(&image, SIZE, 10, 4).unwrap(), RED);
        assert_eq!(pixel(&image, SIZE, 4, 12).unwrap(), RED);
        assert_eq!(pixel(&image, SIZE, 15, 12).unwrap(), RED);
        assert_eq!(pixel(&image, SIZE, 10, 16).unwrap(), BLACK);
    }
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn invalid_texture_requests_are_errors() {
    let Some(mut target) = target(RendererOptions::default()) else {
        return;
    };
    let renderer = &mut target.renderer;
    assert!(matches!(
        renderer.create_texture(TextureKind::Rgba, 0, 0, ImageFlags::empty(), Some(&[])),
        Err(vellum::Error::EmptyTexture { .. })
    ));
    let image = renderer
        .create_texture(TextureKind::Alpha, 2, 2, ImageFlags::empty(), Some(&[0; 4]))
        .unwrap();
    let overhanging = TextureRegion {
        x: 1,
        y: 1,
        width: 2,
        height: 2,
    };
    assert!(matches!(
        renderer.update_texture(image, overhanging, &[0; 4]),
        Err(vellum::Error::TextureRegionOutOfBounds { .. })
    ));
    // The backend checks regions itself when driven directly.
    assert!(matches!(
        renderer
            .backend_mut()
            .update_texture(image, overhanging, &[0; 4]),
        Err(vellum::Error::TextureRegionOutOfBounds { .. })
    ));
    renderer.delete_texture(image).unwrap();
    assert!(matches!(
        renderer.delete_texture(image),
        Err(vellum::Error::ImageNotFound(_))
    ));
    target.finish().unwrap();
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn debug_frames_recover_from_a_missing_target() {
    let Some(mut target) = target(RendererOptions {
        debug: true,
        ..Default::default()
    }) else {
        return;
    };
    let mut queue = InstructionQueue::new();
    rect(&mut queue, 5., 5., 15., 15.);

    assert!(target.renderer.backend_mut().take_target().is_some());
    fill(&mut target.renderer, &queue, Color::RED);
    assert!(matches!(
        target.renderer.flush(),
        Err(vellum::Error::NoRenderTarget)
    ));

    target.attach();
    fill(&mut target.renderer, &queue, Color::RED);
    let image = target.finish().unwrap();
    assert_eq!(pixel(&image, SIZE, 10, 10).unwrap(), RED);
    assert_eq!(pixel(&image, SIZE, 1, 1).unwrap(), BLACK);
}
