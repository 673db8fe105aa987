// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paths flattened and expanded into the vertices the renderer batches.

use vellum::kurbo::{Circle, Rect};
use vellum::low_level::PathRange;
use vellum::peniko::Color;
use vellum::vellum_encoding::{InstructionQueue, Winding};
use vellum::{Call, RendererOptions};
use vellum_tests::{fill, flatten, recording_renderer, stroke};

fn triangle() -> InstructionQueue {
    let mut queue = InstructionQueue::new();
    queue.move_to(0., 0.);
    queue.line_to(10., 0.);
    queue.line_to(5., 9.);
    queue.close();
    queue
}

#[test]
fn aliased_convex_fill_is_a_single_fan() {
    let mut renderer = recording_renderer(RendererOptions {
        edge_antialias: false,
        ..Default::default()
    })
    .unwrap();
    fill(&mut renderer, &triangle(), Color::BLACK);

    assert!(matches!(renderer.pending_calls(), [Call::ConvexFill { .. }]));
    assert_eq!(renderer.pending_vertices().len(), 3);
    assert_eq!(
        renderer.path_ranges(),
        [PathRange {
            fill_offset: 0,
            fill_count: 3,
            stroke_offset: 3,
            stroke_count: 0,
        }]
    );
}

#[test]
fn antialiased_convex_fill_has_a_fringe() {
    let mut renderer = recording_renderer(RendererOptions::default()).unwrap();
    fill(&mut renderer, &triangle(), Color::BLACK);

    let [range] = renderer.path_ranges() else {
        panic!("expected one path");
    };
    assert_eq!(range.fill_count, 3);
    // Two vertices per corner, plus the two closing the loop.
    assert_eq!(range.stroke_count, 8);
    assert_eq!(range.stroke_offset, range.fill_offset + range.fill_count);
}

#[test]
fn overlapping_contours_cover_their_bounds() {
    let mut queue = InstructionQueue::new();
    queue.shape(&Circle::new((30., 30.), 20.), 0.1);
    queue.shape(&Circle::new((50., 30.), 20.), 0.1);
    let mut renderer = recording_renderer(RendererOptions::default()).unwrap();
    let cache = fill(&mut renderer, &queue, Color::BLACK);

    let [Call::Fill {
        paths,
        bounds_offset,
        stencil_uniforms,
        uniforms,
        ..
    }] = renderer.pending_calls()
    else {
        panic!("expected a stencilled fill, got {:?}", renderer.pending_calls());
    };
    assert_eq!(paths.len(), 2);
    assert_ne!(stencil_uniforms, uniforms);

    // The cover quad follows every path's geometry.
    let vertices = renderer.pending_vertices();
    assert_eq!(*bounds_offset as usize, vertices.len() - 4);
    let ranges = renderer.path_ranges();
    let last = ranges[ranges.len() - 1];
    assert_eq!(last.stroke_offset + last.stroke_count, *bounds_offset);

    let bounds = cache.bounds();
    let quad: Vec<_> = vertices[vertices.len() - 4..]
        .iter()
        .map(|v| (v.x, v.y))
        .collect();
    assert_eq!(
        quad,
        [
            (bounds.max.x, bounds.max.y),
            (bounds.max.x, bounds.min.y),
            (bounds.min.x, bounds.max.y),
            (bounds.min.x, bounds.min.y),
        ]
    );
    assert!(bounds.min.x < 10.5 && bounds.max.x > 69.5);
}

#[test]
fn collinear_cubic_flattens_to_a_line() {
    let mut queue = InstructionQueue::new();
    queue.move_to(0., 0.);
    queue.bezier_to(10., 0., 20., 0., 30., 0.);
    let cache = flatten(&queue);

    let paths: Vec<_> = cache.paths().collect();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].points.len(), 2);
    assert!(!paths[0].closed);
    assert_eq!(cache.bounds().width(), 30.);
    assert_eq!(cache.bounds().height(), 0.);
}

#[test]
fn rectangles_are_solid_counter_clockwise() {
    let mut queue = InstructionQueue::new();
    queue.shape(&Rect::new(0., 0., 10., 10.), 0.1);
    let cache = flatten(&queue);
    let paths: Vec<_> = cache.paths().collect();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].closed);
    assert_eq!(paths[0].winding, Winding::Ccw);
    assert_eq!(paths[0].points.len(), 4);
}

#[test]
fn degenerate_stroke_contours_keep_empty_ranges() {
    let mut queue = InstructionQueue::new();
    queue.move_to(0., 0.);
    queue.line_to(10., 0.);
    queue.move_to(50., 50.);
    let mut renderer = recording_renderer(RendererOptions::default()).unwrap();
    stroke(&mut renderer, &queue, Color::BLACK, 2.0);

    let ranges = renderer.path_ranges();
    assert_eq!(ranges.len(), 2);
    assert!(ranges[0].stroke_count > 0);
    assert_eq!(ranges[1], PathRange::default());
    assert_eq!(
        renderer.pending_vertices().len(),
        ranges[0].stroke_count as usize
    );
}
