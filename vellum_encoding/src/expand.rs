// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Expansion of flattened contours into fill fans and triangle strips.

use peniko::kurbo::{Cap, Join};

use crate::cache::{PathCache, PathPoint, PointFlags};
use crate::config::OpenContours;
use crate::math::{curve_divisions, Point, PI};
use crate::vertex::Vertex;

impl PathCache {
    /// Generates fill geometry for every contour.
    ///
    /// Each contour gets an interior fan, inset by half the fringe, and a
    /// closed fringe strip that fades coverage out across `fringe_width`.
    /// With a zero `fringe_width` the fan uses the raw points and no strip is
    /// generated. When the cache holds a single convex contour the fringe is
    /// only generated outside the fan, so it can be drawn without stencilling.
    pub fn expand_fill(&mut self, fringe_width: f32, join: Join, miter_limit: f32) {
        let aa = fringe_width;
        let fringe = aa > 0.0;
        self.calculate_joins(aa, join, miter_limit);
        self.vertices.clear();
        let convex = self.is_convex();
        let woff = 0.5 * aa;

        for path in &mut self.paths {
            path.fill = 0..0;
            path.stroke = 0..0;
            if path.count < 3 {
                continue;
            }
            let pts = &self.points[path.first..path.first + path.count];
            let verts = &mut self.vertices;

            let start = verts.len();
            if fringe {
                let mut p0 = pts[pts.len() - 1];
                for &p1 in pts {
                    if p1.flags.contains(PointFlags::BEVEL) {
                        if p1.flags.contains(PointFlags::LEFT) {
                            verts.push(Vertex::at(p1.pos + p1.dm * woff, 0.5, 1.0));
                        } else {
                            verts.push(Vertex::at(p1.pos + p0.dir.perp() * woff, 0.5, 1.0));
                            verts.push(Vertex::at(p1.pos + p1.dir.perp() * woff, 0.5, 1.0));
                        }
                    } else {
                        verts.push(Vertex::at(p1.pos + p1.dm * woff, 0.5, 1.0));
                    }
                    p0 = p1;
                }
            } else {
                verts.extend(pts.iter().map(|p| Vertex::at(p.pos, 0.5, 1.0)));
            }
            path.fill = start..verts.len();

            if !fringe {
                continue;
            }
            let (lw, lu) = if convex {
                // Matches the inset of the fan above.
                (woff, 0.5)
            } else {
                (aa + woff, 0.0)
            };
            let (rw, ru) = (aa - woff, 1.0);
            let start = verts.len();
            let mut p0 = pts[pts.len() - 1];
            for &p1 in pts {
                if p1.flags.contains(PointFlags::BEVEL)
                    || p1.flags.contains(PointFlags::INNER_BEVEL)
                {
                    bevel_join(verts, &p0, &p1, lw, rw, lu, ru);
                } else {
                    verts.push(Vertex::at(p1.pos + p1.dm * lw, lu, 1.0));
                    verts.push(Vertex::at(p1.pos - p1.dm * rw, ru, 1.0));
                }
                p0 = p1;
            }
            close_strip(verts, start, lu, ru);
            path.stroke = start..verts.len();
        }
    }

    /// Generates a stroke strip for every contour.
    ///
    /// `half_width` is half the stroke width. A non-zero `fringe_width` widens
    /// the strip by half the fringe on each side and fades coverage across it.
    pub fn expand_stroke(
        &mut self,
        half_width: f32,
        fringe_width: f32,
        cap: Cap,
        join: Join,
        miter_limit: f32,
    ) {
        let aa = fringe_width;
        let ncap = curve_divisions(half_width, PI, self.config.tolerance);
        let w = half_width + aa * 0.5;
        let (u0, u1) = if aa == 0.0 { (0.5, 0.5) } else { (0.0, 1.0) };
        let close_open = self.config.open_contours == OpenContours::Close;

        self.calculate_joins(w, join, miter_limit);
        self.vertices.clear();

        for path in &mut self.paths {
            path.fill = 0..0;
            path.stroke = 0..0;
            if path.count < 2 {
                continue;
            }
            let pts = &self.points[path.first..path.first + path.count];
            let verts = &mut self.vertices;
            let looped = path.closed || close_open;
            let start = verts.len();

            let (mut p0, inner) = if looped {
                (pts[pts.len() - 1], pts)
            } else {
                (pts[0], &pts[1..pts.len() - 1])
            };

            if !looped {
                let (dir, _) = (pts[1].pos - pts[0].pos).normalize();
                match cap {
                    Cap::Butt => cap_start(verts, pts[0].pos, dir, w, -aa * 0.5, aa, u0, u1),
                    Cap::Square => cap_start(verts, pts[0].pos, dir, w, w - aa, aa, u0, u1),
                    Cap::Round => round_cap_start(verts, pts[0].pos, dir, w, ncap, u0, u1),
                }
            }

            for &p1 in inner {
                if p1.flags.contains(PointFlags::BEVEL)
                    || p1.flags.contains(PointFlags::INNER_BEVEL)
                {
                    if join == Join::Round {
                        round_join(verts, &p0, &p1, w, w, u0, u1, ncap);
                    } else {
                        bevel_join(verts, &p0, &p1, w, w, u0, u1);
                    }
                } else {
                    verts.push(Vertex::at(p1.pos + p1.dm * w, u0, 1.0));
                    verts.push(Vertex::at(p1.pos - p1.dm * w, u1, 1.0));
                }
                p0 = p1;
            }

            if looped {
                close_strip(verts, start, u0, u1);
            } else {
                let end = pts[pts.len() - 1].pos;
                let (dir, _) = (end - p0.pos).normalize();
                match cap {
                    Cap::Butt => cap_end(verts, end, dir, w, -aa * 0.5, aa, u0, u1),
                    Cap::Square => cap_end(verts, end, dir, w, w - aa, aa, u0, u1),
                    Cap::Round => round_cap_end(verts, end, dir, w, ncap, u0, u1),
                }
            }
            path.stroke = start..verts.len();
        }
    }
}

/// Repeats the first two vertices of the strip beginning at `start`.
fn close_strip(verts: &mut Vec<Vertex>, start: usize, u0: f32, u1: f32) {
    if verts.len() < start + 2 {
        return;
    }
    let first = verts[start].position();
    let second = verts[start + 1].position();
    verts.push(Vertex::at(first, u0, 1.0));
    verts.push(Vertex::at(second, u1, 1.0));
}

/// The two offset points on the side of a join given by `w`, either mitered
/// or split into a bevel when the inner side is too short.
fn choose_bevel(inner_bevel: bool, p0: &PathPoint, p1: &PathPoint, w: f32) -> (Point, Point) {
    if inner_bevel {
        (p1.pos + p0.dir.perp() * w, p1.pos + p1.dir.perp() * w)
    } else {
        let p = p1.pos + p1.dm * w;
        (p, p)
    }
}

fn bevel_join(
    verts: &mut Vec<Vertex>,
    p0: &PathPoint,
    p1: &PathPoint,
    lw: f32,
    rw: f32,
    lu: f32,
    ru: f32,
) {
    let dl0 = p0.dir.perp();
    let dl1 = p1.dir.perp();
    let inner_bevel = p1.flags.contains(PointFlags::INNER_BEVEL);
    let bevel = p1.flags.contains(PointFlags::BEVEL);

    if p1.flags.contains(PointFlags::LEFT) {
        let (l0, l1) = choose_bevel(inner_bevel, p0, p1, lw);
        let r0 = p1.pos - dl0 * rw;
        let r1 = p1.pos - dl1 * rw;

        verts.push(Vertex::at(l0, lu, 1.0));
        verts.push(Vertex::at(r0, ru, 1.0));
        if bevel {
            verts.push(Vertex::at(l0, lu, 1.0));
            verts.push(Vertex::at(r0, ru, 1.0));
            verts.push(Vertex::at(l1, lu, 1.0));
            verts.push(Vertex::at(r1, ru, 1.0));
        } else {
            let rm = p1.pos - p1.dm * rw;
            verts.push(Vertex::at(p1.pos, 0.5, 1.0));
            verts.push(Vertex::at(r0, ru, 1.0));
            verts.push(Vertex::at(rm, ru, 1.0));
            verts.push(Vertex::at(rm, ru, 1.0));
            verts.push(Vertex::at(p1.pos, 0.5, 1.0));
            verts.push(Vertex::at(r1, ru, 1.0));
        }
        verts.push(Vertex::at(l1, lu, 1.0));
        verts.push(Vertex::at(r1, ru, 1.0));
    } else {
        let (r0, r1) = choose_bevel(inner_bevel, p0, p1, -rw);
        let l0 = p1.pos + dl0 * lw;
        let l1 = p1.pos + dl1 * lw;

        verts.push(Vertex::at(l0, lu, 1.0));
        verts.push(Vertex::at(r0, ru, 1.0));
        if bevel {
            verts.push(Vertex::at(l0, lu, 1.0));
            verts.push(Vertex::at(r0, ru, 1.0));
            verts.push(Vertex::at(l1, lu, 1.0));
            verts.push(Vertex::at(r1, ru, 1.0));
        } else {
            let lm = p1.pos + p1.dm * lw;
            verts.push(Vertex::at(l0, lu, 1.0));
            verts.push(Vertex::at(p1.pos, 0.5, 1.0));
            verts.push(Vertex::at(lm, lu, 1.0));
            verts.push(Vertex::at(lm, lu, 1.0));
            verts.push(Vertex::at(l1, lu, 1.0));
            verts.push(Vertex::at(p1.pos, 0.5, 1.0));
        }
        verts.push(Vertex::at(l1, lu, 1.0));
        verts.push(Vertex::at(r1, ru, 1.0));
    }
}

#[allow(clippy::too_many_arguments, reason = "Strip layout parameters")]
fn round_join(
    verts: &mut Vec<Vertex>,
    p0: &PathPoint,
    p1: &PathPoint,
    lw: f32,
    rw: f32,
    lu: f32,
    ru: f32,
    ncap: usize,
) {
    let dl0 = p0.dir.perp();
    let dl1 = p1.dir.perp();
    let inner_bevel = p1.flags.contains(PointFlags::INNER_BEVEL);
    let ncap = ncap.max(2);

    if p1.flags.contains(PointFlags::LEFT) {
        let (l0, l1) = choose_bevel(inner_bevel, p0, p1, lw);
        let a0 = (-dl0.y).atan2(-dl0.x);
        let mut a1 = (-dl1.y).atan2(-dl1.x);
        if a1 > a0 {
            a1 -= PI * 2.0;
        }
        verts.push(Vertex::at(l0, lu, 1.0));
        verts.push(Vertex::at(p1.pos - dl0 * rw, ru, 1.0));
        let n = arc_steps(a0 - a1, ncap);
        for i in 0..n {
            let a = a0 + (i as f32 / (n - 1) as f32) * (a1 - a0);
            let r = p1.pos + Point::new(a.cos(), a.sin()) * rw;
            verts.push(Vertex::at(p1.pos, 0.5, 1.0));
            verts.push(Vertex::at(r, ru, 1.0));
        }
        verts.push(Vertex::at(l1, lu, 1.0));
        verts.push(Vertex::at(p1.pos - dl1 * rw, ru, 1.0));
    } else {
        let (r0, r1) = choose_bevel(inner_bevel, p0, p1, -rw);
        let a0 = dl0.y.atan2(dl0.x);
        let mut a1 = dl1.y.atan2(dl1.x);
        if a1 < a0 {
            a1 += PI * 2.0;
        }
        verts.push(Vertex::at(p1.pos + dl0 * rw, lu, 1.0));
        verts.push(Vertex::at(r0, ru, 1.0));
        let n = arc_steps(a1 - a0, ncap);
        for i in 0..n {
            let a = a0 + (i as f32 / (n - 1) as f32) * (a1 - a0);
            let l = p1.pos + Point::new(a.cos(), a.sin()) * lw;
            verts.push(Vertex::at(l, lu, 1.0));
            verts.push(Vertex::at(p1.pos, 0.5, 1.0));
        }
        verts.push(Vertex::at(p1.pos + dl1 * rw, lu, 1.0));
        verts.push(Vertex::at(r1, ru, 1.0));
    }
}

/// Number of samples for an arc sweeping `sweep` radians, given `ncap`
/// samples per half turn.
fn arc_steps(sweep: f32, ncap: usize) -> usize {
    let n = (sweep / PI * ncap as f32).ceil();
    if n.is_finite() {
        (n.max(0.0) as usize).clamp(2, ncap)
    } else {
        2
    }
}

/// Butt or square cap at the start of an open contour.
///
/// `d` moves the cap back along the contour; `aa` adds a fading lip.
#[allow(clippy::too_many_arguments, reason = "Strip layout parameters")]
fn cap_start(
    verts: &mut Vec<Vertex>,
    p: Point,
    dir: Point,
    w: f32,
    d: f32,
    aa: f32,
    u0: f32,
    u1: f32,
) {
    let p = p - dir * d;
    let dl = dir.perp();
    verts.push(Vertex::at(p + dl * w - dir * aa, u0, 0.0));
    verts.push(Vertex::at(p - dl * w - dir * aa, u1, 0.0));
    verts.push(Vertex::at(p + dl * w, u0, 1.0));
    verts.push(Vertex::at(p - dl * w, u1, 1.0));
}

#[allow(clippy::too_many_arguments, reason = "Strip layout parameters")]
fn cap_end(
    verts: &mut Vec<Vertex>,
    p: Point,
    dir: Point,
    w: f32,
    d: f32,
    aa: f32,
    u0: f32,
    u1: f32,
) {
    let p = p + dir * d;
    let dl = dir.perp();
    verts.push(Vertex::at(p + dl * w, u0, 1.0));
    verts.push(Vertex::at(p - dl * w, u1, 1.0));
    verts.push(Vertex::at(p + dl * w + dir * aa, u0, 0.0));
    verts.push(Vertex::at(p - dl * w + dir * aa, u1, 0.0));
}

fn round_cap_start(
    verts: &mut Vec<Vertex>,
    p: Point,
    dir: Point,
    w: f32,
    ncap: usize,
    u0: f32,
    u1: f32,
) {
    let dl = dir.perp();
    let ncap = ncap.max(2);
    for i in 0..ncap {
        let a = i as f32 / (ncap - 1) as f32 * PI;
        let (ax, ay) = (a.cos() * w, a.sin() * w);
        verts.push(Vertex::at(p - dl * ax - dir * ay, u0, 1.0));
        verts.push(Vertex::at(p, 0.5, 1.0));
    }
    verts.push(Vertex::at(p + dl * w, u0, 1.0));
    verts.push(Vertex::at(p - dl * w, u1, 1.0));
}

fn round_cap_end(
    verts: &mut Vec<Vertex>,
    p: Point,
    dir: Point,
    w: f32,
    ncap: usize,
    u0: f32,
    u1: f32,
) {
    let dl = dir.perp();
    let ncap = ncap.max(2);
    verts.push(Vertex::at(p + dl * w, u0, 1.0));
    verts.push(Vertex::at(p - dl * w, u1, 1.0));
    for i in 0..ncap {
        let a = i as f32 / (ncap - 1) as f32 * PI;
        let (ax, ay) = (a.cos() * w, a.sin() * w);
        verts.push(Vertex::at(p, 0.5, 1.0));
        verts.push(Vertex::at(p - dl * ax + dir * ay, u0, 1.0));
    }
}
