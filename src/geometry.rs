//! Planar geometry used by region extraction and rectification
//!
//! Contour area, convex hull, minimum-area rotated rectangles and the
//! four-point perspective transform all live here so the image stages only
//! deal with rasters.

use crate::types::{Point, RotatedRegion};
use nalgebra::{Matrix3, SMatrix, SVector};

/// Absolute polygon area (shoelace formula)
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        twice_area += a.x * b.y - b.x * a.y;
    }
    twice_area.abs() / 2.0
}

#[inline]
fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull in counter-clockwise order (Andrew's monotone chain)
///
/// Collinear boundary points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut sorted: Vec<Point> = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();

    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(sorted.len() * 2);

    for &p in &sorted {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }

    let lower_len = hull.len() + 1;
    for &p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }

    hull.pop();
    hull
}

/// Normalise a rectangle description so the angle lies in `[0, 90)`
fn normalize_rect(center: Point, width: f64, height: f64, angle_deg: f64) -> RotatedRegion {
    let mut angle = angle_deg.rem_euclid(180.0);
    let (mut w, mut h) = (width, height);
    if angle >= 90.0 {
        angle -= 90.0;
        std::mem::swap(&mut w, &mut h);
    }
    RotatedRegion::new(center, w, h, angle)
}

/// Minimum-area enclosing rotated rectangle (rotating calipers over the hull)
///
/// Returns `None` for an empty point set. Degenerate sets produce zero-sized
/// sides rather than failing.
pub fn min_area_rect(points: &[Point]) -> Option<RotatedRegion> {
    let hull = convex_hull(points);

    match hull.len() {
        0 => return None,
        1 => return Some(RotatedRegion::new(hull[0], 0.0, 0.0, 0.0)),
        2 => {
            let (a, b) = (hull[0], hull[1]);
            let center = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
            let angle = (b.y - a.y).atan2(b.x - a.x).to_degrees();
            return Some(normalize_rect(center, a.distance(&b), 0.0, angle));
        }
        _ => {}
    }

    let mut best: Option<(f64, RotatedRegion)> = None;

    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let len = a.distance(&b);
        if len <= f64::EPSILON {
            continue;
        }
        let dir = Point::new((b.x - a.x) / len, (b.y - a.y) / len);
        let normal = Point::new(-dir.y, dir.x);

        let (mut u_min, mut u_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut v_min, mut v_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let u = p.x * dir.x + p.y * dir.y;
            let v = p.x * normal.x + p.y * normal.y;
            u_min = u_min.min(u);
            u_max = u_max.max(u);
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }

        let width = u_max - u_min;
        let height = v_max - v_min;
        let area = width * height;

        if best.as_ref().map_or(true, |(best_area, _)| area < *best_area) {
            let u_mid = (u_min + u_max) / 2.0;
            let v_mid = (v_min + v_max) / 2.0;
            let center = Point::new(
                dir.x * u_mid + normal.x * v_mid,
                dir.y * u_mid + normal.y * v_mid,
            );
            let angle = dir.y.atan2(dir.x).to_degrees();
            best = Some((area, normalize_rect(center, width, height, angle)));
        }
    }

    best.map(|(_, rect)| rect)
}

/// Corners of a rotated region in source coordinates: tl, tr, br, bl
pub fn rotated_corners(region: &RotatedRegion) -> [Point; 4] {
    let half_w = region.width / 2.0;
    let half_h = region.height / 2.0;
    let (sin, cos) = region.angle_deg.to_radians().sin_cos();
    let c = region.center;

    [
        (-half_w, -half_h),
        (half_w, -half_h),
        (half_w, half_h),
        (-half_w, half_h),
    ]
    .map(|(x, y)| Point::new(c.x + x * cos - y * sin, c.y + x * sin + y * cos))
}

/// Homography mapping each `src[i]` onto `dst[i]`
///
/// Solves the 8x8 direct linear system with `h33 = 1`. Returns `None` when the
/// correspondences are degenerate (three or more collinear points).
pub fn perspective_transform(src: &[Point; 4], dst: &[Point; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);

        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Apply a homography to a point
pub fn project(h: &Matrix3<f64>, p: Point) -> Point {
    let w = h[(2, 0)] * p.x + h[(2, 1)] * p.y + h[(2, 2)];
    Point::new(
        (h[(0, 0)] * p.x + h[(0, 1)] * p.y + h[(0, 2)]) / w,
        (h[(1, 0)] * p.x + h[(1, 1)] * p.y + h[(1, 2)]) / w,
    )
}

/// Row-major `f32` copy of a homography, the layout raster warpers expect
pub fn matrix_to_row_major(h: &Matrix3<f64>) -> [f32; 9] {
    [
        h[(0, 0)] as f32,
        h[(0, 1)] as f32,
        h[(0, 2)] as f32,
        h[(1, 0)] as f32,
        h[(1, 1)] as f32,
        h[(1, 2)] as f32,
        h[(2, 0)] as f32,
        h[(2, 1)] as f32,
        h[(2, 2)] as f32,
    ]
}
