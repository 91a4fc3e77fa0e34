//! Region geometry - which side of an edge a point lies on
//!
//! The measurable zone is a quadrilateral A→B→C→D. A point is inside when it
//! lies on the `Left` of all four edges taken in order. Points exactly on an
//! edge line count as `Left`, so an object riding the boundary does not flap
//! in and out of the zone between frames.

use crate::domain::types::Point;
use anyhow::bail;

/// Side of a directed edge a point lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// 2D cross product of (point - start) and (end - start)
#[inline]
pub fn cross(start: Point, end: Point, point: Point) -> f64 {
    (point.x - start.x) * (end.y - start.y) - (point.y - start.y) * (end.x - start.x)
}

/// Side of the edge `start → end` that `point` lies on
#[inline]
pub fn side(start: Point, end: Point, point: Point) -> Side {
    if cross(start, end, point) >= 0.0 {
        Side::Left
    } else {
        Side::Right
    }
}

/// True iff `point` is `Left` of every edge of `quad` taken in order
pub fn point_in_region(point: Point, quad: &[Point; 4]) -> bool {
    (0..4).all(|i| side(quad[i], quad[(i + 1) % 4], point) == Side::Left)
}

/// Twice the signed area, in the same handedness as `cross`
fn signed_area2(quad: &[Point; 4]) -> f64 {
    (0..4)
        .map(|i| {
            let a = quad[i];
            let b = quad[(i + 1) % 4];
            a.x * b.y - b.x * a.y
        })
        .sum()
}

fn segments_cross(a: Point, b: Point, c: Point, d: Point) -> bool {
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Validated measurement zone in fractional frame coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    points: [Point; 4],
}

impl Region {
    /// Build a region from four fractional points.
    ///
    /// Rejects non-finite, degenerate and self-intersecting quads. A quad
    /// wound the other way round is reversed (A, D, C, B) so its interior is
    /// always on the `Left` of each edge.
    pub fn new(points: [Point; 4]) -> anyhow::Result<Self> {
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            bail!("region points must be finite");
        }
        let [a, b, c, d] = points;
        if segments_cross(a, b, c, d) || segments_cross(b, c, d, a) {
            bail!("region quadrilateral is self-intersecting");
        }
        let area = signed_area2(&points);
        if area.abs() < f64::EPSILON {
            bail!("region quadrilateral is degenerate");
        }
        let points = if area < 0.0 { points } else { [a, d, c, b] };
        Ok(Self { points })
    }

    /// Build from `[[x, y]; 4]` as written in the config file
    pub fn from_pairs(pairs: &[[f64; 2]]) -> anyhow::Result<Self> {
        let quad: [[f64; 2]; 4] = pairs
            .try_into()
            .map_err(|_| anyhow::anyhow!("region needs exactly 4 points, got {}", pairs.len()))?;
        Self::new(quad.map(|[x, y]| Point::new(x, y)))
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.points
    }

    /// Region corners in pixels for a frame of the given size
    pub fn scaled(&self, width: u32, height: u32) -> [Point; 4] {
        self.points.map(|p| Point::new(p.x * width as f64, p.y * height as f64))
    }

    /// Containment test for a point in fractional coordinates
    pub fn contains(&self, point: Point) -> bool {
        point_in_region(point, &self.points)
    }
}

impl Default for Region {
    /// Lower-right lane band used by the stock camera angle
    fn default() -> Self {
        Self {
            points: [
                Point::new(0.1, 0.55),
                Point::new(0.25, 0.8),
                Point::new(0.99, 0.75),
                Point::new(0.99, 0.5),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    /// Even-odd ray casting, independent of the edge-side test
    fn ray_cast(point: Point, poly: &[Point; 4]) -> bool {
        let mut inside = false;
        let mut j = 3;
        for i in 0..4 {
            let (pi, pj) = (poly[i], poly[j]);
            if (pi.y > point.y) != (pj.y > point.y)
                && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    fn distance_to_segment(point: Point, a: Point, b: Point) -> f64 {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len2 = dx * dx + dy * dy;
        let t = if len2 == 0.0 {
            0.0
        } else {
            (((point.x - a.x) * dx + (point.y - a.y) * dy) / len2).clamp(0.0, 1.0)
        };
        let (cx, cy) = (a.x + t * dx, a.y + t * dy);
        ((point.x - cx).powi(2) + (point.y - cy).powi(2)).sqrt()
    }

    fn random_convex_quad(rng: &mut StdRng) -> [Point; 4] {
        let cx = rng.random_range(-5.0..5.0);
        let cy = rng.random_range(-5.0..5.0);
        let mut angles: Vec<f64> =
            (0..4).map(|_| rng.random_range(0.0..std::f64::consts::TAU)).collect();
        angles.sort_by(|a, b| a.total_cmp(b));
        let r = rng.random_range(0.5..4.0);
        [0, 1, 2, 3].map(|i| p(cx + r * angles[i].cos(), cy + r * angles[i].sin()))
    }

    #[test]
    fn test_side_of_edge() {
        let a = p(0.0, 0.0);
        let b = p(0.0, 1.0);
        assert_eq!(side(a, b, p(1.0, 0.5)), Side::Left);
        assert_eq!(side(a, b, p(-1.0, 0.5)), Side::Right);
    }

    #[test]
    fn test_point_on_line_is_left() {
        let a = p(0.0, 0.0);
        let b = p(2.0, 2.0);
        assert_eq!(cross(a, b, p(1.0, 1.0)), 0.0);
        assert_eq!(side(a, b, p(1.0, 1.0)), Side::Left);
    }

    #[test]
    fn test_default_region_interior_and_exterior() {
        let region = Region::default();
        assert!(region.contains(p(0.5, 0.65)));
        assert!(region.contains(p(0.9, 0.7)));
        assert!(!region.contains(p(0.5, 0.2)));
        assert!(!region.contains(p(0.05, 0.6)));
        assert!(!region.contains(p(0.5, 0.95)));
    }

    #[test]
    fn test_region_boundary_vertex_is_inside() {
        let region = Region::default();
        assert!(region.contains(p(0.1, 0.55)));
    }

    #[test]
    fn test_opposite_winding_is_normalised() {
        let cw = Region::default();
        let [a, b, c, d] = *cw.points();
        let ccw = Region::new([a, d, c, b]).unwrap();
        for point in [p(0.5, 0.65), p(0.5, 0.2), p(0.95, 0.6)] {
            assert_eq!(cw.contains(point), ccw.contains(point));
        }
    }

    #[test]
    fn test_self_intersecting_region_rejected() {
        // Bow-tie: A→B and C→D cross
        let result = Region::new([p(0.0, 0.0), p(1.0, 1.0), p(1.0, 0.0), p(0.0, 1.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_degenerate_region_rejected() {
        let result = Region::new([p(0.0, 0.0), p(1.0, 1.0), p(2.0, 2.0), p(3.0, 3.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_pairs_wrong_length() {
        assert!(Region::from_pairs(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]).is_err());
        assert!(Region::from_pairs(&[[0.1, 0.55], [0.25, 0.8], [0.99, 0.75], [0.99, 0.5]]).is_ok());
    }

    #[test]
    fn test_scaled_region() {
        let scaled = Region::default().scaled(1000, 100);
        assert!((scaled[0].x - 100.0).abs() < 1e-9);
        assert!((scaled[0].y - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_in_region_matches_ray_casting() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut checked = 0;
        for _ in 0..500 {
            let quad = random_convex_quad(&mut rng);
            let Ok(region) = Region::new(quad) else {
                continue;
            };
            for _ in 0..50 {
                let point = p(rng.random_range(-10.0..10.0), rng.random_range(-10.0..10.0));
                let near_edge = (0..4)
                    .any(|i| distance_to_segment(point, quad[i], quad[(i + 1) % 4]) < 1e-6);
                if near_edge {
                    continue;
                }
                assert_eq!(
                    region.contains(point),
                    ray_cast(point, &quad),
                    "quad={quad:?} point={point:?}"
                );
                checked += 1;
            }
        }
        assert!(checked > 10_000);
    }

    #[test]
    fn test_free_function_requires_left_winding() {
        let region = Region::default();
        let quad = *region.points();
        let inside = p(0.5, 0.65);
        assert!(point_in_region(inside, &quad));
        let [a, b, c, d] = quad;
        assert!(!point_in_region(inside, &[a, d, c, b]));
    }
}
