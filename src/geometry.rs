// src/geometry.rs
//
// Pure side-of-gate classification. The gate region is a simple polygon,
// in practice a thin strip; a point is Before it, Inside it, or After it.
// Before/After are decided by the signed perpendicular offset from the
// strip's long axis, so the same code handles vertical, horizontal and
// diagonal gates.

use crate::error::CountError;

pub type Point = (f32, f32);

/// Which side of the gate a point occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSide {
    /// No observation yet
    Unknown,
    /// Negative offset side (left of a vertical gate, above a horizontal one)
    Before,
    /// Within the gate polygon
    Inside,
    /// Positive offset side
    After,
}

impl GateSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Before => "BEFORE",
            Self::Inside => "INSIDE",
            Self::After => "AFTER",
        }
    }

    pub fn is_outer(&self) -> bool {
        matches!(self, Self::Before | Self::After)
    }
}

/// Distance from a gate boundary line below which a point is treated as
/// sitting exactly on the boundary.
const BOUNDARY_EPS: f32 = 1e-3;

/// A validated gate region. Immutable once built; all derived quantities
/// are precomputed so `classify` stays allocation-free.
#[derive(Debug, Clone)]
pub struct Region {
    points: Vec<Point>,
    centroid: Point,
    /// Unit normal to the gate's long axis. Signed offsets along it
    /// separate Before (negative) from After (positive).
    normal: (f32, f32),
    /// Largest |offset| of any polygon vertex, i.e. the gate half-width.
    half_width: f32,
}

impl Region {
    pub fn new(points: Vec<Point>) -> Result<Self, CountError> {
        if points.len() < 3 {
            return Err(CountError::configuration(format!(
                "region needs at least 3 points, got {}",
                points.len()
            )));
        }
        if polygon_area(&points) < 1.0 {
            return Err(CountError::configuration(
                "region polygon is degenerate (near-zero area)",
            ));
        }

        let n = points.len() as f32;
        let centroid = (
            points.iter().map(|p| p.0).sum::<f32>() / n,
            points.iter().map(|p| p.1).sum::<f32>() / n,
        );

        let normal = principal_normal(&points, centroid);

        let half_width = points
            .iter()
            .map(|p| (offset(*p, centroid, normal)).abs())
            .fold(0.0f32, f32::max);
        if half_width < BOUNDARY_EPS {
            return Err(CountError::configuration(
                "region polygon has zero width across its short axis",
            ));
        }

        Ok(Self {
            points,
            centroid,
            normal,
            half_width,
        })
    }

    /// The original deployment's gate: a vertical strip of ±`half_width`
    /// pixels around the horizontal center, spanning the full frame height.
    pub fn default_center_strip(
        frame_w: f32,
        frame_h: f32,
        half_width: f32,
    ) -> Result<Self, CountError> {
        let cx = frame_w / 2.0;
        Self::new(vec![
            (cx - half_width, 0.0),
            (cx + half_width, 0.0),
            (cx + half_width, frame_h),
            (cx - half_width, frame_h),
        ])
    }

    /// Classify a point relative to the gate. Pure and deterministic.
    ///
    /// `last` implements the boundary policy: a point lying exactly on a
    /// gate boundary line keeps the side it last occupied, so jitter on
    /// the line itself can never flip sides. With no previous side the
    /// boundary resolves to Inside.
    pub fn classify(&self, p: Point, last: GateSide) -> GateSide {
        if point_in_polygon(p, &self.points) {
            return GateSide::Inside;
        }

        let s = offset(p, self.centroid, self.normal);
        if (s.abs() - self.half_width).abs() <= BOUNDARY_EPS || s.abs() <= BOUNDARY_EPS {
            return if last == GateSide::Unknown {
                GateSide::Inside
            } else {
                last
            };
        }

        if s < 0.0 {
            GateSide::Before
        } else {
            GateSide::After
        }
    }

    /// Signed perpendicular offset of a point from the gate's long axis.
    /// Negative on the Before side, positive on the After side.
    pub fn signed_offset(&self, p: Point) -> f32 {
        offset(p, self.centroid, self.normal)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

/// Signed perpendicular offset of `p` from the long axis through `c`.
fn offset(p: Point, c: Point, normal: (f32, f32)) -> f32 {
    (p.0 - c.0) * normal.0 + (p.1 - c.1) * normal.1
}

/// Unit normal to the polygon's principal (long) axis, from the 2x2
/// covariance of the vertices. The sign is normalized so results are
/// deterministic: the normal points toward positive x, breaking ties
/// toward positive y.
fn principal_normal(points: &[Point], centroid: Point) -> (f32, f32) {
    let (mut sxx, mut sxy, mut syy) = (0.0f32, 0.0f32, 0.0f32);
    for p in points {
        let dx = p.0 - centroid.0;
        let dy = p.1 - centroid.1;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    // Axis direction of largest variance; the normal is its perpendicular.
    let (ax, ay) = (theta.cos(), theta.sin());
    let (mut nx, mut ny) = (-ay, ax);

    if nx < 0.0 || (nx == 0.0 && ny < 0.0) {
        nx = -nx;
        ny = -ny;
    }
    (nx, ny)
}

/// Even-odd rule. Points exactly on an edge may land on either side of the
/// test; the boundary epsilon in `classify` absorbs that ambiguity.
pub fn point_in_polygon(p: Point, poly: &[Point]) -> bool {
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (xi, yi) = poly[i];
        let (xj, yj) = poly[j];
        if ((yi > p.1) != (yj > p.1))
            && (p.0 < (xj - xi) * (p.1 - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Shoelace area, absolute.
pub fn polygon_area(poly: &[Point]) -> f32 {
    let mut acc = 0.0f32;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        acc += (poly[j].0 + poly[i].0) * (poly[j].1 - poly[i].1);
        j = i;
    }
    (acc / 2.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_gate() -> Region {
        // Gate at x=50±5 in a 100x100 frame
        Region::new(vec![(45.0, 0.0), (55.0, 0.0), (55.0, 100.0), (45.0, 100.0)]).unwrap()
    }

    #[test]
    fn rejects_too_few_points() {
        assert!(Region::new(vec![(0.0, 0.0), (1.0, 1.0)]).is_err());
    }

    #[test]
    fn rejects_degenerate_polygon() {
        // Three collinear points, zero area
        assert!(Region::new(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]).is_err());
    }

    #[test]
    fn vertical_gate_sides() {
        let gate = vertical_gate();
        assert_eq!(gate.classify((40.0, 50.0), GateSide::Unknown), GateSide::Before);
        assert_eq!(gate.classify((50.0, 50.0), GateSide::Unknown), GateSide::Inside);
        assert_eq!(gate.classify((70.0, 50.0), GateSide::Unknown), GateSide::After);
    }

    #[test]
    fn horizontal_gate_sides() {
        let gate =
            Region::new(vec![(0.0, 45.0), (100.0, 45.0), (100.0, 55.0), (0.0, 55.0)]).unwrap();
        assert_eq!(gate.classify((50.0, 10.0), GateSide::Unknown), GateSide::Before);
        assert_eq!(gate.classify((50.0, 50.0), GateSide::Unknown), GateSide::Inside);
        assert_eq!(gate.classify((50.0, 90.0), GateSide::Unknown), GateSide::After);
    }

    #[test]
    fn boundary_keeps_last_side() {
        let gate = vertical_gate();
        // Exactly on the x=45 boundary line, outside the polygon test
        let p = (45.0 - 0.0005, 50.0);
        assert_eq!(gate.classify(p, GateSide::Before), GateSide::Before);
        assert_eq!(gate.classify(p, GateSide::Inside), GateSide::Inside);
        assert_eq!(gate.classify(p, GateSide::Unknown), GateSide::Inside);
    }

    #[test]
    fn classification_is_deterministic() {
        let gate = vertical_gate();
        let p = (62.3, 17.9);
        let a = gate.classify(p, GateSide::Unknown);
        let b = gate.classify(p, GateSide::Unknown);
        assert_eq!(a, b);
    }

    #[test]
    fn default_center_strip_matches_manual_region() {
        let gate = Region::default_center_strip(100.0, 100.0, 5.0).unwrap();
        assert_eq!(gate.classify((40.0, 1.0), GateSide::Unknown), GateSide::Before);
        assert_eq!(gate.classify((60.0, 99.0), GateSide::Unknown), GateSide::After);
    }

    #[test]
    fn point_in_polygon_basics() {
        let poly = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        assert!(point_in_polygon((5.0, 5.0), &poly));
        assert!(!point_in_polygon((15.0, 5.0), &poly));
        assert!(!point_in_polygon((5.0, -1.0), &poly));
    }
}
