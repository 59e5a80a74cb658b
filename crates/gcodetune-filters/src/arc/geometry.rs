//! Planar geometry for arc detection
//!
//! A circle is fitted to a window of points by the closed-form least
//! squares method (Coope/Kasa style on centered coordinates). Degenerate
//! windows (near-collinear or coincident points) are a normal outcome and
//! yield no circle rather than an error.

use std::f64::consts::PI;

/// A point in the XY plane
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length of the vector from the origin
    pub fn amplitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Angle of the vector from `center` to this point, in (−π, π]
    pub fn phase_from(&self, center: &Point) -> f64 {
        (self.y - center.y).atan2(self.x - center.x)
    }

    /// Dot product, treating both points as vectors from the origin
    pub fn dot(&self, other: &Point) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Point;
    fn mul(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Winding direction of a traversed arc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Counter-clockwise (G3)
    CounterClockwise,
    /// Clockwise (G2)
    Clockwise,
}

/// A fitted circle over a window of points
#[derive(Debug, Clone)]
pub struct Circle {
    pub radius: f64,
    pub center: Point,
    pub direction: Direction,
    pub start: Point,
    pub end: Point,
}

/// Fit a circle to `points` by closed-form least squares.
///
/// Returns `None` when the point cloud has no usable variance (collinear
/// or coincident points make the normal equations singular).
pub fn fit_circle(points: &[Point], epsilon: f64) -> Option<(Point, f64)> {
    let count = points.len();
    if count < 3 {
        return None;
    }

    let n = count as f64;
    let xbar = points.iter().map(|p| p.x).sum::<f64>() / n;
    let ybar = points.iter().map(|p| p.y).sum::<f64>() / n;

    let mut suu = 0.0;
    let mut suuu = 0.0;
    let mut suvv = 0.0;
    let mut suv = 0.0;
    let mut svv = 0.0;
    let mut svvv = 0.0;
    let mut svuu = 0.0;
    for p in points {
        let u = p.x - xbar;
        let v = p.y - ybar;
        suu += u * u;
        suuu += u * u * u;
        suvv += u * v * v;
        suv += u * v;
        svv += v * v;
        svvv += v * v * v;
        svuu += v * u * u;
    }

    if suu.abs() < epsilon {
        return None;
    }
    let denominator = (-(suv * suv)) / suu + svv;
    if denominator.abs() < epsilon {
        return None;
    }

    let v = ((svvv + svuu) / 2.0 - (suv / 2.0) * ((suuu + suvv) / suu)) / denominator;
    let u = ((suuu + suvv) / 2.0 - v * suv) / suu;

    let center = Point::new(u + xbar, v + ybar);
    let radius_sq = u * u + v * v + (suu + svv) / n;
    if radius_sq <= 0.0 || !radius_sq.is_finite() {
        return None;
    }
    Some((center, radius_sq.sqrt()))
}

/// Distance of each point from the fitted circumference
pub fn radial_errors(points: &[Point], center: &Point, radius: f64) -> Vec<f64> {
    points
        .iter()
        .map(|p| (p.distance_to(center) - radius).abs())
        .collect()
}

/// Normalize an angle difference into (−π, π]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Signed angular steps between consecutive points, seen from `center`
pub fn phase_steps(points: &[Point], center: &Point) -> Vec<f64> {
    points
        .windows(2)
        .map(|w| normalize_angle(w[1].phase_from(center) - w[0].phase_from(center)))
        .collect()
}

/// Chord length subtended by `angle` at `radius`
pub fn chord_length(radius: f64, angle: f64) -> f64 {
    2.0 * radius * (angle.abs() / 2.0).sin()
}

/// Arc length subtended by `angle` at `radius`
pub fn arc_length(radius: f64, angle: f64) -> f64 {
    radius * angle.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_points(cx: f64, cy: f64, r: f64, n: usize, ccw: bool) -> Vec<Point> {
        (0..n)
            .map(|k| {
                let theta = 2.0 * PI * (k as f64) / (n as f64) * if ccw { 1.0 } else { -1.0 };
                Point::new(cx + r * theta.cos(), cy + r * theta.sin())
            })
            .collect()
    }

    #[test]
    fn test_fit_recovers_circle() {
        let points = circle_points(30.0, -12.0, 10.0, 12, true);
        let (center, radius) = fit_circle(&points, 1e-9).unwrap();
        assert!((center.x - 30.0).abs() < 1e-6);
        assert!((center.y + 12.0).abs() < 1e-6);
        assert!((radius - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_points_have_no_circle() {
        let points: Vec<Point> = (0..10).map(|k| Point::new(k as f64, 2.0 * k as f64)).collect();
        assert!(fit_circle(&points, 1e-9).is_none());
    }

    #[test]
    fn test_coincident_points_have_no_circle() {
        let points = vec![Point::new(1.0, 1.0); 10];
        assert!(fit_circle(&points, 1e-9).is_none());
    }

    #[test]
    fn test_normalize_angle_range() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(-3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(0.1) - 0.1).abs() < 1e-12);
        assert!((normalize_angle(-0.1) + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_phase_steps_uniform_on_regular_polygon() {
        let points = circle_points(0.0, 0.0, 5.0, 8, true);
        let (center, _) = fit_circle(&points, 1e-9).unwrap();
        let steps = phase_steps(&points, &center);
        let expected = 2.0 * PI / 8.0;
        for step in steps {
            assert!((step - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_chord_shorter_than_arc() {
        let angle = PI / 4.0;
        assert!(chord_length(10.0, angle) < arc_length(10.0, angle));
    }
}
