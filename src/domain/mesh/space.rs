use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Index, Mul, Sub};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};

#[derive(Clone, Copy, Debug)]
/// 2D vector in Real Space
pub struct V2D {
    inner: [f64; 2],
}

impl V2D {
    pub const fn from([x, y]: [f64; 2]) -> Self {
        Self { inner: [x, y] }
    }

    pub fn dot_with(&self, other: &Self) -> f64 {
        self[0] * other[0] + self[1] * other[1]
    }

    /// z-component of the cross product of two in-plane vectors
    pub fn cross_with(&self, other: &Self) -> f64 {
        self[0] * other[1] - self[1] * other[0]
    }

    pub fn norm(&self) -> f64 {
        self.dot_with(self).sqrt()
    }

    pub fn x(&self) -> f64 {
        self.inner[0]
    }

    pub fn y(&self) -> f64 {
        self.inner[1]
    }
}

impl Default for V2D {
    fn default() -> Self {
        Self { inner: [0.0; 2] }
    }
}

impl Index<usize> for V2D {
    type Output = f64;
    fn index(&self, index: usize) -> &Self::Output {
        &self.inner[index]
    }
}

impl Add for V2D {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            inner: [self[0] + other[0], self[1] + other[1]],
        }
    }
}

impl Sub for V2D {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            inner: [self[0] - other[0], self[1] - other[1]],
        }
    }
}

impl Div<f64> for V2D {
    type Output = Self;
    fn div(self, divisor: f64) -> Self {
        Self {
            inner: [self[0] / divisor, self[1] / divisor],
        }
    }
}

impl Mul<f64> for V2D {
    type Output = Self;
    fn mul(self, coefficient: f64) -> Self {
        Self {
            inner: [self[0] * coefficient, self[1] * coefficient],
        }
    }
}

const POINT_UNIQUENESS_ACCURACY: f64 = 1e-12;

#[derive(Clone, Copy, Debug)]
/// Point in 2D Space
///
/// Equality and hashing are based on the coordinates rounded to [POINT_UNIQUENESS_ACCURACY],
/// so two points at the same location compare equal regardless of how they were computed.
pub struct Point {
    pub x: f64,
    pub y: f64,
    x_cmp: FloatRep,
    y_cmp: FloatRep,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            x_cmp: FloatRep::from(x),
            y_cmp: FloatRep::from(y),
        }
    }

    pub fn between(a: &Self, b: &Self) -> Self {
        Self::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }

    pub fn from([x, y]: [f64; 2]) -> Self {
        Self::new(x, y)
    }

    pub fn dist(&self, other: &Self) -> f64 {
        let dx = (other.x - self.x).abs();
        let dy = (other.y - self.y).abs();

        (dx.powi(2) + dy.powi(2)).sqrt()
    }

    /// Vector pointing from `self` to `other`
    pub fn to(&self, other: &Self) -> V2D {
        V2D::from([other.x - self.x, other.y - self.y])
    }

    /// Angle (radians, in `(-π, π]`) of the vector pointing from `self` to `other`
    pub fn angle_to(&self, other: &Self) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    pub fn x_order(&self, other: &Self) -> Ordering {
        self.x_cmp.cmp(&other.x_cmp)
    }

    pub fn y_order(&self, other: &Self) -> Ordering {
        self.y_cmp.cmp(&other.y_cmp)
    }
}

/// Twice the signed area of the triangle `(a, b, c)`
///
/// Positive if `c` lies to the left of the directed line `a -> b`, negative if it lies to the right.
#[inline]
pub fn orient(a: &Point, b: &Point, c: &Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Strictly right of the directed line `a -> b`
#[inline]
pub fn right_of(a: &Point, b: &Point, p: &Point) -> bool {
    orient(a, b, p) < 0.0
}

/// Even-odd containment test of a point in a closed polygon
pub fn polygon_contains(polygon: &[Point], p: &Point) -> bool {
    let mut inside = false;
    let n = polygon.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (&polygon[i], &polygon[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `p` to the closed segment `a`-`b`
pub fn segment_distance(a: &Point, b: &Point, p: &Point) -> f64 {
    let ab = a.to(b);
    let len_sq = ab.dot_with(&ab);
    if len_sq == 0.0 {
        return a.dist(p);
    }
    let t = (a.to(p).dot_with(&ab) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + ab.x() * t, a.y + ab.y() * t);
    proj.dist(p)
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Div<f64> for Point {
    type Output = Self;

    fn div(self, divis: f64) -> Self {
        Self::new(self.x / divis, self.y / divis)
    }
}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x_cmp.hash(state);
        self.y_cmp.hash(state);
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.x_cmp.eq(&other.x_cmp) && self.y_cmp.eq(&other.y_cmp)
    }
}

impl Eq for Point {}

#[cfg(feature = "json_export")]
impl From<Point> for JsonValue {
    fn from(p: Point) -> Self {
        object! {
            "x": p.x,
            "y": p.y,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(x: {:.10}, y: {:.10})", self.x, self.y)
    }
}

/// Axis aligned bounding rectangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl BBox {
    /// Smallest rectangle containing all the points. `None` if the iterator is empty.
    pub fn around<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| match acc {
            None => Some(Self {
                min: [p.x, p.y],
                max: [p.x, p.y],
            }),
            Some(bb) => Some(Self {
                min: [bb.min[0].min(p.x), bb.min[1].min(p.y)],
                max: [bb.max[0].max(p.x), bb.max[1].max(p.y)],
            }),
        })
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min[0] && p.x <= self.max[0] && p.y >= self.min[1] && p.y <= self.max[1]
    }

    /// Is `other` entirely inside `self`
    pub fn encloses(&self, other: &Self) -> bool {
        other.min[0] >= self.min[0]
            && other.min[1] >= self.min[1]
            && other.max[0] <= self.max[0]
            && other.max[1] <= self.max[1]
    }

    pub fn area(&self) -> f64 {
        (self.max[0] - self.min[0]) * (self.max[1] - self.min[1])
    }

    pub fn diagonal(&self) -> f64 {
        ((self.max[0] - self.min[0]).powi(2) + (self.max[1] - self.min[1]).powi(2)).sqrt()
    }
}

#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
struct FloatRep {
    sign: bool,
    bits: u64,
}

impl FloatRep {
    pub fn from(value: f64) -> Self {
        let integer_part = value.abs().trunc();
        let fractional_rounded =
            (value.abs().fract() / POINT_UNIQUENESS_ACCURACY).round() * POINT_UNIQUENESS_ACCURACY;
        let total_rounded = integer_part + fractional_rounded;

        Self {
            // -0.0 and 0.0 must compare equal
            sign: value.is_sign_positive() || total_rounded == 0.0,
            bits: total_rounded.to_bits(),
        }
    }
}

impl Ord for FloatRep {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.sign, other.sign) {
            (true, true) => self.bits.cmp(&other.bits),
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, false) => self.bits.cmp(&other.bits).reverse(),
        }
    }
}

impl PartialOrd for FloatRep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_identity_by_location() {
        let a = Point::new(0.1 + 0.2, 1.0);
        let b = Point::new(0.3, 1.0);
        assert_eq!(a, b);
        assert_eq!(Point::new(-0.0, 0.0), Point::new(0.0, -0.0));
        assert!(Point::new(0.3, 1.0) != Point::new(0.3, 1.000001));
    }

    #[test]
    fn orientation_predicates() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1.0, 0.0);
        assert!(orient(&a, &b, &Point::new(0.5, 1.0)) > 0.0);
        assert!(right_of(&a, &b, &Point::new(0.5, -1.0)));
        assert!(!right_of(&a, &b, &Point::new(2.0, 0.0)));
    }

    #[test]
    fn polygon_containment() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!(polygon_contains(&square, &Point::new(0.5, 0.5)));
        assert!(!polygon_contains(&square, &Point::new(1.5, 0.5)));
    }

    #[test]
    fn bounding_boxes() {
        let pts = [Point::new(-1.0, 2.0), Point::new(3.0, -4.0)];
        let bb = BBox::around(pts.iter()).unwrap();
        assert_eq!(bb.min, [-1.0, -4.0]);
        assert_eq!(bb.max, [3.0, 2.0]);
        assert!((bb.area() - 24.0).abs() < 1e-14);
        assert!(BBox::around(std::iter::empty()).is_none());
    }

    #[test]
    fn distance_to_segment() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(2.0, 0.0);
        assert!((segment_distance(&a, &b, &Point::new(1.0, 0.5)) - 0.5).abs() < 1e-14);
        assert!((segment_distance(&a, &b, &Point::new(3.0, 0.0)) - 1.0).abs() < 1e-14);
    }
}
