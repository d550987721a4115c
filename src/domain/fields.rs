use super::locate::{Location, Locator};
use super::mesh::{element::signed_area, space::Point, Mesh};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use nalgebra::{SMatrix, SVector};
use num_complex::Complex64;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
#[cfg(feature = "json_export")]
use std::{fs::File, io::BufWriter};

/// Number of nodes used by the quadratic least-squares fit
const QUADRATIC_FIT_NODES: usize = 6;

/// How the potential and its gradient are reconstructed inside an Element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FitMethod {
    /// Plane through the three corners
    #[default]
    Linear,
    /// Quadratic polynomial through the six nearest nodes of the same Region (falls back to
    /// `Linear` when there aren't enough of them)
    Quadratic,
}

/// The potential and its gradient at a point
#[derive(Clone, Copy, Debug)]
pub struct FieldSample {
    pub location: Location,
    pub potential: Complex64,
    /// d/dx and d/dy of the potential, per model unit
    pub grad: [Complex64; 2],
}

impl FieldSample {
    /// Magnitude of the gradient (per model unit)
    pub fn field(&self) -> f64 {
        (self.grad[0].norm_sqr() + self.grad[1].norm_sqr()).sqrt()
    }
}

/// Evaluate the solved potential at `p`
///
/// Points in a hole zone take the value of the zone's boundary. `None` is returned for
/// points outside the Mesh, points the walk could not resolve, and holes with no fixed value.
pub fn sample(
    mesh: &Mesh,
    locator: &mut Locator,
    p: &Point,
    method: FitMethod,
) -> Option<FieldSample> {
    let location = locator.locate(mesh, p);
    match location {
        Location::Element(elem) => {
            let (potential, grad) = match method {
                FitMethod::Linear => linear_fit(mesh, elem, p),
                FitMethod::Quadratic => quadratic_fit(mesh, elem, p).unwrap_or_else(|| {
                    log::debug!(
                        "not enough nodes around Element {} for a quadratic fit; using the linear fit",
                        elem
                    );
                    linear_fit(mesh, elem, p)
                }),
            };
            Some(FieldSample {
                location,
                potential,
                grad,
            })
        }
        Location::Hole(hole) => {
            let value = mesh.holes()[hole]
                .boundary
                .and_then(|tag| mesh.boundary_by_tag(tag))
                .and_then(|b| b.dirichlet_value())?;
            Some(FieldSample {
                location,
                potential: value,
                grad: [Complex64::from(0.0); 2],
            })
        }
        Location::Outside | Location::Unresolved => {
            log::debug!("no field data at {} ({:?})", p, location);
            None
        }
    }
}

/// Gradient of the plane through the corner potentials of an Element
pub fn element_gradient(mesh: &Mesh, elem_id: usize) -> [Complex64; 2] {
    let [a, b, c] = mesh.element_points(elem_id);
    let [va, vb, vc] = mesh.elements[elem_id].nodes.map(|n| mesh.nodes[n].value);
    let two_area = 2.0 * signed_area([a, b, c]);

    let gx = (va * (b.y - c.y) + vb * (c.y - a.y) + vc * (a.y - b.y)) / two_area;
    let gy = (va * (c.x - b.x) + vb * (a.x - c.x) + vc * (b.x - a.x)) / two_area;
    [gx, gy]
}

/// Potential and gradient at `p` from the plane through the corners of `elem_id`
pub fn linear_fit(mesh: &Mesh, elem_id: usize, p: &Point) -> (Complex64, [Complex64; 2]) {
    let [gx, gy] = element_gradient(mesh, elem_id);
    let corner = &mesh.nodes[mesh.elements[elem_id].nodes[0]];
    let potential = corner.value + gx * (p.x - corner.coords.x) + gy * (p.y - corner.coords.y);
    (potential, [gx, gy])
}

/// Potential and gradient at `p` from a least-squares quadratic through nearby nodes
///
/// Candidates are the corners of `elem_id` and their neighbors. A neighbor only qualifies if
/// one of its Elements is in the same Region as `elem_id`, so the fit never reaches across a
/// material interface. Returns `None` if fewer than six nodes qualify or the system is singular.
pub fn quadratic_fit(
    mesh: &Mesh,
    elem_id: usize,
    p: &Point,
) -> Option<(Complex64, [Complex64; 2])> {
    let region = mesh.elements[elem_id].region;
    let corners = mesh.elements[elem_id].nodes;

    let candidates: BTreeSet<usize> = corners
        .iter()
        .flat_map(|c| std::iter::once(*c).chain(mesh.nodes[*c].neighbors()))
        .collect();

    let mut qualified: Vec<(f64, usize)> = candidates
        .into_iter()
        .filter(|n| {
            corners.contains(n)
                || mesh.nodes[*n]
                    .elements()
                    .any(|e| mesh.elements[e].region == region)
        })
        .map(|n| (mesh.nodes[n].coords.dist(p), n))
        .collect();

    if qualified.len() < QUADRATIC_FIT_NODES {
        return None;
    }
    qualified.sort_by(|a, b| a.0.total_cmp(&b.0));
    qualified.truncate(QUADRATIC_FIT_NODES);

    // scale offsets to O(1) to keep the system well conditioned
    let h = qualified
        .iter()
        .map(|(d, _)| *d)
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);

    let mut m = SMatrix::<Complex64, 6, 6>::zeros();
    let mut rhs = SVector::<Complex64, 6>::zeros();
    for (row, (_, n)) in qualified.iter().enumerate() {
        let node = &mesh.nodes[*n];
        let dx = (node.coords.x - p.x) / h;
        let dy = (node.coords.y - p.y) / h;
        for (col, term) in [1.0, dx, dy, dx * dx, dx * dy, dy * dy].into_iter().enumerate() {
            m[(row, col)] = Complex64::from(term);
        }
        rhs[row] = node.value;
    }

    let coeffs = m.lu().solve(&rhs)?;
    Some((coeffs[0], [coeffs[1] / h, coeffs[2] / h]))
}

// ----------------------------------------------------------------------------------------------------
// Contours
// ----------------------------------------------------------------------------------------------------

/// A polyline of constant potential magnitude
#[derive(Clone, Debug, PartialEq)]
pub struct ContourLine {
    pub value: f64,
    pub points: Vec<Point>,
}

impl ContourLine {
    pub fn is_closed(&self) -> bool {
        self.points.len() > 2 && self.points.first() == self.points.last()
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "value": self.value,
            "points": JsonValue::from(self.points.iter().map(|p| JsonValue::from(*p)).collect::<Vec<_>>()),
        }
    }
}

/// `count` evenly spaced levels strictly inside the range of node potential magnitudes
pub fn contour_levels(mesh: &Mesh, count: usize) -> Vec<f64> {
    match mesh.value_range() {
        Some([lo, hi]) if hi > lo => {
            let step = (hi - lo) / (count + 1) as f64;
            (1..=count).map(|i| lo + step * i as f64).collect()
        }
        _ => Vec::new(),
    }
}

/// Line segments where the linear interpolant of |potential| equals `level`
///
/// An edge crosses the level when one endpoint magnitude is below it and the other is not.
/// Each triangle with exactly two crossing edges contributes one segment.
pub fn contour_segments(mesh: &Mesh, level: f64) -> Vec<[Point; 2]> {
    let magnitude: Vec<f64> = mesh.nodes.iter().map(|n| n.value.norm()).collect();

    // interpolate along the edge in sorted-id order so neighbors produce identical points
    let crossing = |a: usize, b: usize| -> Option<Point> {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        let (va, vb) = (magnitude[a], magnitude[b]);
        if (va < level) == (vb < level) {
            return None;
        }
        let t = (level - va) / (vb - va);
        let (pa, pb) = (&mesh.nodes[a].coords, &mesh.nodes[b].coords);
        Some(Point::new(pa.x + t * (pb.x - pa.x), pa.y + t * (pb.y - pa.y)))
    };

    mesh.elements
        .iter()
        .filter_map(|elem| {
            let [a, b, c] = elem.nodes;
            let found: Vec<Point> = [(a, b), (b, c), (c, a)]
                .into_iter()
                .filter_map(|(i, j)| crossing(i, j))
                .collect();
            match found.as_slice() {
                [p, q] if p != q => Some([*p, *q]),
                _ => None,
            }
        })
        .collect()
}

/// Contour polylines for each level, computed in parallel (one task per level)
pub fn contour_lines(mesh: &Mesh, levels: &[f64]) -> Vec<ContourLine> {
    let lines: Vec<ContourLine> = levels
        .par_iter()
        .flat_map_iter(|level| {
            chain_segments(contour_segments(mesh, *level))
                .into_iter()
                .map(move |points| ContourLine {
                    value: *level,
                    points,
                })
        })
        .collect();

    log::debug!(
        "extracted {} contour lines over {} levels",
        lines.len(),
        levels.len()
    );
    lines
}

/// Join segments which share endpoints into polylines
fn chain_segments(segments: Vec<[Point; 2]>) -> Vec<Vec<Point>> {
    let mut at_point: HashMap<Point, Vec<usize>> = HashMap::new();
    for (i, [p, q]) in segments.iter().enumerate() {
        at_point.entry(*p).or_default().push(i);
        at_point.entry(*q).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];

    // follow unused segments from `end`, appending their far endpoints
    let extend = |line: &mut Vec<Point>, used: &mut Vec<bool>| loop {
        let end = match line.last() {
            Some(end) => *end,
            None => return,
        };
        let next = at_point
            .get(&end)
            .and_then(|ids| ids.iter().copied().find(|i| !used[*i]));
        match next {
            Some(i) => {
                used[i] = true;
                let [p, q] = segments[i];
                line.push(if p == end { q } else { p });
            }
            None => return,
        }
    };

    let mut lines = Vec::new();
    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;

        let mut forward = vec![segments[start][0], segments[start][1]];
        extend(&mut forward, &mut used);

        let mut backward = vec![segments[start][0]];
        extend(&mut backward, &mut used);

        backward.reverse();
        backward.pop();
        backward.extend(forward);
        lines.push(backward);
    }
    lines
}

/// Print contour lines to a JSON file specified by path.
#[cfg(feature = "json_export")]
pub fn export_contours_to_json(
    lines: &[ContourLine],
    path: impl AsRef<str>,
) -> std::io::Result<()> {
    let f = File::create(path.as_ref())?;
    let mut w = BufWriter::new(&f);

    JsonValue::from(lines.iter().map(|l| l.to_json()).collect::<Vec<_>>()).write_pretty(&mut w, 4)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mesh::tests::pinwheel_mesh;

    /// Pinwheel mesh holding the linear potential 2x - y + 1 (plus a constant imaginary part)
    fn linear_potential() -> Mesh {
        let mut mesh = pinwheel_mesh();
        for node in mesh.nodes.iter_mut() {
            node.value = Complex64::new(2.0 * node.coords.x - node.coords.y + 1.0, 0.5);
        }
        mesh
    }

    #[test]
    fn linear_fit_is_exact_for_planes() {
        let mesh = linear_potential();
        for elem in 0..mesh.elements.len() {
            let [gx, gy] = element_gradient(&mesh, elem);
            assert!((gx - Complex64::new(2.0, 0.0)).norm() < 1e-12);
            assert!((gy - Complex64::new(-1.0, 0.0)).norm() < 1e-12);
        }

        let mut locator = Locator::with_seed(2);
        let s = sample(&mesh, &mut locator, &Point::new(0.3, 0.2), FitMethod::Linear).unwrap();
        assert!((s.potential - Complex64::new(1.4, 0.5)).norm() < 1e-12);
        assert!((s.field() - 5.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn quadratic_fit_needs_six_nodes() {
        // the pinwheel only has five nodes
        let mesh = linear_potential();
        assert!(quadratic_fit(&mesh, 0, &Point::new(0.5, 0.2)).is_none());

        let mut locator = Locator::with_seed(2);
        let s = sample(&mesh, &mut locator, &Point::new(0.5, 0.2), FitMethod::Quadratic).unwrap();
        assert!((s.potential - Complex64::new(1.8, 0.5)).norm() < 1e-12);
    }

    #[test]
    fn outside_points_have_no_data() {
        let mesh = linear_potential();
        let mut locator = Locator::with_seed(2);
        assert!(sample(&mesh, &mut locator, &Point::new(2.0, 2.0), FitMethod::Linear).is_none());
    }

    #[test]
    fn contour_extraction() {
        let mesh = linear_potential();
        let [lo, hi] = mesh.value_range().unwrap();

        assert!(contour_segments(&mesh, lo - 1e-6).is_empty());
        assert!(contour_segments(&mesh, hi + 1e-6).is_empty());

        let levels = contour_levels(&mesh, 3);
        assert_eq!(levels.len(), 3);
        assert!(levels.iter().all(|l| *l > lo && *l < hi));

        let lines = contour_lines(&mesh, &levels);
        assert!(!lines.is_empty());
        for line in lines.iter() {
            assert!(line.points.len() >= 2);
            for p in line.points.iter() {
                let v = Complex64::new(2.0 * p.x - p.y + 1.0, 0.5).norm();
                assert!((v - line.value).abs() < 0.2);
            }
        }
    }

    #[test]
    fn segments_are_chained() {
        let segments = vec![
            [Point::new(1.0, 0.0), Point::new(2.0, 0.0)],
            [Point::new(3.0, 0.0), Point::new(2.0, 0.0)],
            [Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
            [Point::new(5.0, 5.0), Point::new(6.0, 5.0)],
        ];
        let mut lines = chain_segments(segments);
        lines.sort_by_key(|l| l.len());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 2);
        assert_eq!(lines[1].len(), 4);

        let xs: Vec<f64> = lines[1].iter().map(|p| p.x).collect();
        assert!(xs == vec![0.0, 1.0, 2.0, 3.0] || xs == vec![3.0, 2.0, 1.0, 0.0]);
    }
}
