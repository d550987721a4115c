use super::mesh::{
    space::{orient, Point},
    Mesh,
};
use super::materials::INTERIOR_MARKER;

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeSet;

/// Result of a point location query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// The Element containing the point
    Element(usize),
    /// Index into [Mesh::holes] of the hole zone containing the point
    Hole(usize),
    /// The point is outside the Mesh's bounding box
    Outside,
    /// The walk failed to find a containing Element (this is not the same as `Outside`)
    Unresolved,
}

impl Location {
    pub fn element(&self) -> Option<usize> {
        match self {
            Self::Element(id) => Some(*id),
            _ => None,
        }
    }
}

/// Directed edge `org -> dest` of the triangle `elem`, with its third corner `other`
///
/// The corners are always counter-clockwise: `(org, dest, other)`
#[derive(Clone, Copy, Debug)]
struct Walk {
    elem: usize,
    org: usize,
    dest: usize,
    other: usize,
}

enum Step {
    Found(usize),
    Advance(Walk),
    Boundary([usize; 2]),
}

enum Follow {
    Found(usize),
    Resume(Walk),
    Failed,
}

/// Finds the Element containing a point by walking across triangle edges towards it
///
/// The last Element found is cached and used as the starting point of the next walk,
/// so queries for nearby points (contour tracing, probing along a line) stay short.
/// The cache is only a hint: a `Locator` may be used with several Meshes.
#[derive(Clone, Debug)]
pub struct Locator {
    last_hit: Option<usize>,
    rng: StdRng,
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl Locator {
    pub fn new() -> Self {
        Self {
            last_hit: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Locator with a reproducible choice of random start triangles
    pub fn with_seed(seed: u64) -> Self {
        Self {
            last_hit: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn last_hit(&self) -> Option<usize> {
        self.last_hit
    }

    pub fn forget(&mut self) {
        self.last_hit = None;
    }

    pub fn locate(&mut self, mesh: &Mesh, p: &Point) -> Location {
        self.walk(mesh, p, &mut None)
    }

    /// Same as [Locator::locate] but also returns the centroids of every triangle visited
    pub fn locate_traced(&mut self, mesh: &Mesh, p: &Point) -> (Location, Vec<Point>) {
        let mut trace = Some(Vec::new());
        let location = self.walk(mesh, p, &mut trace);
        (location, trace.unwrap_or_default())
    }

    fn walk(&mut self, mesh: &Mesh, p: &Point, trace: &mut Option<Vec<Point>>) -> Location {
        match mesh.bbox() {
            Some(bb) if bb.contains(p) && !mesh.elements.is_empty() => {}
            _ => return Location::Outside,
        }

        if let Some(hole) = mesh.holes().iter().position(|h| h.contains(p)) {
            return Location::Hole(hole);
        }

        let start = self.start_element(mesh);
        let mut walk = initial_edge(mesh, start, p);
        let mut resumed: BTreeSet<usize> = BTreeSet::new();
        let max_steps = 4 * (mesh.elements.len() + mesh.nodes.len()) + 16;

        for _ in 0..max_steps {
            if let Some(t) = trace.as_mut() {
                t.push(mesh.element_centroid(walk.elem));
            }

            match step(mesh, &walk, p) {
                Step::Found(elem) => {
                    self.last_hit = Some(elem);
                    return Location::Element(elem);
                }
                Step::Advance(next) => walk = next,
                Step::Boundary(edge) => {
                    match follow_boundary(mesh, p, edge, &mut resumed, trace) {
                        Follow::Found(elem) => {
                            self.last_hit = Some(elem);
                            return Location::Element(elem);
                        }
                        Follow::Resume(next) => walk = next,
                        Follow::Failed => {
                            log::warn!(
                                "point location failed for {}: no way back into the mesh",
                                p
                            );
                            return Location::Unresolved;
                        }
                    }
                }
            }
        }

        log::warn!(
            "point location for {} did not terminate after {} steps",
            p,
            max_steps
        );
        Location::Unresolved
    }

    /// The cached hit if it's still valid, otherwise a random Element away from the boundaries
    fn start_element(&mut self, mesh: &Mesh) -> usize {
        let n = mesh.elements.len();
        if let Some(last) = self.last_hit.filter(|e| *e < n) {
            return last;
        }

        let mut candidate = self.rng.gen_range(0..n);
        for _ in 0..32 {
            if mesh.elements[candidate]
                .nodes
                .iter()
                .all(|c| mesh.nodes[*c].marker == INTERIOR_MARKER)
            {
                break;
            }
            candidate = self.rng.gen_range(0..n);
        }
        candidate
    }
}

/// Choose the rotation of `elem` whose first edge has `p` on its left (or on it)
fn initial_edge(mesh: &Mesh, elem: usize, p: &Point) -> Walk {
    let corners = mesh.elements[elem].nodes;
    let coords = |n: usize| &mesh.nodes[n].coords;
    let i = (0..3)
        .find(|i| orient(coords(corners[*i]), coords(corners[(i + 1) % 3]), p) >= 0.0)
        .unwrap_or(0);
    Walk {
        elem,
        org: corners[i],
        dest: corners[(i + 1) % 3],
        other: corners[(i + 2) % 3],
    }
}

fn step(mesh: &Mesh, walk: &Walk, p: &Point) -> Step {
    let coords = |n: usize| &mesh.nodes[n].coords;
    let (po, pd, pt) = (coords(walk.org), coords(walk.dest), coords(walk.other));

    if p == po || p == pd {
        return Step::Found(walk.elem);
    }

    let beyond_left = orient(pt, po, p) < 0.0;
    let beyond_right = orient(pd, pt, p) < 0.0;

    let [a, b] = match (beyond_left, beyond_right) {
        (false, false) => return Step::Found(walk.elem),
        (true, false) => [walk.other, walk.org],
        (false, true) => [walk.dest, walk.other],
        (true, true) => {
            let left_mid = Point::between(pt, po);
            let right_mid = Point::between(pd, pt);
            if left_mid.dist(p) <= right_mid.dist(p) {
                [walk.other, walk.org]
            } else {
                [walk.dest, walk.other]
            }
        }
    };

    match cross(mesh, walk.elem, a, b) {
        Some(next) => Step::Advance(next),
        None => Step::Boundary([a, b]),
    }
}

/// Move over the counter-clockwise edge `a -> b` of `elem` into the neighboring triangle
fn cross(mesh: &Mesh, elem: usize, a: usize, b: usize) -> Option<Walk> {
    let next = mesh.element_across(elem, a, b)?;
    let other = mesh.elements[next].opposite_corner(a, b)?;
    Some(Walk {
        elem: next,
        org: b,
        dest: a,
        other,
    })
}

/// Walk along the hull from the edge `[a, b]` until a triangle opens towards `p`
///
/// At each hull node, every incident triangle whose corner wedge contains the direction to `p`
/// is a way back in: either it contains `p`, or its far edge leads on towards it. Each triangle
/// is used to re-enter the mesh at most once per query (tracked in `resumed`).
fn follow_boundary(
    mesh: &Mesh,
    p: &Point,
    [a, b]: [usize; 2],
    resumed: &mut BTreeSet<usize>,
    trace: &mut Option<Vec<Point>>,
) -> Follow {
    let mut visited: BTreeSet<usize> = BTreeSet::new();
    let coords = |n: usize| &mesh.nodes[n].coords;

    let mut node = if coords(a).dist(p) <= coords(b).dist(p) {
        a
    } else {
        b
    };
    let target = coords(node).to(p);
    let target = target / target.norm().max(f64::MIN_POSITIVE);

    loop {
        visited.insert(node);
        let pn = coords(node);

        for elem in mesh.nodes[node].elements() {
            let [_, n1, n2] = match mesh.elements[elem].normalized_on(node) {
                Some(corners) => corners,
                None => continue,
            };
            let (p1, p2) = (coords(n1), coords(n2));
            if orient(pn, p1, p) < 0.0 || orient(p2, pn, p) < 0.0 {
                continue;
            }

            if let Some(t) = trace.as_mut() {
                t.push(mesh.element_centroid(elem));
            }
            if orient(p1, p2, p) >= 0.0 {
                return Follow::Found(elem);
            }
            if resumed.insert(elem) {
                if let Some(next) = cross(mesh, elem, n1, n2) {
                    return Follow::Resume(next);
                }
            }
        }

        let next = mesh.nodes[node]
            .neighbors()
            .filter(|m| !visited.contains(m) && mesh.is_hull_edge(node, *m))
            .map(|m| {
                let dir = pn.to(coords(m));
                (m, dir.dot_with(&target) / dir.norm())
            })
            .max_by(|(_, x), (_, y)| x.total_cmp(y));

        match next {
            Some((m, _)) => node = m,
            None => return Follow::Failed,
        }
    }
}
