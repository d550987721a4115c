/// Conversion boundary around the constrained Delaunay triangulator
mod triangulate;

use super::materials::{
    marker_priority, Boundary, Region, INTERIOR_MARKER, NEUMANN_MARKER,
};
use super::mesh::{
    space::{orient, polygon_contains, segment_distance, BBox, Point},
    HoleZone, Mesh, MeshError, Segment, Units,
};
use triangulate::{triangulate, TriangulationInput, TriangulationOutput};

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Default lower bound on every triangle angle (degrees)
pub const DEFAULT_MIN_ANGLE: f64 = 28.6;

/// Quality constraints for mesh refinement
#[derive(Clone, Copy, Debug)]
pub struct BuildOptions {
    /// Minimum interior angle of every triangle (degrees)
    pub min_angle_deg: f64,
    /// Upper bound on triangle area (model units squared)
    pub max_element_area: Option<f64>,
    /// Refinement stops after inserting this many points, even if the angle bound isn't met
    pub max_steiner_points: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            min_angle_deg: DEFAULT_MIN_ANGLE,
            max_element_area: None,
            max_steiner_points: 50_000,
        }
    }
}

impl BuildOptions {
    pub fn with_min_angle(mut self, degrees: f64) -> Self {
        self.min_angle_deg = degrees;
        self
    }

    pub fn with_max_area(mut self, area: f64) -> Self {
        self.max_element_area = Some(area);
        self
    }

    pub fn with_max_steiner_points(mut self, count: usize) -> Self {
        self.max_steiner_points = count;
        self
    }
}

/// A closed polygon in the input geometry
///
/// The last point connects back to the first. If a `boundary` tag is given, every Node
/// produced along the outline carries that tag as its marker.
#[derive(Clone, Debug)]
pub struct Outline {
    pub points: Vec<Point>,
    pub boundary: Option<u32>,
}

impl Outline {
    fn bbox(&self) -> Option<BBox> {
        BBox::around(self.points.iter())
    }

    /// Consecutive duplicates (and a repeated closing point) removed
    fn cleaned(&self) -> Vec<Point> {
        let mut pts: Vec<Point> = Vec::with_capacity(self.points.len());
        for p in self.points.iter() {
            if pts.last() != Some(p) {
                pts.push(*p);
            }
        }
        while pts.len() > 1 && pts.first() == pts.last() {
            pts.pop();
        }
        pts
    }
}

/// Collects geometry, materials, and boundary conditions; produces a refined [Mesh]
///
/// ```text
///   outlines + vertices ──► constraint points/segments ──► triangulator
///   region reference points ──► region flood fill ──┐          │
///   hole points ──► hole flood fill ────────────────┼── triangles
///                                                   ▼
///                                                  Mesh
/// ```
#[derive(Clone, Debug, Default)]
pub struct MeshBuilder {
    units: Units,
    options: BuildOptions,
    outlines: Vec<Outline>,
    vertices: Vec<Point>,
    regions: Vec<Region>,
    boundaries: Vec<Boundary>,
    holes: Vec<Point>,
}

impl MeshBuilder {
    pub fn new(units: Units) -> Self {
        Self {
            units,
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn add_outline(&mut self, points: Vec<Point>, boundary: Option<u32>) -> &mut Self {
        self.outlines.push(Outline { points, boundary });
        self
    }

    /// Convenience for an axis aligned rectangular outline
    pub fn add_rectangle(
        &mut self,
        min: [f64; 2],
        max: [f64; 2],
        boundary: Option<u32>,
    ) -> &mut Self {
        self.add_outline(
            vec![
                Point::new(min[0], min[1]),
                Point::new(max[0], min[1]),
                Point::new(max[0], max[1]),
                Point::new(min[0], max[1]),
            ],
            boundary,
        )
    }

    /// A free standing vertex which the triangulation must contain
    pub fn add_vertex(&mut self, point: Point) -> &mut Self {
        self.vertices.push(point);
        self
    }

    pub fn add_region(&mut self, region: Region) -> &mut Self {
        self.regions.push(region);
        self
    }

    pub fn add_boundary(&mut self, boundary: Boundary) -> &mut Self {
        self.boundaries.push(boundary);
        self
    }

    /// Mark the area enclosed by the innermost outline around `point` as excluded from the mesh
    pub fn add_hole(&mut self, point: Point) -> &mut Self {
        self.holes.push(point);
        self
    }

    /// Triangulate and refine the geometry, then resolve Regions, Boundaries, and hole zones
    pub fn build(&self) -> Result<Mesh, MeshError> {
        if self.outlines.is_empty() && self.vertices.is_empty() {
            return Err(MeshError::EmptyInput);
        }

        let mut mesh = Mesh::blank(self.units);
        for boundary in self.boundaries.iter() {
            mesh.add_boundary(boundary.clone())?;
        }
        for region in self.regions.iter() {
            if region.points.is_empty() {
                return Err(MeshError::MissingReferencePoint(region.tag));
            }
            mesh.add_region(region.clone())?;
        }

        // ---- constraint points and segments ----
        let mut points: Vec<Point> = Vec::new();
        let mut point_ids: HashMap<Point, usize> = HashMap::new();
        let mut intern = |p: Point, points: &mut Vec<Point>| -> usize {
            *point_ids.entry(p).or_insert_with(|| {
                points.push(p);
                points.len() - 1
            })
        };

        let mut segments: Vec<[usize; 2]> = Vec::new();
        for (outline_idx, outline) in self.outlines.iter().enumerate() {
            if let Some(tag) = outline.boundary {
                if tag != NEUMANN_MARKER && mesh.boundary_by_tag(tag).is_none() {
                    return Err(MeshError::UnknownBoundary {
                        outline: outline_idx,
                        tag,
                    });
                }
            }

            let cleaned = outline.cleaned();
            if cleaned.len() < 3 {
                return Err(MeshError::DegenerateOutline(outline_idx));
            }

            let ids: Vec<usize> = cleaned.iter().map(|p| intern(*p, &mut points)).collect();
            let marker = outline.boundary.unwrap_or(INTERIOR_MARKER);
            for i in 0..ids.len() {
                let (a, b) = (ids[i], ids[(i + 1) % ids.len()]);
                segments.push([a, b]);
                mesh.segments.push(Segment {
                    points: [points[a], points[b]],
                    marker,
                });
            }
        }
        for vertex in self.vertices.iter() {
            intern(*vertex, &mut points);
        }

        let output = triangulate(&TriangulationInput {
            points,
            segments,
            min_angle_deg: self.options.min_angle_deg,
            max_area: self.options.max_element_area,
            max_steiner_points: self.options.max_steiner_points,
        })?;

        if !output.complete {
            log::warn!(
                "refinement stopped after {} Steiner points before reaching the {}° angle bound",
                self.options.max_steiner_points,
                self.options.min_angle_deg
            );
        }

        // ---- markers for nodes and constraint edges ----
        let (node_markers, edge_markers) = self.resolve_markers(&mesh, &output);

        // ---- region and hole assignment ----
        let assignment = self.assign_regions(&mesh, &output)?;

        // ---- copy the kept triangles into the mesh ----
        let mut new_ids: BTreeMap<usize, usize> = BTreeMap::new();
        for (tri, state) in output.triangles.iter().zip(assignment.iter()) {
            if let TriState::Region(_) = state {
                for corner in tri.iter() {
                    new_ids.insert(*corner, 0);
                }
            }
        }
        for (old_id, new_id) in new_ids.iter_mut() {
            *new_id = mesh.add_node(output.points[*old_id], node_markers[*old_id]);
        }

        let mut discarded = 0;
        for (tri, state) in output.triangles.iter().zip(assignment.iter()) {
            match state {
                TriState::Region(region_idx) => {
                    mesh.add_element(tri.map(|c| new_ids[&c]), Some(*region_idx));
                }
                _ => discarded += 1,
            }
        }
        log::debug!("discarded {} triangles outside every region", discarded);

        if mesh.elements.is_empty() {
            return Err(MeshError::NoElements);
        }

        let constraint_markers: BTreeMap<[usize; 2], u32> = edge_markers
            .into_iter()
            .filter_map(|([a, b], marker)| {
                let (a, b) = (new_ids.get(&a)?, new_ids.get(&b)?);
                Some((if a <= b { [*a, *b] } else { [*b, *a] }, marker))
            })
            .collect();
        mesh.finalize(&constraint_markers);

        for hole in self.holes.iter() {
            match self.enclosing_outline(hole) {
                Some((outline, bbox)) => mesh.add_hole_zone(HoleZone {
                    point: *hole,
                    outline: outline.cleaned(),
                    bbox,
                    boundary: outline.boundary,
                }),
                None => log::warn!("hole point {} is not enclosed by any outline", hole),
            }
        }

        for elem in mesh.elements.iter() {
            let area = mesh.element_area(elem.id);
            if area <= 0.0 {
                return Err(MeshError::NonPositiveArea {
                    elem: elem.id,
                    area,
                });
            }
        }

        if cfg!(debug_assertions) {
            for problem in mesh.check_consistency() {
                log::error!("mesh consistency: {}", problem);
            }
        }

        log::info!(
            "built mesh with {} nodes, {} elements, {} edges (min angle {:.2}°)",
            mesh.nodes.len(),
            mesh.elements.len(),
            mesh.edges.len(),
            mesh.min_angle().unwrap_or(0.0)
        );

        Ok(mesh)
    }

    /// Give every output point and constraint edge the marker of the tagged outline it lies on
    ///
    /// Points inserted by refinement sit on sub-segments of the input segments, so each
    /// constraint edge is matched back to the input segment containing both of its endpoints.
    fn resolve_markers(
        &self,
        mesh: &Mesh,
        output: &TriangulationOutput,
    ) -> (Vec<u32>, Vec<([usize; 2], u32)>) {
        let tol = BBox::around(output.points.iter())
            .map(|bb| bb.diagonal() * 1e-9)
            .unwrap_or(1e-12);

        let neumann = |marker: u32| {
            marker == NEUMANN_MARKER
                || mesh
                    .boundary_by_tag(marker)
                    .map(|b| b.neumann)
                    .unwrap_or(false)
        };

        let mut node_markers = vec![INTERIOR_MARKER; output.points.len()];
        let mut edge_markers = Vec::with_capacity(output.constraint_edges.len());

        for &[a, b] in output.constraint_edges.iter() {
            let (pa, pb) = (&output.points[a], &output.points[b]);
            let marker = mesh
                .segments
                .iter()
                .filter(|s| {
                    segment_distance(&s.points[0], &s.points[1], pa) < tol
                        && segment_distance(&s.points[0], &s.points[1], pb) < tol
                })
                .map(|s| s.marker)
                .max_by_key(|m| marker_priority(*m, neumann(*m)))
                .unwrap_or(INTERIOR_MARKER);

            if marker == INTERIOR_MARKER {
                continue;
            }
            edge_markers.push(([a, b], marker));

            for node in [a, b] {
                let current = node_markers[node];
                let priority = marker_priority(marker, neumann(marker));
                if priority > marker_priority(current, neumann(current)) {
                    node_markers[node] = marker;
                }
            }
        }

        (node_markers, edge_markers)
    }

    /// Flood fill from the hole points and then from each Region's reference points
    ///
    /// Fills never cross a constraint edge. Triangles reached by no Region are discarded.
    fn assign_regions(
        &self,
        mesh: &Mesh,
        output: &TriangulationOutput,
    ) -> Result<Vec<TriState>, MeshError> {
        let constraints: BTreeSet<[usize; 2]> = output
            .constraint_edges
            .iter()
            .map(|&[a, b]| if a <= b { [a, b] } else { [b, a] })
            .collect();

        let mut edge_tris: HashMap<[usize; 2], Vec<usize>> = HashMap::new();
        for (t, tri) in output.triangles.iter().enumerate() {
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                edge_tris
                    .entry(if a <= b { [a, b] } else { [b, a] })
                    .or_default()
                    .push(t);
            }
        }

        let mut states = vec![TriState::Unassigned; output.triangles.len()];

        let flood = |seed: usize, fill: TriState, states: &mut Vec<TriState>| {
            let mut stack = vec![seed];
            while let Some(t) = stack.pop() {
                if states[t] != TriState::Unassigned {
                    continue;
                }
                states[t] = fill;
                let tri = output.triangles[t];
                for i in 0..3 {
                    let (a, b) = (tri[i], tri[(i + 1) % 3]);
                    let key = if a <= b { [a, b] } else { [b, a] };
                    if constraints.contains(&key) {
                        continue;
                    }
                    stack.extend(
                        edge_tris[&key]
                            .iter()
                            .copied()
                            .filter(|n| states[*n] == TriState::Unassigned),
                    );
                }
            }
        };

        for hole in self.holes.iter() {
            match find_triangle(output, hole) {
                Some(t) => flood(t, TriState::Hole, &mut states),
                None => log::warn!("hole point {} lies outside the triangulation", hole),
            }
        }

        for (region_idx, region) in mesh.regions.iter().enumerate() {
            for point in region.points.iter() {
                let t = find_triangle(output, point).ok_or(MeshError::ReferencePointOutside {
                    tag: region.tag,
                    point: *point,
                })?;
                match states[t] {
                    TriState::Unassigned => flood(t, TriState::Region(region_idx), &mut states),
                    TriState::Hole => log::warn!(
                        "reference point {} of region {} lies inside a hole",
                        point,
                        region.tag
                    ),
                    TriState::Region(other) if other != region_idx => log::warn!(
                        "reference point {} of region {} lies in the area already claimed by region {}",
                        point,
                        region.tag,
                        mesh.regions[other].tag
                    ),
                    TriState::Region(_) => {}
                }
            }
        }

        Ok(states)
    }

    /// Innermost input outline (by nested bounding box) that contains `point`
    fn enclosing_outline(&self, point: &Point) -> Option<(&Outline, BBox)> {
        self.outlines
            .iter()
            .filter_map(|o| o.bbox().map(|bb| (o, bb)))
            .filter(|(o, bb)| bb.contains(point) && polygon_contains(&o.cleaned(), point))
            .reduce(|inner, candidate| {
                if inner.1.encloses(&candidate.1) {
                    candidate
                } else {
                    inner
                }
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TriState {
    Unassigned,
    Hole,
    Region(usize),
}

fn find_triangle(output: &TriangulationOutput, p: &Point) -> Option<usize> {
    output.triangles.iter().position(|tri| {
        let [a, b, c] = tri.map(|i| &output.points[i]);
        let sign = orient(a, b, c).signum();
        [orient(a, b, p), orient(b, c, p), orient(c, a, p)]
            .iter()
            .all(|o| o * sign >= 0.0)
    })
}
