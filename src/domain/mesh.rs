/// A line between two Nodes
pub mod edge;
/// A triangular Element and triangle geometry helpers
pub mod element;
/// A vertex of the triangulation
pub mod node;
/// Points, vectors, and geometric predicates in 2D Real Space
pub mod space;

use super::materials::{Boundary, Region, INTERIOR_MARKER, NEUMANN_MARKER};
use edge::{edge_key, Edge};
use element::{angles, centroid, signed_area, Element};
use node::Node;
use space::{BBox, Point};

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use num_complex::Complex64;
use smallvec::SmallVec;
use std::collections::BTreeMap;
#[cfg(feature = "json_export")]
use std::{fs::File, io::BufWriter};
use thiserror::Error;

/// Length unit the geometry is modeled in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

impl Units {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            Self::Millimeters => 1.0e-3,
            Self::Inches => 0.0254,
        }
    }
}

/// A constraint segment handed to the triangulator
///
/// Segments come from the input outlines and are distinct from the resulting mesh [Edge]s
/// (refinement may split one segment into several edges).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub points: [Point; 2],
    pub marker: u32,
}

/// A sub-area excluded from the triangulation
///
/// Points inside a hole zone belong to the enclosing outline's boundary, never to an Element.
#[derive(Clone, Debug)]
pub struct HoleZone {
    /// The hole point as given to the builder
    pub point: Point,
    /// Innermost input outline enclosing `point`
    pub outline: Vec<Point>,
    pub bbox: BBox,
    /// Tag of the boundary assigned to the enclosing outline, if any
    pub boundary: Option<u32>,
}

impl HoleZone {
    pub fn contains(&self, p: &Point) -> bool {
        self.bbox.contains(p) && space::polygon_contains(&self.outline, p)
    }
}

/// Errors encountered while building or modifying a Mesh
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("no outlines or vertices were provided; cannot build Mesh")]
    EmptyInput,
    #[error("outline {0} has fewer than 3 distinct points")]
    DegenerateOutline(usize),
    #[error("region tag {0} is invalid or already in use")]
    DuplicateRegion(u32),
    #[error("boundary tag {0} is invalid or already in use")]
    DuplicateBoundary(u32),
    #[error("outline {outline} references boundary {tag} which is not defined")]
    UnknownBoundary { outline: usize, tag: u32 },
    #[error("region {0} has no reference points")]
    MissingReferencePoint(u32),
    #[error("reference point {point} of region {tag} is not inside the triangulation")]
    ReferencePointOutside { tag: u32, point: Point },
    #[error("the outline segment {0} -> {1} intersects another outline")]
    IntersectingSegments(Point, Point),
    #[error("the triangulator failed: {0}")]
    Triangulator(String),
    #[error("Element {elem} has a non-positive area ({area:e})")]
    NonPositiveArea { elem: usize, area: f64 },
    #[error("refinement produced no Elements")]
    NoElements,
}

/// The triangulation, its material zones, and its boundary conditions
///
/// Nodes, Edges, and Elements live in flat arenas and reference each other by index.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub segments: Vec<Segment>,
    pub elements: Vec<Element>,
    pub regions: Vec<Region>,
    pub boundaries: Vec<Boundary>,
    pub units: Units,
    holes: Vec<HoleZone>,
    bbox: Option<BBox>,
    region_lookup: BTreeMap<u32, usize>,
    boundary_lookup: BTreeMap<u32, usize>,
    edge_lookup: BTreeMap<[usize; 2], usize>,
}

impl Mesh {
    /// Construct a completely empty Mesh
    pub fn blank(units: Units) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            segments: Vec::new(),
            elements: Vec::new(),
            regions: Vec::new(),
            boundaries: Vec::new(),
            units,
            holes: Vec::new(),
            bbox: None,
            region_lookup: BTreeMap::new(),
            boundary_lookup: BTreeMap::new(),
            edge_lookup: BTreeMap::new(),
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Construction
    // ----------------------------------------------------------------------------------------------------

    /// Register a Region. Tags must be unique and >= 1.
    pub fn add_region(&mut self, mut region: Region) -> Result<usize, MeshError> {
        if region.tag == INTERIOR_MARKER || self.region_lookup.contains_key(&region.tag) {
            return Err(MeshError::DuplicateRegion(region.tag));
        }
        let idx = self.regions.len();
        region.elements.clear();
        self.region_lookup.insert(region.tag, idx);
        self.regions.push(region);
        Ok(idx)
    }

    /// Register a Boundary. Tags must be unique and >= 1; the reserved Neumann marker needs no
    /// Boundary and cannot be given one.
    pub fn add_boundary(&mut self, mut boundary: Boundary) -> Result<usize, MeshError> {
        if boundary.tag == INTERIOR_MARKER
            || boundary.tag == NEUMANN_MARKER
            || self.boundary_lookup.contains_key(&boundary.tag)
        {
            return Err(MeshError::DuplicateBoundary(boundary.tag));
        }
        let idx = self.boundaries.len();
        boundary.edges.clear();
        self.boundary_lookup.insert(boundary.tag, idx);
        self.boundaries.push(boundary);
        Ok(idx)
    }

    /// Add a Node and return its id
    pub fn add_node(&mut self, coords: Point, marker: u32) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::new(id, coords, marker));
        id
    }

    /// Add an Element and return its id
    ///
    /// The Element is registered with its three corners (and its Region, if any). Corners
    /// given in clockwise order are flipped to counter-clockwise.
    pub fn add_element(&mut self, corners: [usize; 3], region: Option<usize>) -> usize {
        let id = self.elements.len();
        let [a, b, c] = corners;
        let corners = if signed_area([a, b, c].map(|n| &self.nodes[n].coords)) < 0.0 {
            [a, c, b]
        } else {
            corners
        };

        let elem = Element::new(id, corners, region);
        for node_id in corners {
            self.nodes[node_id].connect_elem(id, corners);
        }
        if let Some(region_idx) = region {
            self.regions[region_idx].elements.push(id);
        }
        self.elements.push(elem);
        id
    }

    pub(crate) fn add_hole_zone(&mut self, hole: HoleZone) {
        self.holes.push(hole);
    }

    /// Compute derived connectivity after all Nodes and Elements have been added:
    /// * face-adjacent Element neighbors
    /// * the Edge list (taking markers from `constraint_markers` where given)
    /// * Boundary Edge lists
    /// * the bounding box
    pub fn finalize(&mut self, constraint_markers: &BTreeMap<[usize; 2], u32>) {
        self.connect_element_neighbors();
        self.build_edges(constraint_markers);
        self.collect_boundary_edges();
        self.bbox = BBox::around(self.nodes.iter().map(|n| &n.coords));
    }

    fn connect_element_neighbors(&mut self) {
        for elem_id in 0..self.elements.len() {
            let corners = self.elements[elem_id].nodes;
            let neighbors: SmallVec<[usize; 3]> = (0..3)
                .filter_map(|i| self.element_across(elem_id, corners[i], corners[(i + 1) % 3]))
                .collect();
            self.elements[elem_id].neighbors = neighbors;
        }
    }

    fn build_edges(&mut self, constraint_markers: &BTreeMap<[usize; 2], u32>) {
        self.edges.clear();
        self.edge_lookup.clear();

        for elem in self.elements.iter() {
            for i in 0..3 {
                let key = edge_key(elem.nodes[i], elem.nodes[(i + 1) % 3]);
                if !self.edge_lookup.contains_key(&key) {
                    let id = self.edges.len();
                    let marker = constraint_markers.get(&key).copied().unwrap_or(INTERIOR_MARKER);
                    self.edges.push(Edge::new(id, key, marker));
                    self.edge_lookup.insert(key, id);
                }
            }
        }
    }

    /// An Edge belongs to a Boundary when both of its endpoints carry the Boundary's marker
    /// and the Edge itself was produced from a tagged outline segment.
    fn collect_boundary_edges(&mut self) {
        for boundary in self.boundaries.iter_mut() {
            boundary.edges.clear();
        }
        for edge in self.edges.iter() {
            let [m0, m1] = edge.nodes.map(|n| self.nodes[n].marker);
            if edge.marker != INTERIOR_MARKER && m0 == edge.marker && m1 == edge.marker {
                if let Some(&b_idx) = self.boundary_lookup.get(&edge.marker) {
                    self.boundaries[b_idx].edges.push(edge.id);
                }
            }
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // General Data Retrieval
    // ----------------------------------------------------------------------------------------------------

    pub fn region_by_tag(&self, tag: u32) -> Option<&Region> {
        self.region_lookup.get(&tag).map(|idx| &self.regions[*idx])
    }

    pub fn region_index(&self, tag: u32) -> Option<usize> {
        self.region_lookup.get(&tag).copied()
    }

    pub fn boundary_by_tag(&self, tag: u32) -> Option<&Boundary> {
        self.boundary_lookup.get(&tag).map(|idx| &self.boundaries[*idx])
    }

    /// The Region an Element belongs to
    pub fn element_region(&self, elem_id: usize) -> Option<&Region> {
        self.elements[elem_id].region.map(|idx| &self.regions[idx])
    }

    /// Edges accumulated on the Boundary with `tag`
    pub fn boundary_edges(&self, tag: u32) -> Option<impl Iterator<Item = &Edge> + '_> {
        self.boundary_by_tag(tag)
            .map(|b| b.edges.iter().map(|id| &self.edges[*id]))
    }

    pub fn edge_between(&self, a: usize, b: usize) -> Option<&Edge> {
        self.edge_lookup.get(&edge_key(a, b)).map(|id| &self.edges[*id])
    }

    /// Get the three [Point]s composing an [Element]
    pub fn element_points(&self, elem_id: usize) -> [&Point; 3] {
        assert!(elem_id < self.elements.len());
        self.elements[elem_id]
            .nodes
            .map(|node_id| &self.nodes[node_id].coords)
    }

    pub fn element_area(&self, elem_id: usize) -> f64 {
        signed_area(self.element_points(elem_id))
    }

    pub fn element_centroid(&self, elem_id: usize) -> Point {
        centroid(self.element_points(elem_id))
    }

    /// The Element on the other side of the edge `[a, b]` from `elem_id`
    ///
    /// `None` if the edge lies on the outside of the triangulation (or a hole)
    pub fn element_across(&self, elem_id: usize, a: usize, b: usize) -> Option<usize> {
        let node_b = &self.nodes[b];
        self.nodes[a]
            .elements
            .iter()
            .copied()
            .find(|e| *e != elem_id && node_b.elements.contains(e))
    }

    /// Number of Elements sharing the edge `[a, b]`
    pub fn num_elements_on_edge(&self, a: usize, b: usize) -> usize {
        let node_b = &self.nodes[b];
        self.nodes[a]
            .elements
            .iter()
            .filter(|e| node_b.elements.contains(e))
            .count()
    }

    /// An edge with only one adjacent Element lies on the outside of the triangulation
    pub fn is_hull_edge(&self, a: usize, b: usize) -> bool {
        self.num_elements_on_edge(a, b) == 1
    }

    /// Bounding rectangle of all Nodes (available once the Mesh is finalized)
    pub fn bbox(&self) -> Option<BBox> {
        self.bbox
    }

    pub fn holes(&self) -> &[HoleZone] {
        &self.holes
    }

    /// Smallest and largest potential magnitude over all Nodes
    pub fn value_range(&self) -> Option<[f64; 2]> {
        self.nodes.iter().map(|n| n.value.norm()).fold(None, |acc, v| match acc {
            None => Some([v, v]),
            Some([lo, hi]) => Some([lo.min(v), hi.max(v)]),
        })
    }

    /// Smallest interior angle (degrees) over all Elements
    pub fn min_angle(&self) -> Option<f64> {
        (0..self.elements.len())
            .flat_map(|e| angles(self.element_points(e)))
            .map(f64::to_degrees)
            .reduce(f64::min)
    }

    /// Overwrite every Node's potential with the given solution vector
    ///
    /// Nodes with a prescribed value keep exactly that value; the solution is only taken
    /// for free Nodes.
    pub(crate) fn commit_values(&mut self, values: &[Complex64]) {
        assert_eq!(values.len(), self.nodes.len());
        for (node, value) in self.nodes.iter_mut().zip(values) {
            node.value = node.fixed.unwrap_or(*value);
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Consistency
    // ----------------------------------------------------------------------------------------------------

    /// Check the structural invariants of the Mesh, returning a description of each violation
    ///
    /// * Node ids are dense and match their position
    /// * Node -> Element and Element -> Node membership agree
    /// * Neighbor sets agree with the Element corner lists
    /// * Region Element counts add up to the total Element count
    /// * Every Element has a positive area
    pub fn check_consistency(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (idx, node) in self.nodes.iter().enumerate() {
            if node.id != idx {
                problems.push(format!("Node at index {} has id {}", idx, node.id));
            }
        }

        let mut expected_elems: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut expected_neighbors: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for elem in self.elements.iter() {
            for &n in elem.nodes.iter() {
                expected_elems[n].push(elem.id);
                expected_neighbors[n].extend(elem.nodes.iter().copied().filter(|o| *o != n));
            }
        }

        for node in self.nodes.iter() {
            let expected = &mut expected_elems[node.id];
            expected.sort_unstable();
            expected.dedup();
            if !expected.iter().eq(node.elements.iter()) {
                problems.push(format!(
                    "Node {} is connected to {} Elements but is a corner of {}",
                    node.id,
                    node.elements.len(),
                    expected.len()
                ));
            }

            let neighbors = &mut expected_neighbors[node.id];
            neighbors.sort_unstable();
            neighbors.dedup();
            if !neighbors.iter().eq(node.neighbors.iter()) {
                problems.push(format!("Node {} has an inconsistent neighbor set", node.id));
            }
        }

        let region_total: usize = self.regions.iter().map(|r| r.elements.len()).sum();
        if region_total != self.elements.len() {
            problems.push(format!(
                "Regions hold {} Elements but the Mesh has {}",
                region_total,
                self.elements.len()
            ));
        }

        for elem in self.elements.iter() {
            let area = self.element_area(elem.id);
            if area <= 0.0 {
                problems.push(format!("Element {} has area {:e}", elem.id, area));
            }
        }

        problems
    }

    /// Print the mesh to a JSON file specified by path.
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        self.to_json().write_pretty(&mut w, 4)?;

        Ok(())
    }

    /// Produce a Json Object that describes the whole Mesh
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        let bbox: JsonValue = match self.bbox {
            Some(bb) => object! {
                "min": [bb.min[0], bb.min[1]],
                "max": [bb.max[0], bb.max[1]],
            },
            None => JsonValue::Null,
        };

        object! {
            "Units": match self.units {
                Units::Millimeters => "mm",
                Units::Inches => "in",
            },
            "BBox": bbox,
            "Nodes": JsonValue::from(self.nodes.iter().map(Node::to_json).collect::<Vec<_>>()),
            "Edges": JsonValue::from(self.edges.iter().map(Edge::to_json).collect::<Vec<_>>()),
            "Elements": JsonValue::from(self.elements.iter().map(Element::to_json).collect::<Vec<_>>()),
            "Regions": JsonValue::from(self.regions.iter().map(Region::to_json).collect::<Vec<_>>()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::materials::{Boundary, Region};

    /// A unit square split into 4 triangles around a center node
    ///
    /// ```text
    ///  3 ----------- 2
    ///  |  \   2   /  |
    ///  |    \   /    |
    ///  | 3    4    1 |
    ///  |    /   \    |
    ///  |  /   0   \  |
    ///  0 ----------- 1
    /// ```
    pub(crate) fn pinwheel_mesh() -> Mesh {
        let mut mesh = Mesh::blank(Units::Millimeters);
        let region = mesh
            .add_region(Region::dielectric(1, "air", Complex64::from(1.0)))
            .unwrap();
        mesh.add_boundary(Boundary::fixed(7, "ground", Complex64::from(0.0)))
            .unwrap();

        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            mesh.add_node(Point::new(x, y), 7);
        }
        mesh.add_node(Point::new(0.5, 0.5), 0);

        mesh.add_element([0, 1, 4], Some(region));
        mesh.add_element([1, 2, 4], Some(region));
        mesh.add_element([2, 3, 4], Some(region));
        mesh.add_element([3, 0, 4], Some(region));

        let markers = [[0, 1], [1, 2], [2, 3], [0, 3]]
            .into_iter()
            .map(|k| (k, 7))
            .collect();
        mesh.finalize(&markers);
        mesh
    }

    #[test]
    fn element_registration() {
        let mesh = pinwheel_mesh();

        assert_eq!(mesh.nodes[4].num_elements(), 4);
        assert_eq!(mesh.nodes[0].num_elements(), 2);
        assert!(mesh.nodes[0].is_neighbor(4));
        assert!(!mesh.nodes[0].is_neighbor(2));
        assert_eq!(mesh.nodes[4].neighbors().count(), 4);

        assert!(mesh.check_consistency().is_empty());
        for elem in mesh.elements.iter() {
            assert!(mesh.element_area(elem.id) > 0.0);
            assert_eq!(elem.neighbors().len(), 2);
        }
    }

    #[test]
    fn clockwise_corners_are_flipped() {
        let mut mesh = Mesh::blank(Units::Inches);
        mesh.add_node(Point::new(0.0, 0.0), 0);
        mesh.add_node(Point::new(0.0, 1.0), 0);
        mesh.add_node(Point::new(1.0, 0.0), 0);
        let e = mesh.add_element([0, 1, 2], None);
        assert!(mesh.element_area(e) > 0.0);
    }

    #[test]
    fn adjacency_queries() {
        let mesh = pinwheel_mesh();

        assert_eq!(mesh.element_across(0, 1, 4), Some(1));
        assert_eq!(mesh.element_across(0, 0, 1), None);
        assert!(mesh.is_hull_edge(0, 1));
        assert!(!mesh.is_hull_edge(0, 4));
        assert_eq!(mesh.edges.len(), 8);
        assert_eq!(mesh.edge_between(1, 0).unwrap().marker, 7);
        assert_eq!(mesh.edge_between(4, 0).unwrap().marker, 0);
        assert_eq!(mesh.boundary_edges(7).unwrap().count(), 4);
        assert!(mesh.boundary_edges(8).is_none());

        let bb = mesh.bbox().unwrap();
        assert_eq!(bb.min, [0.0, 0.0]);
        assert_eq!(bb.max, [1.0, 1.0]);
        assert!((mesh.min_angle().unwrap() - 45.0).abs() < 1e-10);
    }

    #[test]
    fn region_and_boundary_tags() {
        let mut mesh = pinwheel_mesh();
        assert!(mesh
            .add_region(Region::dielectric(1, "dup", Complex64::from(1.0)))
            .is_err());
        assert!(mesh
            .add_region(Region::dielectric(0, "zero", Complex64::from(1.0)))
            .is_err());
        assert!(mesh.add_boundary(Boundary::neumann(7, "dup")).is_err());
        assert!(mesh
            .add_boundary(Boundary::neumann(NEUMANN_MARKER, "reserved"))
            .is_err());
        assert_eq!(mesh.region_by_tag(1).unwrap().num_elements(), 4);
        assert_eq!(mesh.element_region(2).unwrap().tag, 1);
    }

    #[test]
    fn inconsistent_region_counts_are_reported() {
        let mut mesh = pinwheel_mesh();
        mesh.regions[0].elements.pop();
        let problems = mesh.check_consistency();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("Regions hold 3"));
    }
}
