use super::space::Point;
#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use smallvec::SmallVec;

/// A triangular cell of the Mesh
///
/// `Element`s don't own their corner `Node`s; they reference them by id. On construction
/// (see [Mesh::add_element](super::Mesh::add_element)) each Element registers itself with its three
/// corners, which in turn learn about each other as neighbors.
///
/// ## Layout
/// Corners are stored counter-clockwise:
/// ```text
///            2
///           / \
///          /   \
///         /     \
///        0 ----- 1
/// ```
/// The order only matters for operations that rotate the triangle onto one of its corners
/// ([Element::normalized_on]); equality ignores rotation and reflection.
#[derive(Debug, Clone)]
pub struct Element {
    pub id: usize,
    pub nodes: [usize; 3],
    /// Index of the owning region in [Mesh::regions](super::Mesh::regions)
    pub region: Option<usize>,
    /// Scalar display value (field magnitude after a solve)
    pub value: f64,
    pub(crate) neighbors: SmallVec<[usize; 3]>,
}

impl Element {
    pub fn new(id: usize, nodes: [usize; 3], region: Option<usize>) -> Self {
        assert!(
            nodes[0] != nodes[1] && nodes[1] != nodes[2] && nodes[0] != nodes[2],
            "Element {} has repeated corners {:?}; cannot construct Element!",
            id,
            nodes
        );

        Self {
            id,
            nodes,
            region,
            value: 0.0,
            neighbors: SmallVec::new(),
        }
    }

    /// Corner ids rotated so that `node_id` comes first (orientation is preserved)
    ///
    /// Returns `None` if `node_id` is not a corner of this Element
    pub fn normalized_on(&self, node_id: usize) -> Option<[usize; 3]> {
        let pos = self.nodes.iter().position(|n| *n == node_id)?;
        Some([
            self.nodes[pos],
            self.nodes[(pos + 1) % 3],
            self.nodes[(pos + 2) % 3],
        ])
    }

    pub fn has_node(&self, node_id: usize) -> bool {
        self.nodes.contains(&node_id)
    }

    /// The corner which is not on the edge `[a, b]`
    pub fn opposite_corner(&self, a: usize, b: usize) -> Option<usize> {
        if !self.has_node(a) || !self.has_node(b) {
            return None;
        }
        self.nodes.iter().copied().find(|n| *n != a && *n != b)
    }

    /// Face-adjacent Elements
    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }

    fn sorted_nodes(&self) -> [usize; 3] {
        let mut sorted = self.nodes;
        sorted.sort_unstable();
        sorted
    }

    /// Produce a Json Object that describes this Element
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "nodes": [self.nodes[0], self.nodes[1], self.nodes[2]],
            "region": self.region,
            "value": self.value,
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.sorted_nodes() == other.sorted_nodes()
    }
}

impl Eq for Element {}

/// Signed area of a triangle (positive when the corners are counter-clockwise)
pub fn signed_area([a, b, c]: [&Point; 3]) -> f64 {
    ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)) / 2.0
}

pub fn centroid([a, b, c]: [&Point; 3]) -> Point {
    Point::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0)
}

/// Cotangent of the interior angle at `vertex` between the rays towards `a` and `b`
pub fn cotangent(vertex: &Point, a: &Point, b: &Point) -> f64 {
    let u = vertex.to(a);
    let v = vertex.to(b);
    u.dot_with(&v) / u.cross_with(&v).abs()
}

/// Interior angles (radians) at each of the three corners
pub fn angles([a, b, c]: [&Point; 3]) -> [f64; 3] {
    let angle = |vertex: &Point, p: &Point, q: &Point| {
        let u = vertex.to(p);
        let v = vertex.to(q);
        u.cross_with(&v).abs().atan2(u.dot_with(&v))
    };
    [angle(a, b, c), angle(b, c, a), angle(c, a, b)]
}
