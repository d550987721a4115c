use super::space::Point;
#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use num_complex::Complex64;
use std::collections::BTreeSet;

/// A vertex of the triangulation; the unit of solver unknowns.
///
/// The `id` doubles as the row/column index of the node in the assembled system, so
/// the ids in a [Mesh](super::Mesh) are always dense and zero based.
///
/// Two `Node`s are equal when they sit at the same location; the id does not take part.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    /// 0 for interior nodes, otherwise the tag of the boundary the node lies on
    pub marker: u32,
    pub coords: Point,
    /// Solved potential
    pub value: Complex64,
    /// Prescribed potential (set during assembly for Dirichlet rows)
    pub fixed: Option<Complex64>,
    pub(crate) neighbors: BTreeSet<usize>,
    pub(crate) elements: BTreeSet<usize>,
}

impl Node {
    pub fn new(id: usize, coords: Point, marker: u32) -> Self {
        Self {
            id,
            marker,
            coords,
            value: Complex64::from(0.0),
            fixed: None,
            neighbors: BTreeSet::new(),
            elements: BTreeSet::new(),
        }
    }

    /// IDs of the nodes sharing an element with this one
    pub fn neighbors(&self) -> impl Iterator<Item = usize> + '_ {
        self.neighbors.iter().copied()
    }

    /// IDs of the elements which have this node as a corner
    pub fn elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.elements.iter().copied()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn is_neighbor(&self, node_id: usize) -> bool {
        self.neighbors.contains(&node_id)
    }

    pub(crate) fn connect_elem(&mut self, elem_id: usize, corners: [usize; 3]) {
        self.elements.insert(elem_id);
        for corner in corners.into_iter().filter(|c| *c != self.id) {
            self.neighbors.insert(corner);
        }
    }

    /// Produce a Json Object that describes this Node
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "x": self.coords.x,
            "y": self.coords.y,
            "marker": self.marker,
            "value": [self.value.re, self.value.im],
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.coords == other.coords
    }
}

impl Eq for Node {}
