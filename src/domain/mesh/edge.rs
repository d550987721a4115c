#[cfg(feature = "json_export")]
use json::{object, JsonValue};

/// A straight line between two `Node`s of the triangulation
///
/// Edges are undirected: `[a, b]` and `[b, a]` describe the same Edge.
/// The `marker` is non-zero only when the Edge lies along a tagged boundary outline.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: usize,
    pub nodes: [usize; 2],
    pub marker: u32,
}

impl Edge {
    pub fn new(id: usize, nodes: [usize; 2], marker: u32) -> Self {
        Self { id, nodes, marker }
    }

    /// The node ids sorted in ascending order; used as a lookup key
    pub fn key(&self) -> [usize; 2] {
        edge_key(self.nodes[0], self.nodes[1])
    }

    pub fn has_node(&self, node_id: usize) -> bool {
        self.nodes.contains(&node_id)
    }

    /// The node on the other end of the Edge
    pub fn other_node(&self, node_id: usize) -> Option<usize> {
        match self.nodes {
            [a, b] if a == node_id => Some(b),
            [a, b] if b == node_id => Some(a),
            _ => None,
        }
    }

    /// Produce a Json Object that describes this Edge
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "nodes": [self.nodes[0], self.nodes[1]],
            "marker": self.marker,
        }
    }
}

pub(crate) fn edge_key(a: usize, b: usize) -> [usize; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Edge {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undirected_equality() {
        let a = Edge::new(0, [3, 7], 0);
        let b = Edge::new(5, [7, 3], 2);
        assert_eq!(a, b);
        assert_eq!(a.key(), [3, 7]);
        assert_eq!(b.other_node(7), Some(3));
        assert_eq!(b.other_node(1), None);
    }
}
