use super::super::mesh::{space::Point, MeshError};
use spade::{
    AngleLimit, ConstrainedDelaunayTriangulation, Point2, RefinementParameters, Triangulation,
};

/// Plain arrays handed to the triangulator
pub(crate) struct TriangulationInput {
    pub points: Vec<Point>,
    pub segments: Vec<[usize; 2]>,
    pub min_angle_deg: f64,
    pub max_area: Option<f64>,
    pub max_steiner_points: usize,
}

/// Owned copy of everything the triangulator produced
pub(crate) struct TriangulationOutput {
    /// Input points first (in input order, duplicates merged), then inserted Steiner points
    pub points: Vec<Point>,
    /// Index of each input point in `points`
    pub input_map: Vec<usize>,
    pub triangles: Vec<[usize; 3]>,
    /// Sub-segments of the input segments after refinement
    pub constraint_edges: Vec<[usize; 2]>,
    /// False if refinement stopped at the Steiner point limit before meeting the angle bound
    pub complete: bool,
}

/// Run a constrained Delaunay triangulation with quality refinement
///
/// The triangulation structure never leaves this function: results are copied into plain
/// vectors and the triangulator's storage is released before returning.
pub(crate) fn triangulate(input: &TriangulationInput) -> Result<TriangulationOutput, MeshError> {
    let mut cdt: ConstrainedDelaunayTriangulation<Point2<f64>> =
        ConstrainedDelaunayTriangulation::new();

    let mut handles = Vec::with_capacity(input.points.len());
    for p in input.points.iter() {
        let handle = cdt
            .insert(Point2::new(p.x, p.y))
            .map_err(|err| MeshError::Triangulator(format!("cannot insert {}: {:?}", p, err)))?;
        handles.push(handle);
    }

    for &[a, b] in input.segments.iter() {
        let (from, to) = (handles[a], handles[b]);
        if from == to || cdt.exists_constraint(from, to) {
            continue;
        }
        if !cdt.can_add_constraint(from, to) {
            return Err(MeshError::IntersectingSegments(
                input.points[a],
                input.points[b],
            ));
        }
        cdt.add_constraint(from, to);
    }

    let mut params = RefinementParameters::<f64>::new()
        .with_angle_limit(AngleLimit::from_deg(input.min_angle_deg))
        .exclude_outer_faces(false)
        .with_max_additional_vertices(input.max_steiner_points);
    if let Some(max_area) = input.max_area {
        params = params.with_max_allowed_area(max_area);
    }

    let num_before = cdt.num_vertices();
    let result = cdt.refine(params);
    log::debug!(
        "refinement inserted {} Steiner points",
        cdt.num_vertices() - num_before
    );

    let mut points = vec![Point::default(); cdt.num_vertices()];
    for vertex in cdt.vertices() {
        let position = vertex.position();
        points[vertex.fix().index()] = Point::new(position.x, position.y);
    }

    let triangles = cdt
        .inner_faces()
        .map(|face| face.vertices().map(|v| v.fix().index()))
        .collect();

    let constraint_edges = cdt
        .undirected_edges()
        .filter(|edge| cdt.is_constraint_edge(edge.fix()))
        .map(|edge| edge.vertices().map(|v| v.fix().index()))
        .collect();

    Ok(TriangulationOutput {
        points,
        input_map: handles.iter().map(|h| h.index()).collect(),
        triangles,
        constraint_edges,
        complete: result.refinement_complete,
    })
}
