/// Physics specific coupling coefficients and source terms
pub mod kernels;

use crate::domain::fields::element_gradient;
use crate::domain::materials::{Material, MaterialKind};
use crate::domain::mesh::{Mesh, Units};
use crate::linalg::{
    faer_solve::{faer_solve_lu, SolveError},
    LinearSystem, SystemRow,
};
use kernels::{
    AxisymmetricElectrostatic, AxisymmetricMagnetostatic, CouplingKernel, FlatElectrostatic,
    FlatMagnetostatic, EPS_0, MU_0,
};

use num_complex::Complex64;
use rayon::prelude::*;
use std::f64::consts::PI;
use thiserror::Error;

/// Which field the potential describes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Physics {
    /// Electric scalar potential (V)
    Electrostatic,
    /// Magnetic vector potential (planar) or flux function (axisymmetric), optionally with
    /// eddy currents at the given frequency (Hz)
    Magnetostatic { frequency: Option<f64> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Geometry {
    /// Cross section of a long body; totals are per meter of depth
    #[default]
    Planar,
    /// Cross section of a body of revolution about the y axis (x is the radius); totals are
    /// per full revolution
    Axisymmetric,
}

/// Pick the coupling kernel for a problem variant
pub fn kernel_for(physics: Physics, geometry: Geometry, units: Units) -> Box<dyn CouplingKernel> {
    match (physics, geometry) {
        (Physics::Electrostatic, Geometry::Planar) => Box::new(FlatElectrostatic::new(units)),
        (Physics::Electrostatic, Geometry::Axisymmetric) => {
            Box::new(AxisymmetricElectrostatic::new(units))
        }
        (Physics::Magnetostatic { frequency }, Geometry::Planar) => {
            Box::new(FlatMagnetostatic::new(units, frequency))
        }
        (Physics::Magnetostatic { frequency }, Geometry::Axisymmetric) => {
            Box::new(AxisymmetricMagnetostatic::new(units, frequency))
        }
    }
}

/// Malformed pairing between the Mesh and its Regions/Boundaries
#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    #[error("Node {node} has marker {marker}, but no Boundary uses that tag")]
    UnknownBoundary { node: usize, marker: u32 },
    #[error("Element {element} does not belong to a Region")]
    UnresolvedRegion { element: usize },
    #[error("Element {element} is in a {found} Region; expected {expected}")]
    MaterialMismatch {
        element: usize,
        found: MaterialKind,
        expected: MaterialKind,
    },
}

#[derive(Debug, Error)]
pub enum FemError {
    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("solve failed: {0}")]
    Solve(#[from] SolveError),
}

/// Overview of a completed solve
#[derive(Clone, Copy, Debug)]
pub struct SolveSummary {
    pub num_nodes: usize,
    /// Number of Dirichlet rows
    pub num_fixed: usize,
    /// Smallest and largest Element field magnitude (V/m for electrostatics, T for magnetostatics)
    pub field_range: Option<[f64; 2]>,
}

/// Build the linear system for a Mesh, one row per Node
///
/// Rows are assembled independently in parallel and merged into the matrix once. Dirichlet
/// rows are `1 * u_i = value`. Each Node's `fixed` value is only updated if every row succeeds.
pub fn assemble(
    mesh: &mut Mesh,
    kernel: &dyn CouplingKernel,
) -> Result<LinearSystem<Complex64>, AssemblyError> {
    let shared: &Mesh = mesh;
    let rows = (0..shared.nodes.len())
        .into_par_iter()
        .map(|node| assemble_row(shared, kernel, node))
        .collect::<Result<Vec<_>, AssemblyError>>()?;

    let (rows, fixed): (Vec<SystemRow<Complex64>>, Vec<Option<Complex64>>) =
        rows.into_iter().unzip();

    let mut system = LinearSystem::new(mesh.nodes.len());
    system.par_extend(rows);

    for (node, value) in mesh.nodes.iter_mut().zip(fixed) {
        node.fixed = value;
    }

    log::debug!(
        "assembled {} rows ({} entries) with the {} kernel",
        system.dimension(),
        system.a.num_entries(),
        kernel.name()
    );
    Ok(system)
}

fn assemble_row(
    mesh: &Mesh,
    kernel: &dyn CouplingKernel,
    node: usize,
) -> Result<(SystemRow<Complex64>, Option<Complex64>), AssemblyError> {
    if let Some(value) = kernel.fixed_value(mesh, node)? {
        let row = SystemRow {
            row: node,
            entries: vec![(node, Complex64::from(1.0))],
            rhs: value,
        };
        return Ok((row, Some(value)));
    }

    let coupling = kernel.coupling_row(mesh, node)?;
    let mut entries = Vec::with_capacity(coupling.off_diagonal.len() + 1);
    entries.push((node, coupling.diagonal));
    entries.extend(coupling.off_diagonal);

    let row = SystemRow {
        row: node,
        entries,
        rhs: kernel.source_term(mesh, node)?,
    };
    Ok((row, None))
}

/// Assemble and solve with an arbitrary kernel, storing the solution on the Nodes
///
/// Node values are left untouched if assembly or the solve fails.
pub fn solve_with(mesh: &mut Mesh, kernel: &dyn CouplingKernel) -> Result<(), FemError> {
    let system = assemble(mesh, kernel)?;
    let values = faer_solve_lu(system, mesh.nodes.len())?;
    mesh.commit_values(&values);
    Ok(())
}

/// Assemble, solve, and evaluate the Element field magnitudes for one problem variant
pub fn solve(
    mesh: &mut Mesh,
    physics: Physics,
    geometry: Geometry,
) -> Result<SolveSummary, FemError> {
    let kernel = kernel_for(physics, geometry, mesh.units);
    log::info!(
        "solving {} nodes with the {} kernel",
        mesh.nodes.len(),
        kernel.name()
    );

    solve_with(mesh, kernel.as_ref())?;

    let magnitudes: Vec<f64> = (0..mesh.elements.len())
        .map(|e| element_field(mesh, e, physics, geometry))
        .collect();
    for (elem, value) in mesh.elements.iter_mut().zip(magnitudes.iter()) {
        elem.value = *value;
    }

    let summary = SolveSummary {
        num_nodes: mesh.nodes.len(),
        num_fixed: mesh.nodes.iter().filter(|n| n.fixed.is_some()).count(),
        field_range: magnitudes.iter().fold(None, |acc, v| match acc {
            None => Some([*v, *v]),
            Some([lo, hi]) => Some([lo.min(*v), hi.max(*v)]),
        }),
    };
    log::info!(
        "solved: {} of {} nodes fixed, field range {:?}",
        summary.num_fixed,
        summary.num_nodes,
        summary.field_range
    );
    Ok(summary)
}

// ----------------------------------------------------------------------------------------------------
// Post Processing
// ----------------------------------------------------------------------------------------------------

/// Magnitude of the physical field in an Element (V/m for electrostatics, T for magnetostatics)
pub fn element_field(mesh: &Mesh, elem: usize, physics: Physics, geometry: Geometry) -> f64 {
    let u = mesh.units.meters_per_unit();
    let [gx, gy] = element_gradient(mesh, elem);
    let grad = (gx.norm_sqr() + gy.norm_sqr()).sqrt() / u;

    match (physics, geometry) {
        (Physics::Magnetostatic { .. }, Geometry::Axisymmetric) => {
            grad / (mesh.element_centroid(elem).x * u)
        }
        _ => grad,
    }
}

/// Volume (m³) represented by an Element: per meter of depth, or per revolution
fn element_volume(mesh: &Mesh, elem: usize, geometry: Geometry) -> f64 {
    let u = mesh.units.meters_per_unit();
    let area = mesh.element_area(elem) * u * u;
    match geometry {
        Geometry::Planar => area,
        Geometry::Axisymmetric => 2.0 * PI * mesh.element_centroid(elem).x * u * area,
    }
}

/// Elements which count towards physical totals (virtual holes are skipped)
fn physical_elements(mesh: &Mesh) -> impl Iterator<Item = (usize, &Material)> + '_ {
    (0..mesh.elements.len()).filter_map(move |e| {
        mesh.element_region(e)
            .filter(|r| !r.virtual_hole)
            .map(|r| (e, &r.material))
    })
}

/// Time averaged energy stored in the field (J, or J/m for planar problems)
pub fn stored_energy(mesh: &Mesh, physics: Physics, geometry: Geometry) -> f64 {
    physical_elements(mesh)
        .map(|(e, material)| {
            let field = element_field(mesh, e, physics, geometry);
            let density = match (physics, material) {
                (Physics::Electrostatic, Material::Dielectric { eps_rel, .. }) => {
                    0.5 * EPS_0 * eps_rel.re * field * field
                }
                (Physics::Electrostatic, _) => 0.0,
                (Physics::Magnetostatic { .. }, _) => {
                    0.5 * field * field * material.mu_rel().inv().re / MU_0
                }
            };
            density * element_volume(mesh, e, geometry)
        })
        .sum()
}

/// Time averaged eddy current loss (W, or W/m for planar problems)
///
/// Uses the potential at each Element's centroid. Zero for static problems.
pub fn eddy_loss(mesh: &Mesh, frequency: f64, geometry: Geometry) -> f64 {
    let omega = 2.0 * PI * frequency;
    let u = mesh.units.meters_per_unit();

    physical_elements(mesh)
        .filter(|(_, material)| material.sigma() > 0.0)
        .map(|(e, material)| {
            let corners = mesh.elements[e].nodes;
            let mut potential = corners
                .iter()
                .map(|n| mesh.nodes[*n].value)
                .sum::<Complex64>()
                / 3.0;
            if geometry == Geometry::Axisymmetric {
                potential /= mesh.element_centroid(e).x * u;
            }
            0.5 * material.sigma() * omega * omega * potential.norm_sqr()
                * element_volume(mesh, e, geometry)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::materials::{Boundary, Region};
    use crate::domain::mesh::tests::pinwheel_mesh;

    #[test]
    fn uniform_boundary_value() {
        let mut mesh = pinwheel_mesh();
        mesh.boundaries[0] = Boundary::fixed(7, "electrode", Complex64::new(5.0, 2.0));

        let summary = solve(&mut mesh, Physics::Electrostatic, Geometry::Planar).unwrap();
        assert_eq!(summary.num_nodes, 5);
        assert_eq!(summary.num_fixed, 4);
        assert!((mesh.nodes[4].value - Complex64::new(5.0, 2.0)).norm() < 1e-12);
        assert_eq!(mesh.nodes[4].fixed, None);
        assert_eq!(mesh.nodes[0].fixed, Some(Complex64::new(5.0, 2.0)));

        let [lo, hi] = summary.field_range.unwrap();
        assert!(lo.abs() < 1e-9 && hi.abs() < 1e-9);
    }

    #[test]
    fn fixed_nodes_keep_their_exact_values() {
        let mut mesh = pinwheel_mesh();
        let value = Complex64::new(0.1, -0.7);
        mesh.boundaries[0] = Boundary::fixed(7, "electrode", value);
        mesh.regions[0] = Region::dielectric(1, "charged", Complex64::new(2.3, -0.01))
            .with_charge_density(EPS_0 * 3.0e5);

        solve(&mut mesh, Physics::Electrostatic, Geometry::Planar).unwrap();
        for node in mesh.nodes.iter().take(4) {
            assert_eq!(node.fixed, Some(value));
            assert_eq!(node.value, value);
        }
        assert_ne!(mesh.nodes[4].value, value);

        // free nodes take the solution; stale values on fixed nodes are overwritten
        mesh.nodes[0].value = Complex64::new(9.0, 9.0);
        mesh.commit_values(&[Complex64::from(1.0); 5]);
        assert_eq!(mesh.nodes[0].value, value);
        assert_eq!(mesh.nodes[4].value, Complex64::from(1.0));
    }

    #[test]
    fn assembled_rows() {
        let mut mesh = pinwheel_mesh();
        let kernel = kernel_for(Physics::Electrostatic, Geometry::Planar, mesh.units);
        let system = assemble(&mut mesh, kernel.as_ref()).unwrap();

        assert_eq!(system.dimension(), 5);
        assert_eq!(system.a.row(0).count(), 1);
        assert_eq!(system.a.get([0, 0]), Some(Complex64::from(1.0)));
        assert_eq!(system.a.row(4).count(), 5);
        assert!((system.a.get([4, 4]).unwrap() - Complex64::from(4.0)).norm() < 1e-12);
        assert!((system.a.get([4, 2]).unwrap() + Complex64::from(1.0)).norm() < 1e-12);
    }

    #[test]
    fn failed_assembly_commits_nothing() {
        let mut mesh = pinwheel_mesh();
        mesh.nodes[4].value = Complex64::new(3.0, 0.0);
        mesh.nodes[2].marker = 42;

        let err = solve(&mut mesh, Physics::Electrostatic, Geometry::Planar).unwrap_err();
        assert!(matches!(
            err,
            FemError::Assembly(AssemblyError::UnknownBoundary { node: 2, marker: 42 })
        ));
        assert_eq!(mesh.nodes[4].value, Complex64::new(3.0, 0.0));
        assert!(mesh.nodes.iter().all(|n| n.fixed.is_none()));
    }

    #[test]
    fn kernel_selection() {
        let names: Vec<&str> = [
            (Physics::Electrostatic, Geometry::Planar),
            (Physics::Electrostatic, Geometry::Axisymmetric),
            (Physics::Magnetostatic { frequency: None }, Geometry::Planar),
            (Physics::Magnetostatic { frequency: Some(50.0) }, Geometry::Axisymmetric),
        ]
        .iter()
        .map(|(p, g)| kernel_for(*p, *g, Units::Inches).name())
        .collect();
        assert_eq!(
            names,
            vec![
                "planar electrostatic",
                "axisymmetric electrostatic",
                "planar magnetostatic",
                "axisymmetric magnetostatic"
            ]
        );
    }

    #[test]
    fn energy_of_a_uniform_field() {
        // V = x volts on a 1mm square: |E| = 1000 V/m over 1e-6 m²
        let mut mesh = pinwheel_mesh();
        for node in mesh.nodes.iter_mut() {
            node.value = Complex64::from(node.coords.x);
        }
        for e in 0..mesh.elements.len() {
            let field = element_field(&mesh, e, Physics::Electrostatic, Geometry::Planar);
            assert!((field - 1000.0).abs() < 1e-9);
        }

        let w = stored_energy(&mesh, Physics::Electrostatic, Geometry::Planar);
        assert!((w - 0.5 * EPS_0).abs() < 1e-9 * EPS_0);

        mesh.regions[0] = Region::dielectric(1, "cavity", Complex64::from(1.0)).as_virtual_hole();
        assert_eq!(stored_energy(&mesh, Physics::Electrostatic, Geometry::Planar), 0.0);
    }

    #[test]
    fn eddy_loss_of_a_uniform_potential() {
        let mut mesh = pinwheel_mesh();
        mesh.regions[0] = Region::conductor(1, "plate", 1.0e6);
        for node in mesh.nodes.iter_mut() {
            node.value = Complex64::new(0.0, 1.0e-3);
        }

        let f = 50.0;
        let omega = 2.0 * PI * f;
        let expected = 0.5 * 1.0e6 * omega * omega * 1.0e-6 * 1.0e-6;
        let loss = eddy_loss(&mesh, f, Geometry::Planar);
        assert!((loss - expected).abs() < 1e-9 * expected);
        assert_eq!(eddy_loss(&mesh, 0.0, Geometry::Planar), 0.0);
    }
}
