use super::AssemblyError;
use crate::domain::materials::{Material, MaterialKind, INTERIOR_MARKER, NEUMANN_MARKER};
use crate::domain::mesh::{element::cotangent, Mesh, Units};

use num_complex::Complex64;
use std::f64::consts::PI;

/// Vacuum permittivity (F/m)
pub const EPS_0: f64 = 8.854_187_812_8e-12;
/// Vacuum permeability (H/m)
pub const MU_0: f64 = 4.0e-7 * PI;

/// Coupling coefficients of one node's row: `diagonal * u_i + sum(off_diagonal_j * u_j)`
#[derive(Clone, Debug, Default)]
pub struct CouplingRow {
    pub diagonal: Complex64,
    /// (node id, coefficient) pairs; a node may appear more than once
    pub off_diagonal: Vec<(usize, Complex64)>,
}

impl CouplingRow {
    /// Add the cotangent-weighted contribution of one incident triangle
    ///
    /// The triangle is normalized so that `node` is its first corner. The edge to each adjacent
    /// corner is weighted by the cotangent of the angle facing it.
    fn add_triangle(&mut self, mesh: &Mesh, node: usize, elem: usize, weight: Complex64) {
        let [n0, n1, n2] = match mesh.elements[elem].normalized_on(node) {
            Some(corners) => corners,
            None => return,
        };
        let [p0, p1, p2] = [n0, n1, n2].map(|n| &mesh.nodes[n].coords);
        let cot_1 = cotangent(p1, p2, p0);
        let cot_2 = cotangent(p2, p0, p1);

        let half = weight / 2.0;
        self.diagonal += half * (cot_1 + cot_2);
        self.off_diagonal.push((n1, -half * cot_2));
        self.off_diagonal.push((n2, -half * cot_1));
    }

    /// Add to the diagonal only (lumped mass terms)
    fn add_diagonal(&mut self, value: Complex64) {
        self.diagonal += value;
    }
}

/// Physics specific part of the assembly
///
/// The assembly driver asks the kernel for each node's Dirichlet value, coupling row,
/// and right hand side; everything else (row storage, merging, solving) is shared.
pub trait CouplingKernel: Sync {
    fn name(&self) -> &'static str;

    /// Coefficients of the node's row in the system matrix
    fn coupling_row(&self, mesh: &Mesh, node: usize) -> Result<CouplingRow, AssemblyError>;

    /// Right hand side entry of the node's row
    fn source_term(&self, mesh: &Mesh, node: usize) -> Result<Complex64, AssemblyError>;

    /// The prescribed value of the node, if its row is a Dirichlet row
    fn fixed_value(&self, mesh: &Mesh, node: usize) -> Result<Option<Complex64>, AssemblyError> {
        boundary_value(mesh, node)
    }
}

/// The value imposed by the Boundary a node's marker refers to
///
/// Interior nodes, nodes with the reserved Neumann marker, and nodes on Neumann Boundaries are
/// free. A marker with no Boundary definition is a configuration error.
pub fn boundary_value(mesh: &Mesh, node: usize) -> Result<Option<Complex64>, AssemblyError> {
    let marker = mesh.nodes[node].marker;
    if marker == INTERIOR_MARKER || marker == NEUMANN_MARKER {
        return Ok(None);
    }
    let boundary = mesh
        .boundary_by_tag(marker)
        .ok_or(AssemblyError::UnknownBoundary { node, marker })?;
    Ok(boundary.dirichlet_value())
}

fn material(mesh: &Mesh, elem: usize) -> Result<&Material, AssemblyError> {
    mesh.element_region(elem)
        .map(|r| &r.material)
        .ok_or(AssemblyError::UnresolvedRegion { element: elem })
}

/// Permittivity and charge density of a triangle in an electrostatic problem
fn dielectric(mesh: &Mesh, elem: usize) -> Result<(Complex64, f64), AssemblyError> {
    match material(mesh, elem)? {
        Material::Dielectric {
            eps_rel,
            charge_density,
        } => Ok((*eps_rel, *charge_density)),
        other => Err(AssemblyError::MaterialMismatch {
            element: elem,
            found: other.kind(),
            expected: MaterialKind::Dielectric,
        }),
    }
}

/// Conductors linked to an electrode are held at the electrode's value
fn electrode_value(mesh: &Mesh, node: usize) -> Result<Option<Complex64>, AssemblyError> {
    if let Some(value) = boundary_value(mesh, node)? {
        return Ok(Some(value));
    }
    for elem in mesh.nodes[node].elements() {
        if let Material::Conductor {
            electrode: Some(tag),
            ..
        } = material(mesh, elem)?
        {
            let boundary = mesh
                .boundary_by_tag(*tag)
                .ok_or(AssemblyError::UnknownBoundary { node, marker: *tag })?;
            if let Some(value) = boundary.dirichlet_value() {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

// ----------------------------------------------------------------------------------------------------
// Electrostatics
// ----------------------------------------------------------------------------------------------------

/// Planar electrostatics: `-div(eps_r grad(V)) = rho / eps_0`
#[derive(Clone, Copy, Debug)]
pub struct FlatElectrostatic {
    /// Converts charge density times model area into the units of the coupling coefficients
    pub source_scale: f64,
}

impl FlatElectrostatic {
    pub fn new(units: Units) -> Self {
        Self {
            source_scale: units.meters_per_unit().powi(2) / EPS_0,
        }
    }
}

impl CouplingKernel for FlatElectrostatic {
    fn name(&self) -> &'static str {
        "planar electrostatic"
    }

    fn fixed_value(&self, mesh: &Mesh, node: usize) -> Result<Option<Complex64>, AssemblyError> {
        electrode_value(mesh, node)
    }

    /// Triangles are visited in angular order around the node so that a break in the fan
    /// (a hole in the mesh next to an interior node) is detected.
    fn coupling_row(&self, mesh: &Mesh, node: usize) -> Result<CouplingRow, AssemblyError> {
        let center = &mesh.nodes[node].coords;
        let mut fan: Vec<(f64, usize)> = mesh.nodes[node]
            .elements()
            .map(|e| (center.angle_to(&mesh.element_centroid(e)), e))
            .collect();
        fan.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut row = CouplingRow::default();
        for (_, elem) in fan.iter() {
            let (eps_rel, _) = dielectric(mesh, *elem)?;
            row.add_triangle(mesh, node, *elem, eps_rel);
        }

        if mesh.nodes[node].marker == INTERIOR_MARKER && !fan_is_closed(mesh, node, &fan) {
            log::debug!("interior node {} has an open triangle fan", node);
        }

        Ok(row)
    }

    fn source_term(&self, mesh: &Mesh, node: usize) -> Result<Complex64, AssemblyError> {
        let mut total = 0.0;
        for elem in mesh.nodes[node].elements() {
            let (_, rho) = dielectric(mesh, elem)?;
            total += rho * mesh.element_area(elem) / 3.0;
        }
        Ok(Complex64::from(total * self.source_scale))
    }
}

/// Each triangle in an angularly sorted fan must share its trailing edge with the next one
fn fan_is_closed(mesh: &Mesh, node: usize, fan: &[(f64, usize)]) -> bool {
    let corners: Vec<[usize; 3]> = fan
        .iter()
        .filter_map(|(_, e)| mesh.elements[*e].normalized_on(node))
        .collect();
    !corners.is_empty()
        && (0..corners.len()).all(|i| corners[i][2] == corners[(i + 1) % corners.len()][1])
}

/// Axisymmetric electrostatics (x is the radius): `-div(r eps_r grad(V)) = r rho / eps_0`
#[derive(Clone, Copy, Debug)]
pub struct AxisymmetricElectrostatic {
    pub source_scale: f64,
}

impl AxisymmetricElectrostatic {
    pub fn new(units: Units) -> Self {
        Self {
            source_scale: units.meters_per_unit().powi(2) / EPS_0,
        }
    }
}

impl CouplingKernel for AxisymmetricElectrostatic {
    fn name(&self) -> &'static str {
        "axisymmetric electrostatic"
    }

    fn fixed_value(&self, mesh: &Mesh, node: usize) -> Result<Option<Complex64>, AssemblyError> {
        electrode_value(mesh, node)
    }

    fn coupling_row(&self, mesh: &Mesh, node: usize) -> Result<CouplingRow, AssemblyError> {
        let mut row = CouplingRow::default();
        for elem in mesh.nodes[node].elements() {
            let (eps_rel, _) = dielectric(mesh, elem)?;
            let radius = mesh.element_centroid(elem).x;
            row.add_triangle(mesh, node, elem, eps_rel * radius);
        }
        Ok(row)
    }

    fn source_term(&self, mesh: &Mesh, node: usize) -> Result<Complex64, AssemblyError> {
        let mut total = 0.0;
        for elem in mesh.nodes[node].elements() {
            let (_, rho) = dielectric(mesh, elem)?;
            let radius = mesh.element_centroid(elem).x;
            total += rho * radius * mesh.element_area(elem) / 3.0;
        }
        Ok(Complex64::from(total * self.source_scale))
    }
}

// ----------------------------------------------------------------------------------------------------
// Magnetostatics
// ----------------------------------------------------------------------------------------------------

/// Planar magnetostatics with optional eddy currents:
/// `-div(1/mu_r grad(A)) + j w sigma mu_0 A = mu_0 J`
#[derive(Clone, Copy, Debug)]
pub struct FlatMagnetostatic {
    /// Angular frequency (rad/s); zero for a static problem
    pub omega: f64,
    pub source_scale: f64,
    pub eddy_scale: f64,
}

impl FlatMagnetostatic {
    pub fn new(units: Units, frequency: Option<f64>) -> Self {
        let u = units.meters_per_unit();
        Self {
            omega: 2.0 * PI * frequency.unwrap_or(0.0),
            source_scale: MU_0 * u * u,
            eddy_scale: MU_0 * u * u,
        }
    }
}

impl CouplingKernel for FlatMagnetostatic {
    fn name(&self) -> &'static str {
        "planar magnetostatic"
    }

    fn coupling_row(&self, mesh: &Mesh, node: usize) -> Result<CouplingRow, AssemblyError> {
        let mut row = CouplingRow::default();
        for elem in mesh.nodes[node].elements() {
            let mat = material(mesh, elem)?;
            row.add_triangle(mesh, node, elem, mat.mu_rel().inv());

            let sigma = mat.sigma();
            if self.omega > 0.0 && sigma > 0.0 {
                let eddy = self.omega * sigma * self.eddy_scale * mesh.element_area(elem) / 3.0;
                row.add_diagonal(Complex64::new(0.0, eddy));
            }
        }
        Ok(row)
    }

    fn source_term(&self, mesh: &Mesh, node: usize) -> Result<Complex64, AssemblyError> {
        let mut total = Complex64::from(0.0);
        for elem in mesh.nodes[node].elements() {
            let j = material(mesh, elem)?.current_density();
            total += j * mesh.element_area(elem) / 3.0;
        }
        Ok(total * self.source_scale)
    }
}

/// Axisymmetric magnetostatics in terms of the flux function `psi = r A_phi`:
/// `-div(1/(mu_r r) grad(psi)) + j w sigma mu_0 psi / r = mu_0 J`
#[derive(Clone, Copy, Debug)]
pub struct AxisymmetricMagnetostatic {
    pub omega: f64,
    pub source_scale: f64,
    pub eddy_scale: f64,
}

impl AxisymmetricMagnetostatic {
    pub fn new(units: Units, frequency: Option<f64>) -> Self {
        let u = units.meters_per_unit();
        Self {
            omega: 2.0 * PI * frequency.unwrap_or(0.0),
            source_scale: MU_0 * u * u * u,
            eddy_scale: MU_0 * u * u,
        }
    }
}

impl CouplingKernel for AxisymmetricMagnetostatic {
    fn name(&self) -> &'static str {
        "axisymmetric magnetostatic"
    }

    fn coupling_row(&self, mesh: &Mesh, node: usize) -> Result<CouplingRow, AssemblyError> {
        let mut row = CouplingRow::default();
        for elem in mesh.nodes[node].elements() {
            let mat = material(mesh, elem)?;
            let radius = mesh.element_centroid(elem).x;
            row.add_triangle(mesh, node, elem, (mat.mu_rel() * radius).inv());

            let sigma = mat.sigma();
            if self.omega > 0.0 && sigma > 0.0 {
                let eddy =
                    self.omega * sigma * self.eddy_scale * mesh.element_area(elem) / (3.0 * radius);
                row.add_diagonal(Complex64::new(0.0, eddy));
            }
        }
        Ok(row)
    }

    fn source_term(&self, mesh: &Mesh, node: usize) -> Result<Complex64, AssemblyError> {
        let mut total = Complex64::from(0.0);
        for elem in mesh.nodes[node].elements() {
            let j = material(mesh, elem)?.current_density();
            total += j * mesh.element_area(elem) / 3.0;
        }
        Ok(total * self.source_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::materials::{Boundary, Region};
    use crate::domain::mesh::tests::pinwheel_mesh;

    fn row_sum(row: &CouplingRow) -> Complex64 {
        row.diagonal + row.off_diagonal.iter().map(|(_, v)| *v).sum::<Complex64>()
    }

    #[test]
    fn center_row_of_pinwheel() {
        let mesh = pinwheel_mesh();
        let kernel = FlatElectrostatic::new(Units::Millimeters);

        assert_eq!(kernel.fixed_value(&mesh, 4).unwrap(), None);
        assert_eq!(
            kernel.fixed_value(&mesh, 0).unwrap(),
            Some(Complex64::from(0.0))
        );

        // right angle at the center; 45 degrees at both outer corners of every triangle
        let row = kernel.coupling_row(&mesh, 4).unwrap();
        assert!((row.diagonal - Complex64::from(4.0)).norm() < 1e-12);
        assert_eq!(row.off_diagonal.len(), 8);
        assert!(row_sum(&row).norm() < 1e-12);
        for corner in 0..4 {
            let coupling: Complex64 = row
                .off_diagonal
                .iter()
                .filter(|(n, _)| *n == corner)
                .map(|(_, v)| *v)
                .sum();
            assert!((coupling + Complex64::from(1.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn rows_are_independent_of_fan_order() {
        let mesh = pinwheel_mesh();
        let flat = FlatElectrostatic::new(Units::Millimeters).coupling_row(&mesh, 4).unwrap();
        let magnetic = FlatMagnetostatic::new(Units::Millimeters, None)
            .coupling_row(&mesh, 4)
            .unwrap();
        assert!((flat.diagonal - magnetic.diagonal).norm() < 1e-12);
    }

    #[test]
    fn fan_closure() {
        let mut mesh = pinwheel_mesh();
        let fan: Vec<(f64, usize)> = {
            let center = mesh.nodes[4].coords;
            let mut fan: Vec<(f64, usize)> = mesh.nodes[4]
                .elements()
                .map(|e| (center.angle_to(&mesh.element_centroid(e)), e))
                .collect();
            fan.sort_by(|a, b| a.0.total_cmp(&b.0));
            fan
        };
        assert!(fan_is_closed(&mesh, 4, &fan));

        // drop one triangle from the fan
        mesh.nodes[4].elements.remove(&2);
        let open: Vec<(f64, usize)> = fan.into_iter().filter(|(_, e)| *e != 2).collect();
        assert!(!fan_is_closed(&mesh, 4, &open));
    }

    #[test]
    fn charge_source_scaling() {
        let mut mesh = pinwheel_mesh();
        mesh.regions[0] = Region::dielectric(1, "charged", Complex64::from(1.0))
            .with_charge_density(EPS_0 * 1.0e6);
        mesh.regions[0].elements = vec![0, 1, 2, 3];

        // each triangle has area 1/4; one third of each goes to the center node
        let b = FlatElectrostatic::new(Units::Millimeters)
            .source_term(&mesh, 4)
            .unwrap();
        assert!((b - Complex64::from(1.0 / 3.0)).norm() < 1e-12);

        let b_inch = FlatElectrostatic::new(Units::Inches)
            .source_term(&mesh, 4)
            .unwrap();
        assert!((b_inch.re / b.re - (25.4_f64).powi(2)).abs() < 1e-6);
    }

    #[test]
    fn axisymmetric_weights() {
        let mesh = pinwheel_mesh();
        let flat = FlatElectrostatic::new(Units::Millimeters).coupling_row(&mesh, 4).unwrap();
        let axi = AxisymmetricElectrostatic::new(Units::Millimeters)
            .coupling_row(&mesh, 4)
            .unwrap();

        // centroid radii are 1/6, 1/2, 5/6, 1/2 around the center
        assert!((axi.diagonal - flat.diagonal * 0.5).norm() < 1e-12);
        assert!(row_sum(&axi).norm() < 1e-12);

        let axi_m = AxisymmetricMagnetostatic::new(Units::Millimeters, None)
            .coupling_row(&mesh, 4)
            .unwrap();
        let expected: f64 = [1.0 / 6.0, 0.5, 5.0 / 6.0, 0.5].iter().map(|r| 1.0 / r).sum();
        assert!((axi_m.diagonal - Complex64::from(expected)).norm() < 1e-9);
    }

    #[test]
    fn eddy_term_is_imaginary() {
        let mut mesh = pinwheel_mesh();
        mesh.regions[0] = Region::steel(1, "core", Complex64::from(1000.0), 2.0e6);
        mesh.regions[0].elements = vec![0, 1, 2, 3];

        let static_row = FlatMagnetostatic::new(Units::Millimeters, None)
            .coupling_row(&mesh, 4)
            .unwrap();
        assert!(static_row.diagonal.im.abs() < 1e-15);

        let kernel = FlatMagnetostatic::new(Units::Millimeters, Some(60.0));
        let row = kernel.coupling_row(&mesh, 4).unwrap();
        let expected = 2.0 * PI * 60.0 * 2.0e6 * MU_0 * 1.0e-6 * (4.0 * 0.25 / 3.0);
        assert!((row.diagonal.im - expected).abs() < 1e-12 * expected.max(1.0));
        assert!((row.diagonal.re - static_row.diagonal.re).abs() < 1e-15);
    }

    #[test]
    fn configuration_errors() {
        let mut mesh = pinwheel_mesh();
        mesh.nodes[1].marker = 3;
        assert!(matches!(
            boundary_value(&mesh, 1),
            Err(AssemblyError::UnknownBoundary { node: 1, marker: 3 })
        ));

        mesh.nodes[1].marker = NEUMANN_MARKER;
        assert_eq!(boundary_value(&mesh, 1).unwrap(), None);

        let mut steel = pinwheel_mesh();
        steel.regions[0] = Region::steel(1, "core", Complex64::from(500.0), 0.0);
        assert!(matches!(
            FlatElectrostatic::new(Units::Millimeters).coupling_row(&steel, 4),
            Err(AssemblyError::MaterialMismatch {
                expected: MaterialKind::Dielectric,
                found: MaterialKind::Steel,
                ..
            })
        ));

        let mut orphan = pinwheel_mesh();
        orphan.elements[2].region = None;
        assert!(matches!(
            AxisymmetricElectrostatic::new(Units::Millimeters).source_term(&orphan, 4),
            Err(AssemblyError::UnresolvedRegion { element: 2 })
        ));
    }

    #[test]
    fn linked_conductors_are_electrodes() {
        let mut mesh = pinwheel_mesh();
        mesh.add_boundary(Boundary::fixed(9, "hv", Complex64::new(100.0, 0.0)))
            .unwrap();
        mesh.regions[0] = Region::conductor(1, "bar", 5.8e7).with_electrode(9);

        let kernel = FlatElectrostatic::new(Units::Millimeters);
        assert_eq!(
            kernel.fixed_value(&mesh, 4).unwrap(),
            Some(Complex64::new(100.0, 0.0))
        );
        // boundary markers take precedence over the conductor
        assert_eq!(
            kernel.fixed_value(&mesh, 0).unwrap(),
            Some(Complex64::from(0.0))
        );
    }
}
