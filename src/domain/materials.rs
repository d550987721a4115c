use super::mesh::space::Point;
#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use num_complex::Complex64;
use std::fmt;

/// Marker of interior nodes and edges
pub const INTERIOR_MARKER: u32 = 0;

/// Reserved marker for natural (Neumann) boundaries which need no [Boundary] definition
pub const NEUMANN_MARKER: u32 = u32::MAX;

/// Physical description of a [Region]
///
/// Each kind only carries the parameters that are meaningful for it.
#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    /// Insulating material for electrostatic problems
    Dielectric {
        /// Relative Permittivity (ε_r)
        eps_rel: Complex64,
        /// Volumetric charge density (C/m³)
        charge_density: f64,
    },
    /// Current carrying material
    Conductor {
        /// Relative permeability (μ_r)
        mu_rel: Complex64,
        /// Conductivity (S/m)
        sigma: f64,
        /// Impressed current density (A/m²)
        current_density: Complex64,
        /// Tag of the electrode this conductor is held at (electrostatics)
        electrode: Option<u32>,
    },
    /// Magnetic core material
    Steel {
        /// Relative permeability (μ_r)
        mu_rel: Complex64,
        /// Conductivity (S/m)
        sigma: f64,
    },
}

impl Material {
    pub fn kind(&self) -> MaterialKind {
        match self {
            Self::Dielectric { .. } => MaterialKind::Dielectric,
            Self::Conductor { .. } => MaterialKind::Conductor,
            Self::Steel { .. } => MaterialKind::Steel,
        }
    }

    /// Relative permeability seen by magnetostatic problems (dielectrics are non-magnetic)
    pub fn mu_rel(&self) -> Complex64 {
        match self {
            Self::Dielectric { .. } => Complex64::from(1.0),
            Self::Conductor { mu_rel, .. } | Self::Steel { mu_rel, .. } => *mu_rel,
        }
    }

    /// Conductivity (S/m); zero for dielectrics
    pub fn sigma(&self) -> f64 {
        match self {
            Self::Dielectric { .. } => 0.0,
            Self::Conductor { sigma, .. } | Self::Steel { sigma, .. } => *sigma,
        }
    }

    /// Impressed current density (A/m²); zero unless this is a conductor
    pub fn current_density(&self) -> Complex64 {
        match self {
            Self::Conductor {
                current_density, ..
            } => *current_density,
            _ => Complex64::from(0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialKind {
    Dielectric,
    Conductor,
    Steel,
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Dielectric => write!(f, "dielectric"),
            Self::Conductor => write!(f, "conductor"),
            Self::Steel => write!(f, "steel"),
        }
    }
}

/// A material zone of the Mesh
///
/// The reference `points` seed the triangulator: every triangle reachable from one of them
/// without crossing an outline becomes part of this Region.
#[derive(Clone, Debug)]
pub struct Region {
    /// Tag (>= 1)
    pub tag: u32,
    pub description: String,
    pub points: Vec<Point>,
    pub material: Material,
    /// Cavity which is meshed but excluded from energy and loss totals
    pub virtual_hole: bool,
    pub(crate) elements: Vec<usize>,
}

impl Region {
    pub fn new(tag: u32, description: impl Into<String>, material: Material) -> Self {
        Self {
            tag,
            description: description.into(),
            points: Vec::new(),
            material,
            virtual_hole: false,
            elements: Vec::new(),
        }
    }

    pub fn dielectric(tag: u32, description: impl Into<String>, eps_rel: Complex64) -> Self {
        Self::new(
            tag,
            description,
            Material::Dielectric {
                eps_rel,
                charge_density: 0.0,
            },
        )
    }

    pub fn conductor(tag: u32, description: impl Into<String>, sigma: f64) -> Self {
        Self::new(
            tag,
            description,
            Material::Conductor {
                mu_rel: Complex64::from(1.0),
                sigma,
                current_density: Complex64::from(0.0),
                electrode: None,
            },
        )
    }

    pub fn steel(tag: u32, description: impl Into<String>, mu_rel: Complex64, sigma: f64) -> Self {
        Self::new(tag, description, Material::Steel { mu_rel, sigma })
    }

    /// Add a reference point which lies strictly inside the Region
    pub fn with_point(mut self, point: Point) -> Self {
        self.points.push(point);
        self
    }

    pub fn with_charge_density(mut self, rho: f64) -> Self {
        if let Material::Dielectric { charge_density, .. } = &mut self.material {
            *charge_density = rho;
        }
        self
    }

    pub fn with_current_density(mut self, j: Complex64) -> Self {
        if let Material::Conductor {
            current_density, ..
        } = &mut self.material
        {
            *current_density = j;
        }
        self
    }

    pub fn with_electrode(mut self, tag: u32) -> Self {
        if let Material::Conductor { electrode, .. } = &mut self.material {
            *electrode = Some(tag);
        }
        self
    }

    pub fn as_virtual_hole(mut self) -> Self {
        self.virtual_hole = true;
        self
    }

    /// IDs of the Elements in this Region (populated when the Mesh is built)
    pub fn elements(&self) -> &[usize] {
        &self.elements
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Produce a Json Object that describes this Region
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "tag": self.tag,
            "description": self.description.clone(),
            "kind": self.material.kind().to_string(),
            "virtual_hole": self.virtual_hole,
            "num_elements": self.elements.len(),
        }
    }
}

/// A constraint applied to the nodes along a tagged outline
///
/// Either a fixed (Dirichlet) value, which is a voltage for electrostatic problems or a
/// magnetic potential for magnetostatic ones, or a natural (Neumann) boundary.
#[derive(Clone, Debug)]
pub struct Boundary {
    pub tag: u32,
    pub description: String,
    pub value: Complex64,
    pub neumann: bool,
    pub(crate) edges: Vec<usize>,
}

impl Boundary {
    /// Fixed potential boundary (an electrode)
    pub fn fixed(tag: u32, description: impl Into<String>, value: Complex64) -> Self {
        Self {
            tag,
            description: description.into(),
            value,
            neumann: false,
            edges: Vec::new(),
        }
    }

    /// Natural boundary
    pub fn neumann(tag: u32, description: impl Into<String>) -> Self {
        Self {
            tag,
            description: description.into(),
            value: Complex64::from(0.0),
            neumann: true,
            edges: Vec::new(),
        }
    }

    /// IDs of the mesh Edges lying on this Boundary (populated when the Mesh is built)
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    /// Dirichlet value of this Boundary, if it has one
    pub fn dirichlet_value(&self) -> Option<Complex64> {
        if self.neumann {
            None
        } else {
            Some(self.value)
        }
    }
}

/// Priority used when a node sits on several outlines: fixed potentials beat natural
/// boundaries, which beat the interior.
pub(crate) fn marker_priority(marker: u32, neumann: bool) -> u8 {
    match (marker, neumann) {
        (INTERIOR_MARKER, _) => 0,
        (NEUMANN_MARKER, _) | (_, true) => 1,
        _ => 2,
    }
}
