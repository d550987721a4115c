/// Structures to describe the geometry, materials, and solution fields of a problem
pub mod domain;

/// Physics kernels, system assembly, and post processing
pub mod fem_problem;

/// Sparse storage and direct solution of linear systems
pub mod linalg;

pub use domain::{
    builder::{BuildOptions, MeshBuilder},
    fields::{contour_levels, contour_lines, sample, ContourLine, FieldSample, FitMethod},
    locate::{Location, Locator},
    materials::{Boundary, Material, Region},
    mesh::{space::Point, Mesh, MeshError, Units},
};
pub use fem_problem::{
    eddy_loss, solve, stored_energy, FemError, Geometry, Physics, SolveSummary,
};
