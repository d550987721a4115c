/// Conversion of outlines and region descriptions into a refined Mesh
pub mod builder;
/// Potential and field evaluation at arbitrary points; contour extraction
pub mod fields;
/// Point location by walking across the triangulation
pub mod locate;
/// Material zones and boundary conditions
pub mod materials;
/// The internal geometric structure of a problem
pub mod mesh;
