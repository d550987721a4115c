use super::LinearSystem;
use faer::{complex_native::c64, prelude::*, sparse::SparseColMat, Mat};
use num_complex::Complex64;
use thiserror::Error;

/// Solve `Ax = b` with faer's sparse LU factorization
///
/// The dimensions of both the matrix and the right hand side must equal `expected_dim` (the
/// number of mesh nodes), which is checked before anything is allocated.
///
/// The compressed matrix and its factorization are owned by this function and dropped on every
/// exit path.
pub fn faer_solve_lu(
    system: LinearSystem<Complex64>,
    expected_dim: usize,
) -> Result<Vec<Complex64>, SolveError> {
    if system.a.dimension != expected_dim || system.b.len() != expected_dim {
        return Err(SolveError::DimensionMismatch {
            matrix: system.a.dimension,
            rhs: system.b.len(),
            expected: expected_dim,
        });
    }
    if expected_dim == 0 {
        return Ok(Vec::new());
    }

    let triplets: Vec<(usize, usize, c64)> = system
        .a
        .iter()
        .map(|([r, c], v)| (r, c, c64::new(v.re, v.im)))
        .collect();
    let a_mat = SparseColMat::<usize, c64>::try_new_from_triplets(
        expected_dim,
        expected_dim,
        &triplets,
    )
    .map_err(|err| SolveError::Factorization(format!("{:?}", err)))?;
    let b_vec = Mat::<c64>::from_fn(expected_dim, 1, |i, _| {
        c64::new(system.b[i].re, system.b[i].im)
    });

    let lu = a_mat
        .sp_lu()
        .map_err(|err| SolveError::Factorization(format!("{:?}", err)))?;
    let solution = lu.solve(b_vec.as_ref());

    let values: Vec<Complex64> = (0..expected_dim)
        .map(|i| {
            let x = solution.read(i, 0);
            Complex64::new(x.re, x.im)
        })
        .collect();

    if values.iter().all(|v| v.re.is_finite() && v.im.is_finite()) {
        Ok(values)
    } else {
        Err(SolveError::Singular)
    }
}

/// Error type for the sparse direct solver
#[derive(Debug, Clone, Error)]
pub enum SolveError {
    #[error("matrix is {matrix}x{matrix} and the right hand side has {rhs} rows, but the mesh has {expected} nodes")]
    DimensionMismatch {
        matrix: usize,
        rhs: usize,
        expected: usize,
    },
    #[error("sparse LU factorization failed: {0}")]
    Factorization(String),
    #[error("failed to solve the system (via LU); the matrix is singular")]
    Singular,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse_matrix::SparseMatrix;

    /// 1D Laplacian with fixed ends; the exact solution is `1 + i` plus a unit ramp
    fn ramp_system(n: usize) -> LinearSystem<Complex64> {
        let mut system = LinearSystem::new(n);
        system.a.insert([0, 0], Complex64::from(1.0));
        system.b[0] = Complex64::new(1.0, 1.0);
        for i in 1..n - 1 {
            system.a.insert([i, i - 1], Complex64::from(-1.0));
            system.a.insert([i, i], Complex64::from(2.0));
            system.a.insert([i, i + 1], Complex64::from(-1.0));
        }
        system.a.insert([n - 1, n - 1], Complex64::from(1.0));
        system.b[n - 1] = Complex64::new(n as f64, 1.0);
        system
    }

    #[test]
    fn tridiagonal_complex() {
        let x = faer_solve_lu(ramp_system(6), 6).unwrap();
        for (i, xi) in x.iter().enumerate() {
            assert!((xi - Complex64::new(1.0 + i as f64, 1.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn large_systems() {
        let n = 20_000;
        let x = faer_solve_lu(ramp_system(n), n).unwrap();
        assert_eq!(x.len(), n);
        assert!((x[n / 2] - Complex64::new(1.0 + (n / 2) as f64, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn non_symmetric_complex() {
        let mut system = LinearSystem::new(2);
        system.a.insert_group(vec![
            ([0, 0], Complex64::new(2.0, 1.0)),
            ([0, 1], Complex64::from(1.0)),
            ([1, 1], Complex64::new(0.0, 3.0)),
        ]);
        system.b = vec![Complex64::new(3.0, 1.0), Complex64::new(0.0, 3.0)];

        let x = faer_solve_lu(system, 2).unwrap();
        assert!((x[0] - Complex64::from(1.0)).norm() < 1e-12);
        assert!((x[1] - Complex64::from(1.0)).norm() < 1e-12);
    }

    #[test]
    fn preconditions() {
        let system = LinearSystem::new(3);
        assert!(matches!(
            faer_solve_lu(system, 4),
            Err(SolveError::DimensionMismatch { expected: 4, .. })
        ));

        let system = LinearSystem {
            a: SparseMatrix::<Complex64>::new(3),
            b: vec![Complex64::from(0.0); 2],
        };
        assert!(matches!(
            faer_solve_lu(system, 3),
            Err(SolveError::DimensionMismatch { rhs: 2, .. })
        ));

        let mut system = LinearSystem::new(2);
        system.a.insert([0, 0], Complex64::from(1.0));
        system.b[1] = Complex64::from(1.0);
        assert!(matches!(
            faer_solve_lu(system, 2),
            Err(SolveError::Singular) | Err(SolveError::Factorization(_))
        ));
    }
}
