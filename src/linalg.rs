/// Use faer's sparse LU decomposition to solve a linear system
pub mod faer_solve;
/// Sparsely Packed Matrix
pub mod sparse_matrix;

use nalgebra::ComplexField;
use rayon::prelude::*;
use sparse_matrix::SparseMatrix;
use std::ops::AddAssign;
use std::sync::mpsc::channel;

/// Square linear system
///
/// Ax = b
#[derive(Clone, Debug)]
pub struct LinearSystem<T> {
    /// A Matrix
    pub a: SparseMatrix<T>,
    /// Right hand side
    pub b: Vec<T>,
}

impl<T> LinearSystem<T>
where
    T: ComplexField + Copy + AddAssign,
{
    pub fn new(dimension: usize) -> Self {
        Self {
            a: SparseMatrix::new(dimension),
            b: vec![T::zero(); dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.a.dimension
    }

    /// Add a fully assembled row to the system
    pub fn insert_row(&mut self, mut row: SystemRow<T>) {
        let r = row.row;
        self.a
            .insert_group(row.entries.drain(0..).map(|(c, v)| ([r, c], v)).collect());
        self.b[r] += row.rhs;
    }
}

/// One row of a [LinearSystem], assembled independently of all the others
#[derive(Clone, Debug)]
pub struct SystemRow<T> {
    pub row: usize,
    /// (column, value) pairs; repeated columns accumulate
    pub entries: Vec<(usize, T)>,
    pub rhs: T,
}

impl<T> ParallelExtend<SystemRow<T>> for LinearSystem<T>
where
    T: ComplexField + Copy + AddAssign + Send,
{
    fn par_extend<I>(&mut self, rows_iter: I)
    where
        I: IntoParallelIterator<Item = SystemRow<T>>,
    {
        let (sender, receiver) = channel();

        rows_iter
            .into_par_iter()
            .for_each_with(sender, |s, row| {
                s.send(row)
                    .expect("Failed to send rows over MSPC channel; cannot construct Matrix!")
            });

        receiver.iter().for_each(|row| self.insert_row(row));
    }
}
