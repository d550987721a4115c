use std::collections::BTreeMap;
use std::ops::AddAssign;

use nalgebra::ComplexField;

//TODO: switch to something more efficient than a BTreeMap (preallocate with know num zeros)

/// Wrapper around a BTreeMap to store square matrices in a sparse data structure
///
/// Entries inserted at the same coordinates accumulate. Unlike a stiffness matrix from a pure
/// Galerkin formulation, rows carrying Dirichlet conditions make the assembled matrix
/// non-symmetric, so both triangles are stored.
#[derive(Clone, Debug)]
pub struct SparseMatrix<T> {
    /// Size of the square matrix
    pub dimension: usize,
    /// Matrix Entries
    entries: BTreeMap<[u32; 2], T>,
}

impl<T> SparseMatrix<T>
where
    T: ComplexField + Copy + AddAssign,
{
    pub fn new(dimension: usize) -> Self {
        assert!(
            dimension <= (std::u32::MAX as usize),
            "Matrix Dimension cannot exceed the size of a u32!"
        );

        Self {
            dimension,
            entries: BTreeMap::new(),
        }
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    fn coordinates(&self, [row_idx, col_idx]: [usize; 2]) -> [u32; 2] {
        assert!(
            row_idx < self.dimension,
            "row_idx exceeded matrix dimension; cannot insert value!"
        );
        assert!(
            col_idx < self.dimension,
            "col_idx exceeded matrix dimension; cannot insert value!"
        );
        [row_idx as u32, col_idx as u32]
    }

    /// Add a value to the entry at `[row, col]`
    pub fn insert(&mut self, rc: [usize; 2], value: T) {
        let coordinates = self.coordinates(rc);
        self.entries
            .entry(coordinates)
            .and_modify(|curr_val| *curr_val += value)
            .or_insert(value);
    }

    /// Insert a group of entries
    pub fn insert_group(&mut self, mut entry_group: Vec<([usize; 2], T)>) {
        for (rc, value) in entry_group.drain(0..) {
            self.insert(rc, value);
        }
    }

    pub fn get(&self, rc: [usize; 2]) -> Option<T> {
        self.entries.get(&self.coordinates(rc)).copied()
    }

    /// Iterate over the stored entries, sorted by row then column
    pub fn iter(&self) -> impl Iterator<Item = ([usize; 2], T)> + '_ {
        self.entries
            .iter()
            .map(|(coords, value)| ([coords[0] as usize, coords[1] as usize], *value))
    }

    /// Entries of one row
    pub fn row(&self, row_idx: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let r = row_idx as u32;
        self.entries
            .range([r, 0]..=[r, u32::MAX])
            .map(|(coords, value)| (coords[1] as usize, *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn value_insertion() {
        let mut sm = SparseMatrix::new(10);

        sm.insert([0, 0], 1.0);
        sm.insert([0, 0], 1.0);
        sm.insert([9, 9], 10.0);
        sm.insert([4, 3], 0.25);
        sm.insert([0, 8], 0.125);
        sm.insert([8, 0], 0.125);

        assert_eq!(sm.num_entries(), 5);
        assert!((sm.get([0, 0]).unwrap() - 2.0).abs() < 1e-15);
        assert!((sm.get([9, 9]).unwrap() - 10.0).abs() < 1e-15);
        assert!((sm.get([4, 3]).unwrap() - 0.25).abs() < 1e-15);
        assert!((sm.get([0, 8]).unwrap() - 0.125).abs() < 1e-15);
        assert!((sm.get([8, 0]).unwrap() - 0.125).abs() < 1e-15);

        assert!(sm.get([3, 4]).is_none());
    }

    #[test]
    fn complex_rows() {
        let mut sm = SparseMatrix::new(4);
        sm.insert_group(vec![
            ([1, 0], Complex64::new(-1.0, 0.0)),
            ([1, 1], Complex64::new(2.0, 0.5)),
            ([1, 2], Complex64::new(-1.0, 0.0)),
            ([2, 2], Complex64::new(1.0, 0.0)),
            ([1, 1], Complex64::new(0.0, 0.5)),
        ]);

        let row: Vec<(usize, Complex64)> = sm.row(1).collect();
        assert_eq!(row.len(), 3);
        assert_eq!(row[1], (1, Complex64::new(2.0, 1.0)));
        assert_eq!(sm.row(3).count(), 0);
        assert_eq!(sm.get([2, 1]), None);

        let entries: Vec<([usize; 2], Complex64)> = sm.iter().collect();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0], ([1, 0], Complex64::new(-1.0, 0.0)));
        assert_eq!(entries[3], ([2, 2], Complex64::new(1.0, 0.0)));
    }

    #[test]
    #[should_panic]
    fn oversize_matrix_construction() {
        let _ = SparseMatrix::<f64>::new((std::u32::MAX as usize) + 1);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_insertion() {
        let mut sm = SparseMatrix::new(10);
        sm.insert([10, 2], 1.0);
    }
}
