//! Sparse linear solve behind a trait seam, so the LU backend can be swapped
//! without touching the Newton iteration.

use nalgebra_sparse::CscMatrix;
use rsparse::{
    data::{self, Symb},
    lsolve, lu, sqr, usolve,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sparse linear solve failed: {0}")]
pub struct LinearSolveError(pub &'static str);

/// Solves `A x = b` for sparse square `A`, writing the solution over `b`.
pub trait LinearSolver {
    fn solve(&mut self, a: &CscMatrix<f64>, b: &mut [f64]) -> Result<(), LinearSolveError>;
}

/// LU factorization via `rsparse`. The symbolic analysis is cached on first
/// use; callers must keep one instance per sparsity pattern.
#[derive(Default)]
pub struct SparseLu {
    symbolic: Option<Symb>,
    work: Vec<f64>,
}

impl LinearSolver for SparseLu {
    fn solve(&mut self, a: &CscMatrix<f64>, b: &mut [f64]) -> Result<(), LinearSolveError> {
        let n = a.nrows();
        if a.ncols() != n || b.len() != n {
            return Err(LinearSolveError("dimension mismatch"));
        }
        let sprs = data::Sprs {
            m: n,
            n,
            i: a.row_indices().to_vec(),
            p: a.col_offsets().iter().map(|&c| c as isize).collect(),
            x: a.values().to_vec(),
            nzmax: a.nnz(),
        };
        let symbolic = self
            .symbolic
            .get_or_insert_with(|| sqr(&sprs, 1, false));
        let numeric =
            lu(&sprs, symbolic, 1e-6).map_err(|_| LinearSolveError("LU factorization failed"))?;

        self.work.resize(n, 0.0);
        ipvec(&numeric.pinv, b, &mut self.work);
        lsolve(&numeric.l, &mut self.work);
        usolve(&numeric.u, &mut self.work);
        ipvec(&symbolic.q, &self.work, b);
        Ok(())
    }
}

/// Applies the inverse of the permutation `p` to `b`, writing into `x`.
fn ipvec(p: &Option<Vec<isize>>, b: &[f64], x: &mut [f64]) {
    match p {
        Some(p) => {
            for k in 0..b.len() {
                x[p[k] as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn csc_from_dense(entries: &[(usize, usize, f64)], n: usize) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for &(i, j, v) in entries {
            coo.push(i, j, v);
        }
        CscMatrix::from(&coo)
    }

    #[test]
    fn solves_a_small_spd_system() {
        // A = [[4, 1], [1, 3]], b = [1, 2] => x = [1/11, 7/11].
        let a = csc_from_dense(&[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)], 2);
        let mut b = vec![1.0, 2.0];
        let mut solver = SparseLu::default();
        solver.solve(&a, &mut b).unwrap();
        assert!((b[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((b[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn cached_symbolic_survives_value_changes() {
        let mut solver = SparseLu::default();
        let a = csc_from_dense(&[(0, 0, 2.0), (1, 1, 2.0)], 2);
        let mut b = vec![2.0, 4.0];
        solver.solve(&a, &mut b).unwrap();
        assert_eq!(b, vec![1.0, 2.0]);

        // Same pattern, different values.
        let a2 = csc_from_dense(&[(0, 0, 4.0), (1, 1, 0.5)], 2);
        let mut b2 = vec![2.0, 4.0];
        solver.solve(&a2, &mut b2).unwrap();
        assert!((b2[0] - 0.5).abs() < 1e-12);
        assert!((b2[1] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let a = csc_from_dense(&[(0, 0, 1.0), (1, 1, 1.0)], 2);
        let mut b = vec![1.0];
        assert!(SparseLu::default().solve(&a, &mut b).is_err());
    }
}
