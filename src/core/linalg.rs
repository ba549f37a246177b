//! Bridge between ndarray containers and nalgebra's SVD

use crate::types::{Matrix, NsbasError, NsbasResult, Vector};
use nalgebra::{DMatrix, DVector, SVD};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Iteration cap for the SVD; zero would mean unbounded
const SVD_MAX_ITERATIONS: usize = 1000;

fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

fn to_dvector(v: ArrayView1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

fn from_dmatrix(m: &DMatrix<f64>) -> Matrix {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn from_dvector(v: &DVector<f64>) -> Vector {
    Array1::from_iter(v.iter().copied())
}

fn decompose(a: ArrayView2<f64>) -> Option<SVD<f64, nalgebra::Dyn, nalgebra::Dyn>> {
    if a.is_empty() || a.iter().any(|x| !x.is_finite()) {
        return None;
    }
    SVD::try_new(to_dmatrix(a), true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
}

/// Minimum-norm least-squares solution of `a x = b`
///
/// Singular values below `rcond * sigma_max` are treated as zero. Returns
/// `None` for empty, non-finite or all-zero systems and when the SVD does not
/// converge.
pub fn lstsq_min_norm(a: ArrayView2<f64>, b: ArrayView1<f64>, rcond: f64) -> Option<Vector> {
    if a.nrows() != b.len() || b.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let svd = decompose(a)?;
    let sigma_max = svd.singular_values.max();
    if sigma_max <= 0.0 || !sigma_max.is_finite() {
        return None;
    }

    let x = svd.solve(&to_dvector(b), rcond * sigma_max).ok()?;
    if x.iter().all(|v| v.is_finite()) {
        Some(from_dvector(&x))
    } else {
        None
    }
}

/// Moore-Penrose pseudo-inverse with the same relative cutoff convention
pub fn pseudo_inverse(a: ArrayView2<f64>, rcond: f64) -> NsbasResult<Matrix> {
    let svd = decompose(a).ok_or_else(|| {
        NsbasError::Linalg(format!(
            "SVD of {}x{} matrix failed or input is not finite",
            a.nrows(),
            a.ncols()
        ))
    })?;
    let cutoff = rcond * svd.singular_values.max();
    let pinv = svd
        .pseudo_inverse(cutoff)
        .map_err(|e| NsbasError::Linalg(e.to_string()))?;
    Ok(from_dmatrix(&pinv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_overdetermined_fit() {
        // y = 2 + 3x sampled without noise
        let a = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let b = array![2.0, 5.0, 8.0, 11.0];
        let x = lstsq_min_norm(a.view(), b.view(), 1e-8).unwrap();
        assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x[1], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rank_deficient_gives_minimum_norm() {
        // Two identical columns: minimum-norm solution splits the value evenly
        let a = array![[1.0, 1.0], [2.0, 2.0]];
        let b = array![2.0, 4.0];
        let x = lstsq_min_norm(a.view(), b.view(), 1e-8).unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_degenerate_systems() {
        let zeros = Array2::<f64>::zeros((3, 2));
        let b = array![1.0, 2.0, 3.0];
        assert!(lstsq_min_norm(zeros.view(), b.view(), 1e-8).is_none());

        let empty = Array2::<f64>::zeros((0, 2));
        let b_empty = Array1::<f64>::zeros(0);
        assert!(lstsq_min_norm(empty.view(), b_empty.view(), 1e-8).is_none());

        let a = array![[1.0, f64::NAN]];
        let b = array![1.0];
        assert!(lstsq_min_norm(a.view(), b.view(), 1e-8).is_none());
    }

    #[test]
    fn test_pseudo_inverse_of_incidence() {
        // Chain 0-1-2: pinv(J) * J projects onto the row space
        let j = array![[-1.0, 1.0, 0.0], [0.0, -1.0, 1.0]];
        let pinv = pseudo_inverse(j.view(), 1e-15).unwrap();
        assert_eq!(pinv.dim(), (3, 2));
        let jpj = j.dot(&pinv).dot(&j);
        for (x, y) in jpj.iter().zip(j.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-10);
        }
    }
}
