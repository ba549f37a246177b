use crate::core::design::NetworkDesign;
use crate::core::linalg::lstsq_min_norm;
use crate::core::reduction::{EpochRow, ReducedProblem};
use crate::types::{InversionConfig, Matrix, Vector, NO_DATA};
use ndarray::{s, Array1, Array2, ArrayView1};

/// Weighted, regularised least-squares solver for one reduced problem
///
/// The system stacks the data rows `[D | 0]` on top of the constraint rows
/// `gamma * diag(w) * [LT | Cons]` and is solved for the minimum-norm
/// solution. Only the trailing constraint-parameter block is returned.
#[derive(Debug, Clone, Copy)]
pub struct ConstrainedSolver {
    gamma: f64,
    rcond: f64,
}

impl ConstrainedSolver {
    pub fn new(gamma: f64, rcond: f64) -> Self {
        Self { gamma, rcond }
    }

    pub fn from_config(config: &InversionConfig) -> Self {
        Self::new(config.gamma, config.rcond)
    }

    /// Weight of one constraint row
    ///
    /// The reference row takes the mean weight of the problem's active epochs.
    pub fn row_weight(
        design: &NetworkDesign,
        problem: &ReducedProblem,
        weights: ArrayView1<f64>,
        row: EpochRow,
    ) -> f64 {
        match row {
            EpochRow::Epoch(epoch) => weights[epoch],
            EpochRow::Reference => {
                if problem.columns.is_empty() {
                    weights[design.reference]
                } else {
                    let sum: f64 = problem
                        .columns
                        .iter()
                        .map(|&c| weights[design.epoch_of_column(c)])
                        .sum();
                    sum / problem.columns.len() as f64
                }
            }
        }
    }

    /// Build the augmented system matrix and right-hand side
    pub fn assemble(
        &self,
        design: &NetworkDesign,
        problem: &ReducedProblem,
        weights: ArrayView1<f64>,
        obs: ArrayView1<f64>,
    ) -> (Matrix, Vector) {
        let num_obs = problem.rows.len();
        let num_active = problem.columns.len();
        let num_params = design.num_params();
        let num_rows = num_obs + problem.constraint_rows.len();

        let mut g = Array2::<f64>::zeros((num_rows, num_active + num_params));
        let mut d = Array1::<f64>::zeros(num_rows);

        for (i, &ifg) in problem.rows.iter().enumerate() {
            for (j, &col) in problem.columns.iter().enumerate() {
                g[[i, j]] = design.dmat[[ifg, col]];
            }
            d[i] = obs[ifg];
        }

        for (k, &row) in problem.constraint_rows.iter().enumerate() {
            let epoch = row.epoch_index(design.reference);
            let scale = self.gamma * Self::row_weight(design, problem, weights, row);
            let i = num_obs + k;
            for (j, &col) in problem.columns.iter().enumerate() {
                g[[i, j]] = scale * design.lt[[epoch, col]];
            }
            for p in 0..num_params {
                g[[i, num_active + p]] = scale * design.cons[[epoch, p]];
            }
        }

        (g, d)
    }

    /// Solve a reduced problem and return its constraint parameters
    ///
    /// Problems without observations or with a degenerate system return NaN.
    pub fn solve(
        &self,
        design: &NetworkDesign,
        problem: &ReducedProblem,
        weights: ArrayView1<f64>,
        obs: ArrayView1<f64>,
    ) -> Vector {
        let num_params = design.num_params();
        if problem.rows.is_empty() {
            return Array1::from_elem(num_params, NO_DATA);
        }

        let (g, d) = self.assemble(design, problem, weights, obs);
        match lstsq_min_norm(g.view(), d.view(), self.rcond) {
            Some(x) => x.slice(s![problem.columns.len()..]).to_owned(),
            None => {
                log::trace!(
                    "Degenerate {}x{} system, returning no-data parameters",
                    g.nrows(),
                    g.ncols()
                );
                Array1::from_elem(num_params, NO_DATA)
            }
        }
    }
}
