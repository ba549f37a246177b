use crate::core::design::NetworkDesign;
use crate::core::reduction::ReducedProblem;
use crate::core::solver::ConstrainedSolver;
use crate::types::{DegenerateSamples, InversionConfig, Matrix, Vector, NO_DATA};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Leave-one-epoch-out estimate of the constraint parameters
#[derive(Debug, Clone)]
pub struct JackknifeSummary {
    /// Mean of the samples (reported parameter value)
    pub mean: Vector,
    /// Sample standard deviation with one degree of freedom removed (reported uncertainty)
    pub std: Vector,
    /// One row per active epoch column
    pub samples: Matrix,
    /// Number of samples that entered the statistics
    pub used: usize,
}

/// Re-solves a pixel with each active epoch left out in turn
#[derive(Debug, Clone, Copy)]
pub struct JackknifeEstimator {
    solver: ConstrainedSolver,
    policy: DegenerateSamples,
}

impl JackknifeEstimator {
    pub fn new(solver: ConstrainedSolver, policy: DegenerateSamples) -> Self {
        Self { solver, policy }
    }

    pub fn from_config(config: &InversionConfig) -> Self {
        Self::new(ConstrainedSolver::from_config(config), config.degenerate_samples)
    }

    /// Sample matrix: row `r` solves the problem without the interferograms of active column `r`
    pub fn samples(
        &self,
        design: &NetworkDesign,
        problem: &ReducedProblem,
        weights: ArrayView1<f64>,
        obs: ArrayView1<f64>,
    ) -> Matrix {
        let mut samples = Array2::<f64>::from_elem((problem.columns.len(), design.num_params()), NO_DATA);
        for (r, &column) in problem.columns.iter().enumerate() {
            let sub = problem.without_column(design, column);
            let params = self.solver.solve(design, &sub, weights, obs);
            samples.row_mut(r).assign(&params);
        }
        samples
    }

    /// Jackknife mean and standard deviation for one pixel
    pub fn estimate(
        &self,
        design: &NetworkDesign,
        problem: &ReducedProblem,
        weights: ArrayView1<f64>,
        obs: ArrayView1<f64>,
    ) -> JackknifeSummary {
        let samples = self.samples(design, problem, weights, obs);
        let (mean, std, used) = summarize(samples.view(), self.policy);
        if used < samples.nrows() {
            log::trace!(
                "{} of {} jackknife samples were degenerate",
                samples.nrows() - used,
                samples.nrows()
            );
        }
        JackknifeSummary {
            mean,
            std,
            samples,
            used,
        }
    }
}

/// Column-wise mean and ddof=1 standard deviation of the sample rows
///
/// Returns the statistics and the number of rows used. With
/// `DegenerateSamples::Exclude` only rows whose entries are all finite count.
pub fn summarize(samples: ArrayView2<f64>, policy: DegenerateSamples) -> (Vector, Vector, usize) {
    let num_params = samples.ncols();
    let rows: Vec<ArrayView1<f64>> = samples
        .axis_iter(Axis(0))
        .filter(|row| match policy {
            DegenerateSamples::Exclude => row.iter().all(|v| v.is_finite()),
            DegenerateSamples::Propagate => true,
        })
        .collect();
    let n = rows.len();

    if n == 0 {
        return (
            Array1::from_elem(num_params, NO_DATA),
            Array1::from_elem(num_params, NO_DATA),
            0,
        );
    }

    let mut mean = Array1::<f64>::zeros(num_params);
    for row in &rows {
        mean += row;
    }
    mean /= n as f64;

    let std = if n < 2 {
        Array1::from_elem(num_params, NO_DATA)
    } else {
        let mut ss = Array1::<f64>::zeros(num_params);
        for row in &rows {
            let dev = row - &mean;
            ss += &(&dev * &dev);
        }
        ss.mapv(|v| (v / (n - 1) as f64).sqrt())
    };

    (mean, std, n)
}
