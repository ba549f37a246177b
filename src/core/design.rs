use crate::core::linalg::pseudo_inverse;
use crate::core::timefn::{time_basis, TimeFunction};
use crate::types::{Matrix, NsbasError, NsbasResult, Vector};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};

/// Cutoff used for the network pseudo-inverse of the incidence matrix
const PINV_RCOND: f64 = 1.0e-15;

/// Perpendicular baselines are given in meters, the range-error term in kilometers
const BPERP_SCALE: f64 = 1000.0;

/// Network-wide matrices shared read-only by every pixel inversion
#[derive(Debug, Clone)]
pub struct NetworkDesign {
    /// Interferograms x (epochs - 1): maps epoch unknowns to interferometric phase
    pub dmat: Matrix,
    /// Epochs x (epochs - 1): maps epoch unknowns to the deformation of each epoch
    pub lt: Matrix,
    /// Epochs x parameters: negated constraint basis; the reference epoch row is the synthetic reference row
    pub cons: Matrix,
    /// Reference epoch index
    pub reference: usize,
    /// Name of every constraint parameter
    pub param_names: Vec<String>,
    /// Regularisation flag of every constraint parameter
    pub reg_flags: Vec<bool>,
    /// Per-epoch baselines re-estimated from the network (only with the range-error term)
    pub epoch_bperp: Option<Vector>,
}

/// Inputs of the design builder
#[derive(Debug, Clone)]
pub struct DesignParams<'a> {
    /// Incidence matrix (interferograms x epochs)
    pub jmat: ArrayView2<'a, f64>,
    /// Acquisition times in years
    pub tims: ArrayView1<'a, f64>,
    /// Reference epoch index
    pub reference: usize,
    /// Terms of the constraint function
    pub constraint: &'a [TimeFunction],
    /// Perpendicular baseline of each interferogram; enables the range-error term
    pub bperp: Option<ArrayView1<'a, f64>>,
}

impl NetworkDesign {
    /// Build the reference-adjusted design and constraint matrices
    pub fn build(params: &DesignParams<'_>) -> NsbasResult<Self> {
        let (num_ifg, num_epochs) = params.jmat.dim();
        validate_inputs(params, num_ifg, num_epochs)?;
        let reference = params.reference;

        log::info!(
            "Building NSBAS design: {} interferograms, {} epochs, reference epoch {}",
            num_ifg,
            num_epochs,
            reference
        );

        let sbas = time_basis(&[TimeFunction::Sbas { reference }], params.tims)?;
        let dmat = drop_column(&params.jmat.dot(&sbas.matrix), reference);
        let lt = drop_column(&sbas.matrix, reference);

        let constraint = time_basis(params.constraint, params.tims)?;
        let mut cons = constraint.matrix.mapv(|v| -v);
        let mut param_names = constraint.names;
        let mut reg_flags = constraint.reg_flags;

        let epoch_bperp = match params.bperp {
            Some(bperp) => {
                let mperp = network_baselines(params.jmat, bperp)?;
                let npc = cons.ncols();
                let mut augmented = Array2::<f64>::zeros((num_epochs, npc + 1));
                augmented.slice_mut(s![.., ..npc]).assign(&cons);
                augmented
                    .column_mut(npc)
                    .assign(&mperp.mapv(|b| -b / BPERP_SCALE));
                cons = augmented;
                param_names.push("demerr".to_string());
                reg_flags.push(false);
                Some(mperp)
            }
            None => None,
        };

        log::debug!("Constraint parameters: {:?}", param_names);

        Ok(Self {
            dmat,
            lt,
            cons,
            reference,
            param_names,
            reg_flags,
            epoch_bperp,
        })
    }

    pub fn num_interferograms(&self) -> usize {
        self.dmat.nrows()
    }

    pub fn num_epochs(&self) -> usize {
        self.lt.nrows()
    }

    /// Number of constraint parameters reported per pixel
    pub fn num_params(&self) -> usize {
        self.cons.ncols()
    }

    /// Full epoch index of a reduced (reference-dropped) column
    pub fn epoch_of_column(&self, column: usize) -> usize {
        if column < self.reference {
            column
        } else {
            column + 1
        }
    }
}

fn validate_inputs(params: &DesignParams<'_>, num_ifg: usize, num_epochs: usize) -> NsbasResult<()> {
    if num_ifg == 0 {
        return Err(NsbasError::Config("Incidence matrix has no interferograms".to_string()));
    }
    if num_epochs < 2 {
        return Err(NsbasError::Config(format!(
            "At least two epochs are required, got {}",
            num_epochs
        )));
    }
    if params.tims.len() != num_epochs {
        return Err(NsbasError::Config(format!(
            "Incidence matrix has {} epochs but {} acquisition times were given",
            num_epochs,
            params.tims.len()
        )));
    }
    if params.reference >= num_epochs {
        return Err(NsbasError::Config(format!(
            "Reference epoch {} outside {} epochs",
            params.reference, num_epochs
        )));
    }
    if params.jmat.iter().chain(params.tims.iter()).any(|v| !v.is_finite()) {
        return Err(NsbasError::Config(
            "Incidence matrix and acquisition times must be finite".to_string(),
        ));
    }
    if let Some(bperp) = params.bperp {
        if bperp.len() != num_ifg {
            return Err(NsbasError::Config(format!(
                "Expected {} perpendicular baselines, got {}",
                num_ifg,
                bperp.len()
            )));
        }
    }
    Ok(())
}

fn drop_column(matrix: &Matrix, column: usize) -> Matrix {
    let keep: Vec<usize> = (0..matrix.ncols()).filter(|&c| c != column).collect();
    matrix.select(Axis(1), &keep)
}

/// Per-epoch baselines from a network pseudo-inverse, relative to the first epoch
fn network_baselines(jmat: ArrayView2<f64>, bperp: ArrayView1<f64>) -> NsbasResult<Vector> {
    let jinv = pseudo_inverse(jmat, PINV_RCOND)?;
    let mut mperp = jinv.dot(&bperp);
    let first = mperp[0];
    mperp.mapv_inplace(|b| b - first);
    if mperp.iter().any(|b| !b.is_finite()) {
        return Err(NsbasError::Linalg(
            "Network baseline estimation produced non-finite values".to_string(),
        ));
    }
    Ok(mperp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timefn::default_constraint;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn chain_network() -> (Matrix, Vector) {
        let jmat = array![
            [-1.0, 1.0, 0.0, 0.0],
            [0.0, -1.0, 1.0, 0.0],
            [0.0, 0.0, -1.0, 1.0],
            [-1.0, 0.0, 1.0, 0.0],
        ];
        let tims = array![0.0, 0.5, 1.0, 1.5];
        (jmat, tims)
    }

    #[test]
    fn test_reference_column_removed() {
        let (jmat, tims) = chain_network();
        let constraint = default_constraint(tims[1]);
        let design = NetworkDesign::build(&DesignParams {
            jmat: jmat.view(),
            tims: tims.view(),
            reference: 1,
            constraint: &constraint,
            bperp: None,
        })
        .unwrap();

        assert_eq!(design.dmat.dim(), (4, 3));
        assert_eq!(design.lt.dim(), (4, 3));
        assert_eq!(design.cons.dim(), (4, 3));
        // Column 1 of the reduced design is epoch 2
        assert_eq!(design.dmat.column(1).to_vec(), vec![0.0, 1.0, -1.0, 1.0]);
        assert_eq!(design.epoch_of_column(0), 0);
        assert_eq!(design.epoch_of_column(1), 2);
        // The reference epoch has no unknown
        assert!(design.lt.row(1).iter().all(|v| *v == 0.0));
        // Constraint rows are the negated polynomial
        assert_abs_diff_eq!(design.cons[[1, 0]], -1.0);
        assert_abs_diff_eq!(design.cons[[3, 1]], -1.0);
        assert_abs_diff_eq!(design.cons[[0, 2]], -0.25);
    }

    #[test]
    fn test_range_error_column() {
        let (jmat, tims) = chain_network();
        let epoch_bperp = array![0.0, 100.0, -50.0, 20.0];
        let bperp = jmat.dot(&epoch_bperp);
        let constraint = default_constraint(tims[0]);
        let design = NetworkDesign::build(&DesignParams {
            jmat: jmat.view(),
            tims: tims.view(),
            reference: 0,
            constraint: &constraint,
            bperp: Some(bperp.view()),
        })
        .unwrap();

        assert_eq!(design.num_params(), 4);
        assert_eq!(design.param_names.last().map(String::as_str), Some("demerr"));
        let mperp = design.epoch_bperp.as_ref().unwrap();
        for (est, truth) in mperp.iter().zip(epoch_bperp.iter()) {
            assert_abs_diff_eq!(*est, *truth, epsilon = 1e-8);
        }
        assert_abs_diff_eq!(design.cons[[1, 3]], -0.1, epsilon = 1e-10);
    }

    #[test]
    fn test_invalid_inputs_are_config_errors() {
        let (jmat, tims) = chain_network();
        let constraint = default_constraint(0.0);

        let bad_reference = DesignParams {
            jmat: jmat.view(),
            tims: tims.view(),
            reference: 7,
            constraint: &constraint,
            bperp: None,
        };
        assert!(matches!(NetworkDesign::build(&bad_reference), Err(NsbasError::Config(_))));

        let short_tims = array![0.0, 1.0];
        let bad_times = DesignParams {
            tims: short_tims.view(),
            reference: 0,
            ..bad_reference.clone()
        };
        assert!(matches!(NetworkDesign::build(&bad_times), Err(NsbasError::Config(_))));

        let bperp = array![1.0, 2.0];
        let bad_bperp = DesignParams {
            reference: 0,
            bperp: Some(bperp.view()),
            ..bad_reference
        };
        assert!(matches!(NetworkDesign::build(&bad_bperp), Err(NsbasError::Config(_))));
    }
}
