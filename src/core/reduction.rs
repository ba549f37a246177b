//! Per-pixel reduction of the network matrices
//!
//! Every pixel (and every jackknife sub-problem) works on its own subset of
//! interferograms, which in turn leaves only some epoch columns observed.
//! `ReducedProblem` records that subset once, in terms of indices into the
//! shared `NetworkDesign`, so the design, constraint and weight rows are always
//! selected through the same ordering.

use crate::core::design::NetworkDesign;
use ndarray::ArrayView1;

/// Row of the constraint block: a real epoch or the synthetic reference row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochRow {
    /// Epoch with an estimated unknown, by full epoch index
    Epoch(usize),
    /// The reference epoch, whose unknown is an implicit zero
    Reference,
}

impl EpochRow {
    /// Full epoch index of this row
    pub fn epoch_index(&self, reference: usize) -> usize {
        match *self {
            EpochRow::Epoch(index) => index,
            EpochRow::Reference => reference,
        }
    }
}

/// Order the constraint rows of the active epochs, splicing in the reference row
///
/// `epochs` are full epoch indices in increasing order and never contain the
/// reference. The reference row lands before the first epoch that follows it.
pub fn constraint_rows(epochs: &[usize], reference: usize) -> Vec<EpochRow> {
    let split = epochs
        .iter()
        .position(|&epoch| epoch > reference)
        .unwrap_or(epochs.len());

    let mut rows = Vec::with_capacity(epochs.len() + 1);
    rows.extend(epochs[..split].iter().map(|&e| EpochRow::Epoch(e)));
    rows.push(EpochRow::Reference);
    rows.extend(epochs[split..].iter().map(|&e| EpochRow::Epoch(e)));
    rows
}

/// Indices of usable observations: finite and non-zero
pub fn valid_observations(obs: ArrayView1<f64>) -> Vec<usize> {
    obs.iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite() && **v != 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// Why a pixel was left at the no-data value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer valid interferograms than the configured minimum
    TooFewObservations { valid: usize, required: usize },
    /// Neither epoch next to the reference is observed
    ReferenceDisconnected,
}

/// A network restricted to a subset of interferograms and observed epochs
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedProblem {
    /// Interferogram indices (rows of the network design)
    pub rows: Vec<usize>,
    /// Active reduced design columns, increasing
    pub columns: Vec<usize>,
    /// Constraint rows aligned with `columns`, reference row included
    pub constraint_rows: Vec<EpochRow>,
}

impl ReducedProblem {
    /// Restrict the network to `rows`, keeping the `candidates` columns that are still observed
    pub fn from_rows(design: &NetworkDesign, rows: Vec<usize>, candidates: &[usize]) -> Self {
        let columns: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&c| rows.iter().any(|&r| design.dmat[[r, c]] != 0.0))
            .collect();
        let epochs: Vec<usize> = columns.iter().map(|&c| design.epoch_of_column(c)).collect();
        let constraint_rows = constraint_rows(&epochs, design.reference);

        Self {
            rows,
            columns,
            constraint_rows,
        }
    }

    /// Sub-problem with every interferogram that depends on `column` removed
    pub fn without_column(&self, design: &NetworkDesign, column: usize) -> Self {
        let rows: Vec<usize> = self
            .rows
            .iter()
            .copied()
            .filter(|&r| design.dmat[[r, column]] == 0.0)
            .collect();
        Self::from_rows(design, rows, &self.columns)
    }

    pub fn num_observations(&self) -> usize {
        self.rows.len()
    }

    /// Columns of the system matrix: active epochs followed by constraint parameters
    pub fn num_unknowns(&self, design: &NetworkDesign) -> usize {
        self.columns.len() + design.num_params()
    }

    /// Whether at least one reduced column adjacent to the reference is active
    pub fn reference_connected(&self, design: &NetworkDesign) -> bool {
        let last = design.num_epochs().saturating_sub(2);
        let reference = design.reference;
        let neighbours = [reference.saturating_sub(1).min(last), reference.min(last)];
        neighbours.iter().any(|n| self.columns.contains(n))
    }
}

/// Reduce the network for one pixel's observation vector
pub fn reduce_pixel(
    design: &NetworkDesign,
    obs: ArrayView1<f64>,
    min_valid: usize,
) -> Result<ReducedProblem, SkipReason> {
    let valid = valid_observations(obs);
    if valid.len() < min_valid {
        return Err(SkipReason::TooFewObservations {
            valid: valid.len(),
            required: min_valid,
        });
    }

    let all_columns: Vec<usize> = (0..design.dmat.ncols()).collect();
    let problem = ReducedProblem::from_rows(design, valid, &all_columns);
    if !problem.reference_connected(design) {
        return Err(SkipReason::ReferenceDisconnected);
    }
    Ok(problem)
}
