//! Line-oriented access to the interferogram stack and to the inversion products

use crate::core::dispatch::LineBuffers;
use crate::types::{IgramStack, Matrix, NsbasError, NsbasResult, Vector, NO_DATA};
use ndarray::{s, Array2, Array3, Axis};

/// Source of interferometric phase, one scan line at a time
pub trait LineSource {
    /// (interferograms, lines, columns)
    fn dims(&self) -> (usize, usize, usize);

    /// Phase of every interferogram along one line (interferograms x columns)
    fn read_line(&mut self, line: usize) -> NsbasResult<Matrix>;
}

/// Consumer of inverted lines, written in scan order
pub trait LineSink {
    fn write_line(&mut self, line: usize, buffers: &LineBuffers) -> NsbasResult<()>;
}

/// Interferogram stack held in memory (interferogram x line x column)
#[derive(Debug, Clone)]
pub struct InMemoryStack {
    igram: IgramStack,
}

impl InMemoryStack {
    pub fn new(igram: IgramStack) -> Self {
        Self { igram }
    }
}

impl LineSource for InMemoryStack {
    fn dims(&self) -> (usize, usize, usize) {
        self.igram.dim()
    }

    fn read_line(&mut self, line: usize) -> NsbasResult<Matrix> {
        let (_, lines, _) = self.igram.dim();
        if line >= lines {
            return Err(NsbasError::InvalidFormat(format!(
                "Line {} outside stack of {} lines",
                line, lines
            )));
        }
        Ok(self
            .igram
            .index_axis(Axis(1), line)
            .mapv(|v| v as f64))
    }
}

/// Auxiliary information stored next to the products
#[derive(Debug, Clone)]
pub struct ProductMetadata {
    /// Reference (master) scene index
    pub master_index: usize,
    /// Unique name of every model parameter
    pub param_names: Vec<String>,
    /// Regularisation flag of every model parameter
    pub reg_flags: Vec<bool>,
    /// Perpendicular baseline of every input interferogram
    pub bperp: Vector,
    /// Per-epoch baselines re-estimated from the network, when the range-error term is estimated
    pub epoch_bperp: Option<Vector>,
    /// Acquisition times in years
    pub tims: Vector,
    /// Ordinal values of the acquisition dates
    pub dates: Vec<i32>,
    /// Weight of the constraint rows
    pub gamma: f64,
}

/// Per-pixel parameters, uncertainties and interferogram counts of a run
#[derive(Debug, Clone)]
pub struct InversionProducts {
    /// Lines x columns x parameters
    pub parms: Array3<f64>,
    /// Jackknife standard deviation of every parameter
    pub error: Array3<f64>,
    /// Number of interferograms used for every pixel
    pub ifgcnt: Array2<u32>,
    /// Run metadata, attached once the run completes
    pub metadata: Option<ProductMetadata>,
    lines_written: usize,
}

impl InversionProducts {
    /// Products initialised to no-data
    pub fn new(lines: usize, columns: usize, num_params: usize) -> Self {
        Self {
            parms: Array3::from_elem((lines, columns, num_params), NO_DATA),
            error: Array3::from_elem((lines, columns, num_params), NO_DATA),
            ifgcnt: Array2::zeros((lines, columns)),
            metadata: None,
            lines_written: 0,
        }
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }
}

impl LineSink for InversionProducts {
    fn write_line(&mut self, line: usize, buffers: &LineBuffers) -> NsbasResult<()> {
        let (lines, columns, num_params) = self.parms.dim();
        if line >= lines || buffers.width() != columns || buffers.num_params() != num_params {
            return Err(NsbasError::Processing(format!(
                "Line {} with {} columns and {} parameters does not fit products of shape {:?}",
                line,
                buffers.width(),
                buffers.num_params(),
                self.parms.dim()
            )));
        }

        self.parms.slice_mut(s![line, .., ..]).assign(&buffers.params);
        self.error.slice_mut(s![line, .., ..]).assign(&buffers.errors);
        self.ifgcnt
            .row_mut(line)
            .assign(&buffers.counts.mapv(|c| c as u32));
        self.lines_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_line_layout() {
        let igram = Array3::from_shape_fn((3, 2, 4), |(k, i, j)| (100 * k + 10 * i + j) as f32);
        let mut stack = InMemoryStack::new(igram);
        assert_eq!(stack.dims(), (3, 2, 4));

        let line = stack.read_line(1).unwrap();
        assert_eq!(line.dim(), (3, 4));
        assert_eq!(line[[2, 3]], 213.0);
        assert!(stack.read_line(2).is_err());
    }

    #[test]
    fn test_products_start_as_no_data() {
        let products = InversionProducts::new(2, 3, 4);
        assert!(products.parms.iter().all(|v| v.is_nan()));
        assert!(products.error.iter().all(|v| v.is_nan()));
        assert!(products.ifgcnt.iter().all(|c| *c == 0));
        assert_eq!(products.lines_written(), 0);
    }

    #[test]
    fn test_write_line() {
        let mut products = InversionProducts::new(2, 3, 2);
        let mut buffers = LineBuffers::new(3, 2);
        buffers.params.fill(1.5);
        buffers.errors.fill(0.1);
        buffers.counts.fill(7);

        products.write_line(1, &buffers).unwrap();
        assert_eq!(products.parms[[1, 2, 1]], 1.5);
        assert_eq!(products.error[[1, 0, 0]], 0.1);
        assert_eq!(products.ifgcnt[[1, 1]], 7);
        assert!(products.parms[[0, 0, 0]].is_nan());
        assert_eq!(products.lines_written(), 1);

        let wrong = LineBuffers::new(4, 2);
        assert!(products.write_line(0, &wrong).is_err());
    }
}
