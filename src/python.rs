//! Python bindings

use crate::core::pipeline::{NetworkInputs, WeightSource, XvalPipeline};
use crate::io::params::ProcessingParams;
use crate::io::stack::InMemoryStack;
use crate::types::{DegenerateSamples, NsbasError};
use numpy::{IntoPyArray, PyArray2, PyArray3, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::prelude::*;
use std::path::PathBuf;

fn to_py_err(err: NsbasError) -> PyErr {
    match err {
        NsbasError::Config(_) | NsbasError::InvalidFormat(_) | NsbasError::XmlParsing(_) => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", err))
        }
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", err)),
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(invert_stack, m)?)?;
    m.add_function(wrap_pyfunction!(read_processing_params, m)?)?;
    Ok(())
}

/// Run the jackknife inversion on an (interferogram, line, column) stack
///
/// Returns `(parms, error, ifgcnt, param_names)`.
#[pyfunction]
#[pyo3(signature = (
    jmat, igram, dates, bperp,
    masterdate=None, nvalid=1, gamma=1.0e-4, nproc=1,
    constraint=None, demerr=false, weightfile=None, propagate_nan=false
))]
#[allow(clippy::too_many_arguments)]
fn invert_stack<'py>(
    py: Python<'py>,
    jmat: PyReadonlyArray2<'py, f64>,
    igram: PyReadonlyArray3<'py, f32>,
    dates: Vec<String>,
    bperp: PyReadonlyArray1<'py, f64>,
    masterdate: Option<String>,
    nvalid: usize,
    gamma: f64,
    nproc: usize,
    constraint: Option<String>,
    demerr: bool,
    weightfile: Option<String>,
    propagate_nan: bool,
) -> PyResult<(&'py PyArray3<f64>, &'py PyArray3<f64>, &'py PyArray2<u32>, Vec<String>)> {
    let params = ProcessingParams {
        master_date: masterdate,
        min_valid: nvalid,
        dem_error: demerr,
        gamma,
        workers: nproc,
        constraint_model: constraint,
        degenerate_samples: if propagate_nan {
            DegenerateSamples::Propagate
        } else {
            DegenerateSamples::Exclude
        },
    };
    let network = NetworkInputs {
        jmat: jmat.as_array().to_owned(),
        dates,
        bperp: bperp.as_array().to_owned(),
    };
    let weights = match weightfile {
        Some(path) => WeightSource::Table(PathBuf::from(path)),
        None => WeightSource::Uniform,
    };
    let mut stack = InMemoryStack::new(igram.as_array().to_owned());

    let (products, names) = py
        .allow_threads(|| {
            let pipeline = XvalPipeline::new(&params, &network, &weights)?;
            let (products, _) = pipeline.run_to_products(&mut stack)?;
            Ok::<_, NsbasError>((products, pipeline.metadata().param_names.clone()))
        })
        .map_err(to_py_err)?;

    Ok((
        products.parms.into_pyarray(py),
        products.error.into_pyarray(py),
        products.ifgcnt.into_pyarray(py),
        names,
    ))
}

/// Read a processing XML file
///
/// Returns `(masterdate, nvalid, demerr, gamma, nproc, constraint)`.
#[pyfunction]
fn read_processing_params(
    path: String,
) -> PyResult<(Option<String>, usize, bool, f64, usize, Option<String>)> {
    let params = ProcessingParams::from_xml_file(&path).map_err(to_py_err)?;
    Ok((
        params.master_date,
        params.min_valid,
        params.dem_error,
        params.gamma,
        params.workers,
        params.constraint_model,
    ))
}
