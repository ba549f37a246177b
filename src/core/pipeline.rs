use crate::core::design::{DesignParams, NetworkDesign};
use crate::core::dispatch::{NsbasInverter, RunSummary};
use crate::core::timefn::{default_constraint, parse_model};
use crate::io::epochs::Epochs;
use crate::io::params::ProcessingParams;
use crate::io::stack::{InversionProducts, LineSink, LineSource, ProductMetadata};
use crate::io::weights::EpochWeights;
use crate::types::{Matrix, NsbasError, NsbasResult, Vector};
use std::path::PathBuf;

/// Interferometric network the stack was formed from
#[derive(Debug, Clone)]
pub struct NetworkInputs {
    /// Incidence matrix (interferograms x epochs)
    pub jmat: Matrix,
    /// Acquisition dates as `YYYYMMDD`
    pub dates: Vec<String>,
    /// Perpendicular baseline of every interferogram, in meters
    pub bperp: Vector,
}

/// Where the per-epoch constraint weights come from
#[derive(Debug, Clone)]
pub enum WeightSource {
    /// `1 / num_epochs` for every epoch
    Uniform,
    /// Two-column `YYYYMMDD weight` table
    Table(PathBuf),
    /// Explicit weights in epoch order
    Values(Vector),
}

/// A configured cross-validation run
///
/// Construction performs every configuration check, so a pipeline that
/// exists is ready to process pixels.
pub struct XvalPipeline {
    epochs: Epochs,
    inverter: NsbasInverter,
    metadata: ProductMetadata,
}

impl XvalPipeline {
    pub fn new(
        params: &ProcessingParams,
        network: &NetworkInputs,
        weights: &WeightSource,
    ) -> NsbasResult<Self> {
        let epochs = Epochs::from_date_strings(&network.dates)?;
        let (num_ifg, num_epochs) = network.jmat.dim();
        if num_epochs != epochs.len() {
            return Err(NsbasError::Config(format!(
                "Incidence matrix has {} epochs but {} dates were given",
                num_epochs,
                epochs.len()
            )));
        }
        if network.bperp.len() != num_ifg {
            return Err(NsbasError::Config(format!(
                "Expected {} perpendicular baselines, got {}",
                num_ifg,
                network.bperp.len()
            )));
        }

        let reference = epochs.reference_index(params.master_date.as_deref())?;
        let t_ref = epochs.tims()[reference];
        let constraint = match params.constraint_model.as_deref() {
            Some(model) => parse_model(model, t_ref)?,
            None => {
                log::info!("No constraint model given, assuming a quadratic polynomial");
                default_constraint(t_ref)
            }
        };

        let design = NetworkDesign::build(&DesignParams {
            jmat: network.jmat.view(),
            tims: epochs.tims(),
            reference,
            constraint: &constraint,
            bperp: params.dem_error.then(|| network.bperp.view()),
        })?;

        let weights = match weights {
            WeightSource::Uniform => EpochWeights::uniform(epochs.len()),
            WeightSource::Table(path) => EpochWeights::from_table_file(path, epochs.dates())?,
            WeightSource::Values(values) => EpochWeights::from_values(values.clone())?,
        };
        weights.log_summary(epochs.dates());

        let config = params.inversion_config();
        let metadata = ProductMetadata {
            master_index: reference,
            param_names: design.param_names.clone(),
            reg_flags: design.reg_flags.clone(),
            bperp: network.bperp.clone(),
            epoch_bperp: design.epoch_bperp.clone(),
            tims: epochs.tims().to_owned(),
            dates: epochs.ordinals(),
            gamma: config.gamma,
        };
        let inverter = NsbasInverter::new(design, weights, config)?;

        Ok(Self {
            epochs,
            inverter,
            metadata,
        })
    }

    pub fn epochs(&self) -> &Epochs {
        &self.epochs
    }

    pub fn inverter(&self) -> &NsbasInverter {
        &self.inverter
    }

    pub fn metadata(&self) -> &ProductMetadata {
        &self.metadata
    }

    /// Stream every line of `source` into `sink`
    pub fn run<S: LineSource, K: LineSink>(&self, source: &mut S, sink: &mut K) -> NsbasResult<RunSummary> {
        self.inverter.run(source, sink)
    }

    /// Invert the whole stack into in-memory products carrying the run metadata
    pub fn run_to_products<S: LineSource>(
        &self,
        source: &mut S,
    ) -> NsbasResult<(InversionProducts, RunSummary)> {
        let (_, lines, width) = source.dims();
        let mut products =
            InversionProducts::new(lines, width, self.inverter.design().num_params());
        let summary = self.run(source, &mut products)?;
        products.metadata = Some(self.metadata.clone());
        Ok((products, summary))
    }
}
