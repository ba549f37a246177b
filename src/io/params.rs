use crate::types::{
    DegenerateSamples, InversionConfig, NsbasError, NsbasResult, DEFAULT_GAMMA, DEFAULT_RCOND,
};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;

/// Processing XML layout, the `<proc>` section of the parameter file
#[derive(Debug, Deserialize)]
struct ProcessingXml {
    #[serde(rename = "proc")]
    processing: ProcSection,
}

#[derive(Debug, Deserialize)]
struct ProcSection {
    #[serde(default)]
    masterdate: Option<String>,
    nvalid: usize,
    #[serde(default)]
    demerr: bool,
    #[serde(default)]
    gamma: Option<f64>,
    #[serde(default)]
    nproc: Option<usize>,
    #[serde(default)]
    constraint: Option<String>,
    #[serde(default)]
    degenerate: Option<String>,
}

/// Processing parameters of an NSBAS cross-validation run
#[derive(Debug, Clone)]
pub struct ProcessingParams {
    /// Reference date (`YYYYMMDD`); the first epoch when absent
    pub master_date: Option<String>,
    /// Minimum number of valid interferograms per pixel
    pub min_valid: usize,
    /// Estimate a range-error (DEM error) term from perpendicular baselines
    pub dem_error: bool,
    /// Weight of the constraint rows
    pub gamma: f64,
    /// Number of workers per scan line
    pub workers: usize,
    /// Constraint model, e.g. `POLY 2`; quadratic polynomial when absent
    pub constraint_model: Option<String>,
    /// Treatment of degenerate jackknife samples
    pub degenerate_samples: DegenerateSamples,
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            master_date: None,
            min_valid: 1,
            dem_error: false,
            gamma: DEFAULT_GAMMA,
            workers: 1,
            constraint_model: None,
            degenerate_samples: DegenerateSamples::Exclude,
        }
    }
}

impl ProcessingParams {
    /// Parse processing parameters from XML text
    pub fn from_xml_str(xml: &str) -> NsbasResult<Self> {
        let parsed: ProcessingXml = from_str(xml)
            .map_err(|e| NsbasError::XmlParsing(format!("Failed to parse processing XML: {}", e)))?;
        let section = parsed.processing;

        let degenerate_samples = match section.degenerate.as_deref().map(str::trim) {
            None | Some("") => DegenerateSamples::Exclude,
            Some(value) => match value.to_lowercase().as_str() {
                "exclude" => DegenerateSamples::Exclude,
                "propagate" => DegenerateSamples::Propagate,
                other => {
                    return Err(NsbasError::Config(format!(
                        "Unknown degenerate sample policy '{}'",
                        other
                    )))
                }
            },
        };

        Ok(Self {
            master_date: non_empty(section.masterdate),
            min_valid: section.nvalid,
            dem_error: section.demerr,
            gamma: section.gamma.unwrap_or(DEFAULT_GAMMA),
            workers: section.nproc.unwrap_or(1),
            constraint_model: non_empty(section.constraint),
            degenerate_samples,
        })
    }

    /// Read processing parameters from an XML file
    pub fn from_xml_file<P: AsRef<Path>>(path: P) -> NsbasResult<Self> {
        log::info!("Reading processing parameters from: {}", path.as_ref().display());
        let xml = std::fs::read_to_string(path)?;
        Self::from_xml_str(&xml)
    }

    /// Solver and dispatch settings derived from these parameters
    pub fn inversion_config(&self) -> InversionConfig {
        InversionConfig {
            gamma: self.gamma,
            min_valid: self.min_valid,
            workers: self.workers,
            rcond: DEFAULT_RCOND,
            degenerate_samples: self.degenerate_samples,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
