use crate::types::{NsbasError, NsbasResult, Vector};
use chrono::NaiveDate;
use ndarray::{Array1, ArrayView1};
use regex::Regex;
use std::path::Path;

/// One relative weight per epoch, scaling that epoch's constraint row
#[derive(Debug, Clone, PartialEq)]
pub struct EpochWeights {
    values: Vector,
}

impl EpochWeights {
    /// Equal weight `1 / n` for every epoch
    pub fn uniform(num_epochs: usize) -> Self {
        let w = if num_epochs > 0 { 1.0 / num_epochs as f64 } else { 0.0 };
        Self {
            values: Array1::from_elem(num_epochs, w),
        }
    }

    /// Weights given directly, one per epoch
    pub fn from_values(values: Vector) -> NsbasResult<Self> {
        if let Some(bad) = values.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(NsbasError::Config(format!(
                "Epoch weights must be finite and non-negative, got {}",
                bad
            )));
        }
        Ok(Self { values })
    }

    /// Match `(date, weight)` records against the acquisition dates
    ///
    /// Every epoch must be matched by exactly one record.
    pub fn from_records(records: &[(NaiveDate, f64)], dates: &[NaiveDate]) -> NsbasResult<Self> {
        let mut values = Array1::<f64>::zeros(dates.len());
        for (i, date) in dates.iter().enumerate() {
            let matches: Vec<f64> = records
                .iter()
                .filter(|(d, _)| d == date)
                .map(|(_, w)| *w)
                .collect();
            if matches.len() != 1 {
                return Err(NsbasError::Config(format!(
                    "The weighting for date {} does not exist or has multiple inputs ({} found)",
                    date.format("%Y%m%d"),
                    matches.len()
                )));
            }
            values[i] = matches[0];
        }
        Self::from_values(values)
    }

    /// Parse a two-column `YYYYMMDD weight` table
    ///
    /// Columns may be separated by whitespace, commas or semicolons; blank
    /// lines and `#` comments are ignored.
    pub fn parse_table(text: &str) -> NsbasResult<Vec<(NaiveDate, f64)>> {
        let date_re = Regex::new(r"^\d{8}$")
            .map_err(|e| NsbasError::Processing(format!("Invalid date pattern: {}", e)))?;

        let mut records = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() != 2 || !date_re.is_match(fields[0]) {
                return Err(NsbasError::InvalidFormat(format!(
                    "Weight table line {}: expected 'YYYYMMDD weight', got '{}'",
                    lineno + 1,
                    line
                )));
            }
            let date = NaiveDate::parse_from_str(fields[0], "%Y%m%d").map_err(|e| {
                NsbasError::InvalidFormat(format!(
                    "Weight table line {}: invalid date '{}': {}",
                    lineno + 1,
                    fields[0],
                    e
                ))
            })?;
            let weight = fields[1].parse::<f64>().map_err(|_| {
                NsbasError::InvalidFormat(format!(
                    "Weight table line {}: invalid weight '{}'",
                    lineno + 1,
                    fields[1]
                ))
            })?;
            records.push((date, weight));
        }
        Ok(records)
    }

    /// Read a weight table file and match it against the acquisition dates
    pub fn from_table_file<P: AsRef<Path>>(path: P, dates: &[NaiveDate]) -> NsbasResult<Self> {
        log::info!("Reading epoch weights from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path)?;
        let records = Self::parse_table(&text)?;
        Self::from_records(&records, dates)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    /// Log the weight of every epoch
    pub fn log_summary(&self, dates: &[NaiveDate]) {
        for (date, w) in dates.iter().zip(self.values.iter()) {
            log::info!("The weight for epoch {} is {:.6}", date.format("%Y%m%d"), w);
        }
    }
}
