use crate::types::{NsbasError, NsbasResult, Vector};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, ArrayView1};

const DAYS_PER_YEAR: f64 = 365.25;

/// Acquisition dates of the SAR scenes and their times in years
#[derive(Debug, Clone)]
pub struct Epochs {
    dates: Vec<NaiveDate>,
    tims: Vector,
}

impl Epochs {
    /// Build from dates in strictly increasing order
    pub fn from_dates(dates: Vec<NaiveDate>) -> NsbasResult<Self> {
        if dates.is_empty() {
            return Err(NsbasError::Config("No acquisition dates supplied".to_string()));
        }
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(NsbasError::Config(format!(
                "Acquisition dates must be strictly increasing: {} followed by {}",
                pair[0].format("%Y%m%d"),
                pair[1].format("%Y%m%d")
            )));
        }

        let first = dates[0];
        let tims = Array1::from_iter(
            dates
                .iter()
                .map(|d| (*d - first).num_days() as f64 / DAYS_PER_YEAR),
        );
        Ok(Self { dates, tims })
    }

    /// Parse `YYYYMMDD` date strings
    pub fn from_date_strings<S: AsRef<str>>(dates: &[S]) -> NsbasResult<Self> {
        let parsed = dates
            .iter()
            .map(|d| parse_date(d.as_ref()))
            .collect::<NsbasResult<Vec<_>>>()?;
        Self::from_dates(parsed)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Acquisition times in years since the first acquisition
    pub fn tims(&self) -> ArrayView1<'_, f64> {
        self.tims.view()
    }

    /// Proleptic Gregorian ordinal of every date
    pub fn ordinals(&self) -> Vec<i32> {
        self.dates.iter().map(|d| d.num_days_from_ce()).collect()
    }

    /// Index of the reference (master) date; the first epoch when none is given
    pub fn reference_index(&self, master_date: Option<&str>) -> NsbasResult<usize> {
        let Some(master) = master_date else {
            return Ok(0);
        };
        let date = parse_date(master)?;
        self.dates.iter().position(|d| *d == date).ok_or_else(|| {
            NsbasError::Config(format!(
                "Reference date {} is not one of the acquisition dates",
                master
            ))
        })
    }
}

/// Parse a `YYYYMMDD` date
pub fn parse_date(text: &str) -> NsbasResult<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y%m%d")
        .map_err(|e| NsbasError::Config(format!("Invalid date '{}': {}", text, e)))
}
