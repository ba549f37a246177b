//! Temporal basis functions used to build SBAS and constraint matrices

use crate::types::{Matrix, NsbasError, NsbasResult};
use ndarray::{Array2, ArrayView1};
use regex::Regex;

/// A single term of a temporal model
#[derive(Debug, Clone, PartialEq)]
pub enum TimeFunction {
    /// One impulse column per epoch (displacement relative to the reference)
    Sbas { reference: usize },
    /// Polynomial `(t - t0)^k` for `k = 0..=order`
    Poly { order: usize, t0: f64 },
    /// Heaviside step at `t0`
    Step { t0: f64 },
    /// Exponential relaxation `1 - exp(-(t - t0) / tau)` starting at `t0`
    Exp { t0: f64, tau: f64 },
    /// Logarithmic relaxation `ln(1 + (t - t0) / tau)` starting at `t0`
    Log { t0: f64, tau: f64 },
}

impl TimeFunction {
    fn num_columns(&self, num_epochs: usize) -> usize {
        match self {
            TimeFunction::Sbas { .. } => num_epochs,
            TimeFunction::Poly { order, .. } => order + 1,
            _ => 1,
        }
    }
}

/// Basis matrix evaluated at the acquisition times
#[derive(Debug, Clone)]
pub struct TimeBasis {
    /// Epochs x parameters
    pub matrix: Matrix,
    /// Unique name of every parameter
    pub names: Vec<String>,
    /// Whether each parameter is regularised
    pub reg_flags: Vec<bool>,
}

impl TimeBasis {
    pub fn num_params(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Evaluate a list of time functions at the acquisition times `tims` (years)
pub fn time_basis(functions: &[TimeFunction], tims: ArrayView1<f64>) -> NsbasResult<TimeBasis> {
    let num_epochs = tims.len();
    if num_epochs == 0 {
        return Err(NsbasError::Config("No acquisition times supplied".to_string()));
    }
    if functions.is_empty() {
        return Err(NsbasError::Config("Temporal model has no terms".to_string()));
    }

    let total: usize = functions.iter().map(|f| f.num_columns(num_epochs)).sum();
    let mut matrix = Array2::<f64>::zeros((num_epochs, total));
    let mut names = Vec::with_capacity(total);
    let mut reg_flags = Vec::with_capacity(total);

    let mut col = 0;
    for (term, function) in functions.iter().enumerate() {
        match *function {
            TimeFunction::Sbas { reference } => {
                if reference >= num_epochs {
                    return Err(NsbasError::Config(format!(
                        "SBAS reference index {} outside {} epochs",
                        reference, num_epochs
                    )));
                }
                for k in 0..num_epochs {
                    matrix[[k, col + k]] = 1.0;
                    names.push(format!("sbas{}", k));
                    reg_flags.push(true);
                }
            }
            TimeFunction::Poly { order, t0 } => {
                for k in 0..=order {
                    for (i, &t) in tims.iter().enumerate() {
                        matrix[[i, col + k]] = (t - t0).powi(k as i32);
                    }
                    names.push(format!("p{}", k));
                    reg_flags.push(false);
                }
            }
            TimeFunction::Step { t0 } => {
                for (i, &t) in tims.iter().enumerate() {
                    matrix[[i, col]] = if t >= t0 { 1.0 } else { 0.0 };
                }
                names.push(format!("step{}", term));
                reg_flags.push(false);
            }
            TimeFunction::Exp { t0, tau } => {
                check_tau(tau)?;
                for (i, &t) in tims.iter().enumerate() {
                    if t >= t0 {
                        matrix[[i, col]] = 1.0 - (-(t - t0) / tau).exp();
                    }
                }
                names.push(format!("exp{}", term));
                reg_flags.push(false);
            }
            TimeFunction::Log { t0, tau } => {
                check_tau(tau)?;
                for (i, &t) in tims.iter().enumerate() {
                    if t >= t0 {
                        matrix[[i, col]] = (1.0 + (t - t0) / tau).ln();
                    }
                }
                names.push(format!("log{}", term));
                reg_flags.push(false);
            }
        }
        col += function.num_columns(num_epochs);
    }

    Ok(TimeBasis {
        matrix,
        names,
        reg_flags,
    })
}

fn check_tau(tau: f64) -> NsbasResult<()> {
    if tau.is_finite() && tau > 0.0 {
        Ok(())
    } else {
        Err(NsbasError::Config(format!(
            "Relaxation time must be positive, got {}",
            tau
        )))
    }
}

/// Default constraint model: quadratic polynomial anchored at the reference time
pub fn default_constraint(t_ref: f64) -> Vec<TimeFunction> {
    vec![TimeFunction::Poly { order: 2, t0: t_ref }]
}

/// Parse a constraint model such as `POLY 2; EXP 1.5 0.3`
///
/// Origins are in years since the first acquisition, like the acquisition
/// times. Terms are separated by `;` or newlines. `POLY n` without an origin is
/// anchored at `t_ref`.
pub fn parse_model(model: &str, t_ref: f64) -> NsbasResult<Vec<TimeFunction>> {
    let term_re = Regex::new(r"^(?i)(POLY|STEP|EXP|LOG)((?:\s+\S+)*)$")
        .map_err(|e| NsbasError::Processing(format!("Invalid model pattern: {}", e)))?;

    let mut functions = Vec::new();
    for raw in model.split(|c: char| c == ';' || c == '\n') {
        let term = raw.trim();
        if term.is_empty() {
            continue;
        }
        let captures = term_re.captures(term).ok_or_else(|| {
            NsbasError::Config(format!("Malformed constraint model term '{}'", term))
        })?;
        let keyword = captures[1].to_uppercase();
        let args = captures[2]
            .split_whitespace()
            .map(|a| {
                a.parse::<f64>().map_err(|_| {
                    NsbasError::Config(format!("Invalid number '{}' in term '{}'", a, term))
                })
            })
            .collect::<NsbasResult<Vec<f64>>>()?;

        let function = match (keyword.as_str(), args.as_slice()) {
            ("POLY", [order]) | ("POLY", [order, _]) if order.fract() != 0.0 || *order < 0.0 => {
                return Err(NsbasError::Config(format!(
                    "Polynomial order must be a non-negative integer in '{}'",
                    term
                )));
            }
            ("POLY", [order]) => TimeFunction::Poly { order: *order as usize, t0: t_ref },
            ("POLY", [order, t0]) => TimeFunction::Poly { order: *order as usize, t0: *t0 },
            ("STEP", [t0]) => TimeFunction::Step { t0: *t0 },
            ("EXP", [t0, tau]) => {
                check_tau(*tau)?;
                TimeFunction::Exp { t0: *t0, tau: *tau }
            }
            ("LOG", [t0, tau]) => {
                check_tau(*tau)?;
                TimeFunction::Log { t0: *t0, tau: *tau }
            }
            _ => {
                return Err(NsbasError::Config(format!(
                    "Wrong number of arguments in constraint model term '{}'",
                    term
                )));
            }
        };
        functions.push(function);
    }

    if functions.is_empty() {
        return Err(NsbasError::Config("Constraint model is empty".to_string()));
    }
    Ok(functions)
}
