//! Calibration parameter types
//!
//! Parameters are captured once at submission, validated, and translated into
//! the calibration script's command line. They are never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const AGE_GROUPS: [&str; 3] = ["neonate", "child", "adult"];

/// Which calibration pipeline to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Steps 1-5: openVA classification followed by calibration
    #[default]
    Full,
    /// Steps 4-5 on already prepared calibration data
    CalibrationOnly,
    /// Ensemble calibration over several algorithm outputs
    Ensemble,
}

impl CalibrationMode {
    pub const ALL: [CalibrationMode; 3] = [
        CalibrationMode::Full,
        CalibrationMode::CalibrationOnly,
        CalibrationMode::Ensemble,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CalibrationMode::Full => "full",
            CalibrationMode::CalibrationOnly => "calibration_only",
            CalibrationMode::Ensemble => "ensemble",
        }
    }

    /// Script file (relative to the scripts directory) that implements the mode
    pub fn script_name(self) -> &'static str {
        match self {
            CalibrationMode::Full => "complete_va_calibration.R",
            CalibrationMode::CalibrationOnly => "calibration_only.R",
            CalibrationMode::Ensemble => "ensemble_calibration.R",
        }
    }
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalibrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(CalibrationMode::Full),
            "calibration_only" => Ok(CalibrationMode::CalibrationOnly),
            "ensemble" => Ok(CalibrationMode::Ensemble),
            other => Err(format!(
                "unknown mode '{}' (expected full, calibration_only or ensemble)",
                other
            )),
        }
    }
}

/// Parameters of one calibration run
///
/// Every field has a default so that an empty JSON object is a valid
/// full-mode request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    pub mode: CalibrationMode,

    /// CSV dataset for full mode; the script falls back to its sample data
    pub dataset_path: Option<String>,
    /// Prepared calibration data, required for `calibration_only`
    pub calib_data_path: Option<String>,

    // Ensemble inputs, at least one required for `ensemble`
    pub eava_path: Option<String>,
    pub insilicova_path: Option<String>,
    pub interva_path: Option<String>,

    pub country: String,
    pub age_group: String,
    pub data_type: String,
    /// Number of InSilicoVA simulations
    pub nsim: u32,

    // vacalibration knobs
    pub mmat_type: String,
    pub path_correction: bool,
    #[serde(alias = "nMCMC")]
    pub n_mcmc: u32,
    #[serde(alias = "nBurn")]
    pub n_burn: u32,
    #[serde(alias = "nThin")]
    pub n_thin: u32,
    #[serde(alias = "nChain")]
    pub n_chain: u32,
    #[serde(alias = "nCore")]
    pub n_core: u32,
    pub seed: i64,
    pub verbose: bool,
    pub saveoutput: bool,
    pub plot_it: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            mode: CalibrationMode::Full,
            dataset_path: None,
            calib_data_path: None,
            eava_path: None,
            insilicova_path: None,
            interva_path: None,
            country: "Mozambique".to_string(),
            age_group: "neonate".to_string(),
            data_type: "WHO2016".to_string(),
            nsim: 1000,
            mmat_type: "prior".to_string(),
            path_correction: true,
            n_mcmc: 5000,
            n_burn: 5000,
            n_thin: 1,
            n_chain: 1,
            n_core: 1,
            seed: 1,
            verbose: true,
            saveoutput: false,
            plot_it: false,
        }
    }
}

/// A submission that cannot run as given
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl CalibrationParams {
    /// Checks mode-specific requirements and numeric bounds
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.mode {
            CalibrationMode::CalibrationOnly if present(&self.calib_data_path).is_none() => {
                return Err(ValidationError::new(
                    "calib_data_path",
                    "is required for calibration_only mode",
                ));
            }
            CalibrationMode::Ensemble if self.ensemble_inputs().is_empty() => {
                return Err(ValidationError::new(
                    "eava_path",
                    "or insilicova_path or interva_path is required for ensemble mode",
                ));
            }
            _ => {}
        }

        if !AGE_GROUPS.contains(&self.age_group.as_str()) {
            return Err(ValidationError::new(
                "age_group",
                format!("must be one of {}", AGE_GROUPS.join(", ")),
            ));
        }

        let positive = [
            ("nsim", self.nsim),
            ("n_mcmc", self.n_mcmc),
            ("n_thin", self.n_thin),
            ("n_chain", self.n_chain),
            ("n_core", self.n_core),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ValidationError::new(field, "must be greater than 0"));
            }
        }

        Ok(())
    }

    /// Script flags in their fixed order
    ///
    /// Each parameter maps to one `--name=value` token; optional paths that
    /// are absent are left out entirely.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        match self.mode {
            CalibrationMode::Ensemble => {
                for (flag, path) in self.ensemble_inputs() {
                    args.push(flag_arg(flag, path));
                }
                args.push(flag_arg("country", &self.country));
                args.push(flag_arg("age_group", &self.age_group));
            }
            CalibrationMode::CalibrationOnly => {
                if let Some(path) = present(&self.calib_data_path) {
                    args.push(flag_arg("calib_data", path));
                }
                args.push(flag_arg("country", &self.country));
                args.push(flag_arg("age_group", &self.age_group));
            }
            CalibrationMode::Full => {
                if let Some(path) = present(&self.dataset_path) {
                    args.push(flag_arg("dataset", path));
                }
                args.push(flag_arg("country", &self.country));
                args.push(flag_arg("age_group", &self.age_group));
                args.push(flag_arg("data_type", &self.data_type));
                args.push(flag_arg("nsim", self.nsim));
            }
        }

        args.push(flag_arg("mmat_type", &self.mmat_type));
        args.push(flag_arg("path_correction", r_bool(self.path_correction)));
        args.push(flag_arg("nMCMC", self.n_mcmc));
        args.push(flag_arg("nBurn", self.n_burn));
        args.push(flag_arg("nThin", self.n_thin));
        args.push(flag_arg("nChain", self.n_chain));
        args.push(flag_arg("nCore", self.n_core));
        args.push(flag_arg("seed", self.seed));
        args.push(flag_arg("verbose", r_bool(self.verbose)));
        args.push(flag_arg("saveoutput", r_bool(self.saveoutput)));
        args.push(flag_arg("plot_it", r_bool(self.plot_it)));

        args
    }

    /// One-line, mode-specific summary written into the log header
    pub fn summary(&self) -> String {
        match self.mode {
            CalibrationMode::Ensemble => {
                let algos: Vec<String> = self
                    .ensemble_inputs()
                    .into_iter()
                    .map(|(name, path)| format!("{}={}", name, path))
                    .collect();
                format!(
                    "{}, country={}, age_group={}",
                    algos.join(", "),
                    self.country,
                    self.age_group
                )
            }
            CalibrationMode::CalibrationOnly => format!(
                "calib_data={}, country={}, age_group={}",
                present(&self.calib_data_path).unwrap_or("None"),
                self.country,
                self.age_group
            ),
            CalibrationMode::Full => format!(
                "dataset={}, country={}, age_group={}, nsim={}",
                present(&self.dataset_path).unwrap_or("None"),
                self.country,
                self.age_group,
                self.nsim
            ),
        }
    }

    fn ensemble_inputs(&self) -> Vec<(&'static str, &str)> {
        [
            ("eava", &self.eava_path),
            ("insilicova", &self.insilicova_path),
            ("interva", &self.interva_path),
        ]
        .into_iter()
        .filter_map(|(name, path)| present(path).map(|p| (name, p)))
        .collect()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn flag_arg(name: &str, value: impl fmt::Display) -> String {
    format!("--{}={}", name, value)
}

/// Boolean spelling the R scripts parse
fn r_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}
