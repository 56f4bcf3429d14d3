//! The HYCOM variables this tool knows how to fetch.
//!
//! Each variable lives on its own THREDDS FMRC "best time series" aggregation.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;

const THREDDS_ROOT: &str = "https://tds.hycom.org/thredds/dodsC";

/// Variables fetched when none are requested explicitly, in catalog order.
pub const DEFAULT_VARIABLES: [&str; 5] = ["salinity", "water_temp", "surf_el", "water_u", "water_v"];

/// Variables that are never read from the remote datasets.
pub const DROP_VARIABLES: [&str; 19] = [
    "salinity_bottom",
    "water_temp_bottom",
    "water_u_bottom",
    "water_v_bottom",
    "tau",
    "time_offset",
    "time_run",
    "time1_offset",
    "sst",
    "sss",
    "ssu",
    "ssv",
    "sic",
    "sih",
    "siu",
    "siv",
    "surtx",
    "surty",
    "steric_ssh",
];

/// Native time step of a source variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Hourly,
    ThreeHourly,
}

impl Cadence {
    /// Distinct time steps a fully published dataset carries. Fewer means the
    /// server is mid-refresh.
    pub fn min_steps(&self) -> usize {
        match self {
            Cadence::Hourly => 385,
            Cadence::ThreeHourly => 121,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub variable_id: String,
    pub remote_uri: String,
    pub output_filename: String,
    pub cadence: Cadence,
}

/// Formats a run date the way every output file name embeds it.
pub fn run_stamp(run_date: &NaiveDateTime) -> String {
    run_date.format("%Y%m%d_%H").to_string()
}

/// File name of the merged multi-variable output.
pub fn run_file_name(run_date: &NaiveDateTime) -> String {
    format!("HYCOM_{}.nc", run_stamp(run_date))
}

/// Builds the specs for `variables`, preserving their order.
pub fn build_catalog(variables: &[String], run_date: &NaiveDateTime) -> Result<Vec<VariableSpec>> {
    let datasets = dataset_map();
    let stamp = run_stamp(run_date);
    let mut specs: Vec<VariableSpec> = Vec::new();

    for variable in variables {
        if specs.iter().any(|s| &s.variable_id == variable) {
            continue;
        }

        let (dataset, cadence) = datasets.get(variable.as_str()).ok_or_else(|| {
            anyhow!(
                "Unknown HYCOM variable `{}` (expected one of {})",
                variable,
                DEFAULT_VARIABLES.join(", ")
            )
        })?;

        specs.push(VariableSpec {
            variable_id: variable.clone(),
            remote_uri: format!("{}/{}/{}_best.ncd", THREDDS_ROOT, dataset, dataset),
            output_filename: format!("hycom_{}_{}.nc", variable, stamp),
            cadence: *cadence,
        });
    }

    if specs.is_empty() {
        return Err(anyhow!("No variables requested"));
    }

    Ok(specs)
}

fn dataset_map() -> HashMap<&'static str, (&'static str, Cadence)> {
    let mut dataset_map = HashMap::new();
    dataset_map.insert("salinity", ("FMRC_ESPC-D-V02_s3z", Cadence::ThreeHourly));
    dataset_map.insert("water_temp", ("FMRC_ESPC-D-V02_t3z", Cadence::ThreeHourly));
    dataset_map.insert("surf_el", ("FMRC_ESPC-D-V02_ssh", Cadence::Hourly));
    dataset_map.insert("water_u", ("FMRC_ESPC-D-V02_u3z", Cadence::ThreeHourly));
    dataset_map.insert("water_v", ("FMRC_ESPC-D-V02_v3z", Cadence::ThreeHourly));

    dataset_map
}

// -- Tests -------------------------------------------------------------------
