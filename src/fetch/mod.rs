//! Fetching a single HYCOM variable: open the remote dataset until it can be
//! trusted, then extract, resample and save the requested window.

pub mod extract;
pub mod open;

use std::path::PathBuf;

use indicatif::ProgressBar;
use thiserror::Error;

use crate::{
    catalog::VariableSpec,
    config::FetchConfig,
    dataset::{DatasetError, FieldStore, RemoteSource},
    window::{DepthWindow, DomainWindow, TimeWindow},
};

pub use extract::extract_variable;
pub use open::{open_validated, ValidatedDataset};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{variable}: gave up on {uri} after {attempts} attempts, last failure was {last_failure}")]
    RetriesExhausted {
        variable: String,
        uri: String,
        attempts: u32,
        last_failure: String,
    },

    #[error("{variable}: {source}")]
    Dataset {
        variable: String,
        #[source]
        source: DatasetError,
    },
}

impl FetchError {
    pub fn dataset(variable: &str, source: DatasetError) -> Self {
        FetchError::Dataset {
            variable: variable.to_string(),
            source,
        }
    }
}

/// What every variable of a run is cut down to, and where it goes.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub domain: DomainWindow,
    pub depths: DepthWindow,
    pub window: TimeWindow,
    pub output_dir: PathBuf,
}

/// Downloads one variable to `request.output_dir/spec.output_filename`.
pub fn download_variable<S: RemoteSource, F: FieldStore>(
    source: &S,
    store: &F,
    spec: &VariableSpec,
    request: &FetchRequest,
    config: &FetchConfig,
    progress: &ProgressBar,
) -> Result<PathBuf, FetchError> {
    let dataset = open_validated(source, spec, &request.domain, config, progress)?;
    let path = extract_variable(dataset, spec, request, store, progress)?;

    progress.finish_with_message(format!("{} saved to {}", spec.variable_id, path.display()));

    Ok(path)
}
