//! Extracting the requested window from a validated dataset.
//!
//! Daily means are written one file per day into a scratch directory inside
//! the output directory, then combined into the variable's output file. A day
//! that fails to write is skipped; the rest of the variable still lands.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indicatif::ProgressBar;
use tempfile::Builder;
use tracing::{debug, info, warn};

use super::{FetchError, FetchRequest, ValidatedDataset};
use crate::{
    catalog::VariableSpec,
    cli::bar_style,
    dataset::{DatasetError, DatasetHandle, Field, FieldStore},
    window::TimeWindow,
};

/// Reads, resamples and saves `spec`'s variable. The handle is closed and the
/// scratch files removed whatever the outcome.
pub fn extract_variable<H: DatasetHandle, F: FieldStore>(
    dataset: ValidatedDataset<H>,
    spec: &VariableSpec,
    request: &FetchRequest,
    store: &F,
    progress: &ProgressBar,
) -> Result<PathBuf, FetchError> {
    let variable = spec.variable_id.as_str();
    let ValidatedDataset { handle, time } = dataset;

    progress.set_message(format!("{}: reading {} time steps", variable, time.len()));
    let selected = read_window(&handle, variable, &time, request);
    if let Err(e) = handle.close() {
        debug!(variable, error = %e, "Failed to close dataset");
    }

    let daily = selected
        .map_err(|e| FetchError::dataset(variable, e))?
        .resample_daily();
    info!(variable, days = daily.len(), "Extracted daily means");

    let scratch = Builder::new()
        .prefix(&format!(".{}-", variable))
        .tempdir_in(&request.output_dir)
        .map_err(|e| FetchError::dataset(variable, e.into()))?;

    progress.set_length(daily.len() as u64);
    progress.set_style(bar_style());
    progress.set_message(format!("{}: writing daily files", variable));
    let slices = write_days(&daily, scratch.path(), store, progress);

    let save_path = request.output_dir.join(&spec.output_filename);
    let result = combine(&daily, &slices, &request.window, &save_path, store);

    for slice in &slices {
        if let Err(e) = fs::remove_file(slice) {
            warn!(variable, path = %slice.display(), error = %e, "Failed to remove temporary file");
        }
    }
    if let Err(e) = scratch.close() {
        warn!(variable, error = %e, "Failed to remove temporary directory");
    }

    result.map_err(|e| FetchError::dataset(variable, e))
}

// Time steps of `variable` inside the window, on the handle's spatial subset.
fn read_window<H: DatasetHandle>(
    handle: &H,
    variable: &str,
    time: &[chrono::NaiveDateTime],
    request: &FetchRequest,
) -> Result<Field, DatasetError> {
    let rows = request.window.indices(time).unwrap_or(0..0);
    let slab = handle.read(variable, rows.clone(), &request.depths)?;
    let field = Field::from_slab(variable, time[rows].to_vec(), slab)?;

    Ok(field.select_time(&request.window))
}

// Writes one file per day, returning the ones that made it to disk.
fn write_days<F: FieldStore>(
    daily: &Field,
    scratch: &Path,
    store: &F,
    progress: &ProgressBar,
) -> Vec<PathBuf> {
    let mut slices = Vec::with_capacity(daily.len());

    for index in 0..daily.len() {
        let day = daily.time[index].format("%Y-%m-%d").to_string();
        let path = scratch.join(format!("{}_{}.nc", daily.name, day));

        match store.write(&path, &[daily.timestep(index)]) {
            Ok(()) => slices.push(path),
            Err(e) => {
                warn!(variable = %daily.name, %day, error = %e, "Skipping time step");
                if let Err(e) = fs::remove_file(&path) {
                    debug!(path = %path.display(), error = %e, "No partial time step to remove");
                }
            }
        }
        progress.inc(1);
    }

    slices
}

fn combine<F: FieldStore>(
    daily: &Field,
    slices: &[PathBuf],
    window: &TimeWindow,
    save_path: &Path,
    store: &F,
) -> Result<PathBuf, DatasetError> {
    let mut parts = Vec::with_capacity(slices.len());
    for slice in slices {
        match store.read(slice) {
            Ok(fields) => parts.extend(fields.into_iter().filter(|f| f.name == daily.name)),
            Err(e) => warn!(variable = %daily.name, path = %slice.display(), error = %e, "Skipping unreadable time step"),
        }
    }

    let combined = if parts.is_empty() {
        daily.empty_like()
    } else {
        Field::concat_sorted(&parts)?
    };

    store.write(save_path, &[combined.select_time(window)])?;

    Ok(save_path.to_path_buf())
}

// -- Tests -------------------------------------------------------------------
