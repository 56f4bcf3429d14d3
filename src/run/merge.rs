//! Combining the per-variable files of a run into one.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dataset::{DatasetError, Field, FieldStore};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no variables to merge")]
    Empty,

    #[error("`{variable}` is on a different grid from `{reference}`")]
    GridMismatch { variable: String, reference: String },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks that `fields` can share one grid. Fields with a depth axis must
/// agree with each other; surface fields only need the same horizontal grid.
pub fn check_compatible(fields: &[Field]) -> Result<(), MergeError> {
    let first = fields.first().ok_or(MergeError::Empty)?;
    let layered = fields.iter().find(|f| f.depth.is_some());

    for field in fields {
        let grid_differs = field.lat != first.lat
            || field.lon != first.lon
            || matches!((&field.depth, layered), (Some(depth), Some(reference)) if Some(depth) != reference.depth.as_ref());
        if grid_differs {
            return Err(MergeError::GridMismatch {
                variable: field.name.clone(),
                reference: layered.map_or(&first.name, |f| &f.name).clone(),
            });
        }
    }

    Ok(())
}

/// Puts every field on the sorted union of their time axes. Days a variable
/// lacks, from skipped time steps, are `NaN`.
pub fn align_time(fields: &[Field]) -> Vec<Field> {
    let mut axis: Vec<NaiveDateTime> = fields.iter().flat_map(|f| f.time.iter().copied()).collect();
    axis.sort();
    axis.dedup();

    fields
        .iter()
        .map(|field| {
            if field.time != axis {
                warn!(
                    variable = %field.name,
                    missing = axis.len().saturating_sub(field.len()),
                    "Filling missing days with NaN"
                );
            }
            field.reindex_time(&axis)
        })
        .collect()
}

/// Merges the variables stored in `files` into `outfile`, replacing it only
/// once the merged file is completely written.
pub fn write_run_file<F: FieldStore>(
    store: &F,
    files: &[PathBuf],
    outfile: &Path,
    pad: bool,
) -> Result<PathBuf, MergeError> {
    let mut read = Vec::new();
    for file in files {
        read.extend(store.read(file)?);
    }
    check_compatible(&read)?;
    let mut fields = align_time(&read);

    if pad {
        fields = fields.iter().map(Field::pad_last_day).collect();
    }

    let file_name = outfile
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let partial = outfile.with_file_name(format!(".{}.partial", file_name));

    if let Err(e) = store.write(&partial, &fields) {
        if let Err(e) = fs::remove_file(&partial) {
            debug!(path = %partial.display(), error = %e, "No partial run file to remove");
        }
        return Err(e.into());
    }
    store.persist(&partial, outfile)?;
    set_permissions(outfile)?;

    info!(path = %outfile.display(), variables = fields.len(), "Merged run file");

    Ok(outfile.to_path_buf())
}

#[cfg(unix)]
fn set_permissions(path: &Path) -> Result<(), MergeError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o775))?;

    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(path: &Path) -> Result<(), MergeError> {
    warn!(path = %path.display(), "Leaving permissions unchanged on this platform");

    Ok(())
}

// -- Tests -------------------------------------------------------------------
