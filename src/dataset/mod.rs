//! Remote dataset access and on-disk field storage.
//!
//! The fetch pipeline only talks to the traits in this module. The NetCDF
//! implementation (OPeNDAP reads, NetCDF writes) lives in [`netcdf_io`] and needs
//! the `netcdf` feature.

pub mod field;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;

use std::{collections::BTreeMap, ops::Range, path::Path};

use ndarray::Array4;
use thiserror::Error;

use crate::{
    time::{DecodeError, RawTimeAxis},
    window::{DepthWindow, DomainWindow},
};

pub use field::Field;

/// Error type for dataset and store operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Missing variable: {0}")]
    MissingVariable(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// A subset of one variable read from a dataset, without its time labels.
#[derive(Debug, Clone)]
pub struct Hyperslab {
    pub depth: Option<Vec<f64>>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// `(time, depth, lat, lon)`; surface variables have a depth axis of one.
    pub data: Array4<f32>,
    pub attributes: BTreeMap<String, String>,
}

/// Opens remote datasets.
pub trait RemoteSource: Send + Sync {
    type Handle: DatasetHandle;

    /// Opens `uri` restricted to `domain`. Nothing but coordinates is read;
    /// variables in `drop_variables` are never read.
    fn open(
        &self,
        uri: &str,
        drop_variables: &[&str],
        domain: &DomainWindow,
    ) -> Result<Self::Handle, DatasetError>;
}

/// A lazily evaluated view over one remote dataset.
pub trait DatasetHandle {
    /// The undecoded time coordinate.
    fn time_axis(&self) -> Result<RawTimeAxis, DatasetError>;

    /// Reads time steps `time` of `variable`, limited to the domain the handle
    /// was opened with and, for 4-D variables, to `depth`.
    fn read(
        &self,
        variable: &str,
        time: Range<usize>,
        depth: &DepthWindow,
    ) -> Result<Hyperslab, DatasetError>;

    fn close(self) -> Result<(), DatasetError>;
}

/// Persists fields to files and reads them back.
pub trait FieldStore: Send + Sync {
    /// Writes `fields` to a single file at `path`. They must share one grid.
    fn write(&self, path: &Path, fields: &[Field]) -> Result<(), DatasetError>;

    /// Reads every time-dependent field stored at `path`.
    fn read(&self, path: &Path) -> Result<Vec<Field>, DatasetError>;

    /// Moves a finished file into place, replacing anything already at `to`.
    fn persist(&self, from: &Path, to: &Path) -> Result<(), DatasetError> {
        std::fs::rename(from, to)?;

        Ok(())
    }
}
