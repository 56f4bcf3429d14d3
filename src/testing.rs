//! Scripted dataset source and in-memory store for tests.

use std::{
    collections::{HashMap, VecDeque},
    fs,
    ops::Range,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use ndarray::{s, Array4};

use crate::{
    catalog::{build_catalog, Cadence, DEFAULT_VARIABLES},
    dataset::{DatasetError, DatasetHandle, Field, FieldStore, Hyperslab, RemoteSource},
    time::RawTimeAxis,
    window::{DepthWindow, DomainWindow},
};

pub const HOURLY: i64 = 1;
pub const THREE_HOURLY: i64 = 3;

/// July 2025, day `d` at hour `h`.
pub fn at(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

/// Selects three latitudes and three longitudes of the mock grid.
pub fn domain() -> DomainWindow {
    DomainWindow {
        lon_min: 11.0,
        lon_max: 13.0,
        lat_min: -39.0,
        lat_max: -37.0,
    }
}

#[derive(Debug, Clone)]
pub struct MockDataset {
    pub raw_time: RawTimeAxis,
    /// Full grid. Its own time labels are ignored in favour of `raw_time`.
    pub field: Field,
}

/// `steps` time steps of `name` every `step_hours` from `start`. Every value
/// equals the day of month of its time step.
pub fn dataset(
    name: &str,
    start: NaiveDateTime,
    step_hours: i64,
    steps: usize,
    with_depth: bool,
) -> MockDataset {
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let time: Vec<NaiveDateTime> = (0..steps)
        .map(|i| start + Duration::hours(step_hours * i as i64))
        .collect();
    let depth = with_depth.then(|| vec![0.0, 10.0, 6000.0]);
    let nz = depth.as_ref().map_or(1, |d| d.len());

    let mut data = Array4::<f32>::zeros((steps, nz, 5, 5));
    for (i, t) in time.iter().enumerate() {
        data.slice_mut(s![i, .., .., ..]).fill(t.day() as f32);
    }

    let field = Field::new(
        name,
        time.clone(),
        depth,
        vec![-40.0, -39.0, -38.0, -37.0, -36.0],
        vec![10.0, 11.0, 12.0, 13.0, 14.0],
        data,
    )
    .unwrap();

    MockDataset {
        raw_time: RawTimeAxis {
            values: time.iter().map(|t| (*t - epoch).num_hours() as f64).collect(),
            units: Some("hours since 2000-01-01 00:00:00".to_string()),
            calendar: Some("gregorian".to_string()),
        },
        field,
    }
}

/// A complete three-hourly dataset from 2025-07-10.
pub fn three_hourly_dataset(name: &str, with_depth: bool) -> MockDataset {
    dataset(name, at(10, 0), THREE_HOURLY, Cadence::ThreeHourly.min_steps(), with_depth)
}

/// A source serving complete datasets for every default variable.
pub fn hycom_source(run_date: &NaiveDateTime) -> MockSource {
    let variables: Vec<String> = DEFAULT_VARIABLES.iter().map(|v| v.to_string()).collect();
    let mut source = MockSource::new();

    for spec in build_catalog(&variables, run_date).unwrap() {
        let dataset = match spec.cadence {
            Cadence::Hourly => dataset(&spec.variable_id, at(10, 0), HOURLY, spec.cadence.min_steps(), false),
            Cadence::ThreeHourly => three_hourly_dataset(&spec.variable_id, true),
        };
        source = source.with_dataset(&spec.remote_uri, dataset);
    }

    source
}

/// Ways a single open can go wrong.
#[derive(Debug, Clone)]
pub enum Glitch {
    OpenFails,
    MissingCalendar,
    MalformedUnits,
    /// Only the first `n` time steps are published.
    Truncated(usize),
}

/// Serves [`MockDataset`]s, replaying scripted glitches on successive opens.
#[derive(Default)]
pub struct MockSource {
    datasets: HashMap<String, MockDataset>,
    glitches: Mutex<HashMap<String, VecDeque<Glitch>>>,
    opens: Mutex<HashMap<String, usize>>,
    closes: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, uri: &str, dataset: MockDataset) -> Self {
        self.datasets.insert(uri.to_string(), dataset);
        self
    }

    pub fn with_glitches(self, uri: &str, glitches: Vec<Glitch>) -> Self {
        self.glitches
            .lock()
            .unwrap()
            .insert(uri.to_string(), glitches.into());
        self
    }

    pub fn opens(&self, uri: &str) -> usize {
        self.opens.lock().unwrap().get(uri).copied().unwrap_or(0)
    }

    pub fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl RemoteSource for MockSource {
    type Handle = MockHandle;

    fn open(
        &self,
        uri: &str,
        drop_variables: &[&str],
        domain: &DomainWindow,
    ) -> Result<MockHandle, DatasetError> {
        *self.opens.lock().unwrap().entry(uri.to_string()).or_default() += 1;

        let dataset = self
            .datasets
            .get(uri)
            .ok_or_else(|| DatasetError::InvalidData(format!("no such dataset {}", uri)))?;
        let glitch = self
            .glitches
            .lock()
            .unwrap()
            .get_mut(uri)
            .and_then(|g| g.pop_front());

        let mut raw_time = dataset.raw_time.clone();
        match glitch {
            Some(Glitch::OpenFails) => {
                return Err(DatasetError::InvalidData("server hung up".to_string()))
            }
            Some(Glitch::MissingCalendar) => raw_time.calendar = None,
            Some(Glitch::MalformedUnits) => raw_time.units = Some("hours after noon".to_string()),
            Some(Glitch::Truncated(n)) => raw_time.values.truncate(n),
            None => {}
        }

        Ok(MockHandle {
            raw_time,
            field: dataset.field.clone(),
            dropped: drop_variables.iter().map(|v| v.to_string()).collect(),
            lat: domain.lat_indices(&dataset.field.lat),
            lon: domain.lon_indices(&dataset.field.lon),
            closes: Arc::clone(&self.closes),
        })
    }
}

pub struct MockHandle {
    raw_time: RawTimeAxis,
    field: Field,
    dropped: Vec<String>,
    lat: Option<Range<usize>>,
    lon: Option<Range<usize>>,
    closes: Arc<AtomicUsize>,
}

impl DatasetHandle for MockHandle {
    fn time_axis(&self) -> Result<RawTimeAxis, DatasetError> {
        Ok(self.raw_time.clone())
    }

    fn read(
        &self,
        variable: &str,
        time: Range<usize>,
        depth: &DepthWindow,
    ) -> Result<Hyperslab, DatasetError> {
        if variable != self.field.name || self.dropped.iter().any(|d| d == variable) {
            return Err(DatasetError::MissingVariable(variable.to_string()));
        }
        let (Some(lat), Some(lon)) = (self.lat.clone(), self.lon.clone()) else {
            return Err(DatasetError::InvalidData("domain outside grid".to_string()));
        };
        let (levels, z) = match &self.field.depth {
            Some(levels) => {
                let z = depth
                    .indices(levels)
                    .ok_or_else(|| DatasetError::InvalidData("no depth levels".to_string()))?;
                (Some(levels[z.clone()].to_vec()), z)
            }
            None => (None, 0..1),
        };

        Ok(Hyperslab {
            depth: levels,
            lat: self.field.lat[lat.clone()].to_vec(),
            lon: self.field.lon[lon.clone()].to_vec(),
            data: self.field.data.slice(s![time, z, lat, lon]).to_owned(),
            attributes: self.field.attributes.clone(),
        })
    }

    fn close(self) -> Result<(), DatasetError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps written fields in memory and leaves an empty marker file on disk so
/// directory listings and renames behave as with a real store.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, Vec<Field>>>,
    fail_on: Option<String>,
}

impl MemoryStore {
    /// A store that refuses to write any path containing `pattern`.
    pub fn failing_on(pattern: &str) -> Self {
        MemoryStore {
            fail_on: Some(pattern.to_string()),
            ..Self::default()
        }
    }

    pub fn stored(&self, path: &Path) -> Option<Vec<Field>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

impl FieldStore for MemoryStore {
    fn write(&self, path: &Path, fields: &[Field]) -> Result<(), DatasetError> {
        if let Some(pattern) = &self.fail_on {
            if path.to_string_lossy().contains(pattern.as_str()) {
                return Err(DatasetError::InvalidData(format!("refusing to write {}", path.display())));
            }
        }

        fs::write(path, b"")?;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), fields.to_vec());

        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<Field>, DatasetError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| DatasetError::MissingVariable(path.display().to_string()))
    }

    fn persist(&self, from: &Path, to: &Path) -> Result<(), DatasetError> {
        fs::rename(from, to)?;
        let mut files = self.files.lock().unwrap();
        if let Some(fields) = files.remove(from) {
            files.insert(to.to_path_buf(), fields);
        }

        Ok(())
    }
}
