//! Spatial, vertical and temporal windows a run is restricted to.

use std::ops::Range;

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDateTime};

/// Longitude/latitude bounds in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainWindow {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl DomainWindow {
    /// Builds a window from `[lon_min, lon_max, lat_min, lat_max]`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let [lon_min, lon_max, lat_min, lat_max] = values else {
            return Err(anyhow!(
                "Expected 4 domain values (lon_min,lon_max,lat_min,lat_max), got {}",
                values.len()
            ));
        };

        if lon_min >= lon_max || lat_min >= lat_max {
            return Err(anyhow!(
                "Domain bounds must be increasing, got lon {}..{} lat {}..{}",
                lon_min,
                lon_max,
                lat_min,
                lat_max
            ));
        }

        Ok(DomainWindow {
            lon_min: *lon_min,
            lon_max: *lon_max,
            lat_min: *lat_min,
            lat_max: *lat_max,
        })
    }

    pub fn lat_indices(&self, lat: &[f64]) -> Option<Range<usize>> {
        index_range(lat, |v| v >= self.lat_min && v <= self.lat_max)
    }

    /// Longitudes of grids stored as 0..360 are matched against the window
    /// shifted into the same convention.
    pub fn lon_indices(&self, lon: &[f64]) -> Option<Range<usize>> {
        let (mut lo, mut hi) = (self.lon_min, self.lon_max);
        if lon.iter().any(|&v| v > 180.0) {
            if lo < 0.0 {
                lo += 360.0;
            }
            if hi < 0.0 {
                hi += 360.0;
            }
        }
        if lo > hi {
            return None;
        }

        index_range(lon, |v| v >= lo && v <= hi)
    }
}

/// Depth selection, positive down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthWindow {
    Range { min_depth: f64, max_depth: f64 },
    Level(f64),
}

impl DepthWindow {
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.iter().any(|&d| d < 0.0 || !d.is_finite()) {
            return Err(anyhow!("Depths must be positive down, got {:?}", values));
        }

        match values {
            [depth] => Ok(DepthWindow::Level(*depth)),
            [a, b] => Ok(DepthWindow::Range {
                min_depth: a.min(*b),
                max_depth: a.max(*b),
            }),
            _ => Err(anyhow!("Expected 1 or 2 depth values, got {}", values.len())),
        }
    }

    /// Levels of `depth` that fall in the window. A single level selects the
    /// nearest one.
    pub fn indices(&self, depth: &[f64]) -> Option<Range<usize>> {
        match *self {
            DepthWindow::Range {
                min_depth,
                max_depth,
            } => index_range(depth, |d| d >= min_depth && d <= max_depth),
            DepthWindow::Level(level) => depth
                .iter()
                .enumerate()
                .filter(|(_, d)| d.is_finite())
                .min_by(|(_, a), (_, b)| (*a - level).abs().total_cmp(&(*b - level).abs()))
                .map(|(i, _)| i..i + 1),
        }
    }
}

impl Default for DepthWindow {
    fn default() -> Self {
        DepthWindow::Range {
            min_depth: 0.0,
            max_depth: 5000.0,
        }
    }
}

/// Inclusive time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Window for a run: one extra day on each side of the hindcast and
    /// forecast periods so the forcing never runs short at its edges.
    pub fn for_run(run_date: NaiveDateTime, hdays: f64, fdays: f64) -> Result<Self> {
        if !(hdays >= 0.0 && fdays >= 0.0) {
            return Err(anyhow!(
                "Hindcast and forecast days must be non-negative, got {} and {}",
                hdays,
                fdays
            ));
        }

        let start = run_date
            .checked_sub_signed(days(hdays + 1.0)?)
            .ok_or_else(|| anyhow!("Hindcast of {} days is out of range", hdays))?;
        let end = run_date
            .checked_add_signed(days(fdays + 1.0)?)
            .ok_or_else(|| anyhow!("Forecast of {} days is out of range", fdays))?;

        Ok(TimeWindow { start, end })
    }

    /// Moves the start back one more day.
    pub fn extend_start(self) -> Self {
        TimeWindow {
            start: self.start - Duration::days(1),
            end: self.end,
        }
    }

    pub fn contains(&self, t: &NaiveDateTime) -> bool {
        *t >= self.start && *t <= self.end
    }

    pub fn indices(&self, times: &[NaiveDateTime]) -> Option<Range<usize>> {
        let first = times.iter().position(|t| self.contains(t))?;
        let last = times.iter().rposition(|t| self.contains(t))?;

        Some(first..last + 1)
    }
}

fn days(value: f64) -> Result<Duration> {
    if !value.is_finite() {
        return Err(anyhow!("{} days is out of range", value));
    }

    Duration::try_seconds((value * 86_400.0).round() as i64)
        .ok_or_else(|| anyhow!("{} days is out of range", value))
}

// Coordinates are monotonic, so the matching values form one contiguous run.
fn index_range(values: &[f64], keep: impl Fn(f64) -> bool) -> Option<Range<usize>> {
    let first = values.iter().position(|&v| keep(v))?;
    let last = values.iter().rposition(|&v| keep(v))?;

    Some(first..last + 1)
}

// -- Tests -------------------------------------------------------------------
