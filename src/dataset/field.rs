//! In-memory gridded variable and the time-axis operations the pipeline needs.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use ndarray::{concatenate, Array4, ArrayView4, Axis, Zip};

use super::{DatasetError, Hyperslab};
use crate::window::TimeWindow;

/// One variable on a `(time, depth, lat, lon)` grid. Missing values are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub time: Vec<NaiveDateTime>,
    /// `None` for surface variables, whose depth axis has length one.
    pub depth: Option<Vec<f64>>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub data: Array4<f32>,
    pub attributes: BTreeMap<String, String>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        time: Vec<NaiveDateTime>,
        depth: Option<Vec<f64>>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        data: Array4<f32>,
    ) -> Result<Self, DatasetError> {
        let name = name.into();
        let nz = depth.as_ref().map_or(1, |d| d.len());
        let expected = (time.len(), nz, lat.len(), lon.len());

        if data.dim() != expected {
            return Err(DatasetError::InvalidData(format!(
                "{}: data shape {:?} does not match coordinates {:?}",
                name,
                data.dim(),
                expected
            )));
        }

        Ok(Field {
            name,
            time,
            depth,
            lat,
            lon,
            data,
            attributes: BTreeMap::new(),
        })
    }

    /// Labels a hyperslab with its time steps.
    pub fn from_slab(
        name: impl Into<String>,
        time: Vec<NaiveDateTime>,
        slab: Hyperslab,
    ) -> Result<Self, DatasetError> {
        let mut field = Field::new(name, time, slab.depth, slab.lat, slab.lon, slab.data)?;
        field.attributes = slab.attributes;

        Ok(field)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn same_grid(&self, other: &Field) -> bool {
        self.depth == other.depth && self.lat == other.lat && self.lon == other.lon
    }

    /// The same variable and grid with no time steps.
    pub fn empty_like(&self) -> Field {
        self.take(&[])
    }

    /// A single time step as a field of its own.
    pub fn timestep(&self, index: usize) -> Field {
        self.take(&[index])
    }

    /// Time steps inside `window`, in their current order.
    pub fn select_time(&self, window: &TimeWindow) -> Field {
        let rows: Vec<usize> = self
            .time
            .iter()
            .enumerate()
            .filter(|(_, t)| window.contains(t))
            .map(|(i, _)| i)
            .collect();

        self.take(&rows)
    }

    /// Daily means, one step per calendar day from the first to the last day
    /// present, labelled at midnight. `NaN`s are skipped; days without any
    /// valid value stay `NaN`.
    pub fn resample_daily(&self) -> Field {
        let (Some(first), Some(last)) = (self.time.iter().min(), self.time.iter().max()) else {
            return self.empty_like();
        };
        let first_day = first.date();
        let n_days = (last.date() - first_day).num_days() as usize + 1;
        let (_, nz, ny, nx) = self.data.dim();

        let mut sums = Array4::<f64>::zeros((n_days, nz, ny, nx));
        let mut counts = Array4::<u32>::zeros((n_days, nz, ny, nx));

        for (i, t) in self.time.iter().enumerate() {
            let day = (t.date() - first_day).num_days() as usize;
            Zip::from(sums.index_axis_mut(Axis(0), day))
                .and(counts.index_axis_mut(Axis(0), day))
                .and(self.data.index_axis(Axis(0), i))
                .for_each(|sum, count, &value| {
                    if !value.is_nan() {
                        *sum += value as f64;
                        *count += 1;
                    }
                });
        }

        let mut data = Array4::<f32>::from_elem((n_days, nz, ny, nx), f32::NAN);
        Zip::from(&mut data)
            .and(&sums)
            .and(&counts)
            .for_each(|mean, &sum, &count| {
                if count > 0 {
                    *mean = (sum / count as f64) as f32;
                }
            });

        let time = (0..n_days)
            .map(|d| (first_day + Duration::days(d as i64)).and_time(NaiveTime::default()))
            .collect();

        Field {
            time,
            data,
            ..self.empty_like()
        }
    }

    /// Joins `parts` along time, sorted ascending. Repeated timestamps keep
    /// their first occurrence.
    pub fn concat_sorted(parts: &[Field]) -> Result<Field, DatasetError> {
        let first = parts
            .first()
            .ok_or_else(|| DatasetError::InvalidData("nothing to concatenate".to_string()))?;

        if let Some(other) = parts
            .iter()
            .find(|p| p.name != first.name || !p.same_grid(first))
        {
            return Err(DatasetError::InvalidData(format!(
                "cannot concatenate `{}` with `{}` on a different grid",
                first.name, other.name
            )));
        }

        let views: Vec<ArrayView4<f32>> = parts.iter().map(|p| p.data.view()).collect();
        let data = concatenate(Axis(0), &views)
            .map_err(|e| DatasetError::InvalidData(format!("{}: {}", first.name, e)))?;
        let time: Vec<NaiveDateTime> = parts.iter().flat_map(|p| p.time.iter().copied()).collect();

        let joined = Field {
            time,
            data,
            ..first.empty_like()
        };

        let mut order: Vec<usize> = (0..joined.len()).collect();
        order.sort_by_key(|&i| joined.time[i]);
        order.dedup_by_key(|i| joined.time[*i]);

        Ok(joined.take(&order))
    }

    /// Appends a copy of the last time step one day after it.
    pub fn pad_last_day(&self) -> Field {
        let Some(last) = self.time.iter().max().copied() else {
            return self.clone();
        };
        let last_index = self.time.iter().position(|t| *t == last).unwrap_or(0);

        let mut time = self.time.clone();
        time.push(last + Duration::days(1));
        let tail = self.data.select(Axis(0), &[last_index]);
        let data = match concatenate(Axis(0), &[self.data.view(), tail.view()]) {
            Ok(data) => data,
            Err(_) => return self.clone(),
        };

        Field {
            time,
            data,
            ..self.empty_like()
        }
    }

    /// Places this field's time steps on `axis`. Steps of `axis` the field
    /// lacks are `NaN`; steps not on `axis` are dropped.
    pub fn reindex_time(&self, axis: &[NaiveDateTime]) -> Field {
        let (_, nz, ny, nx) = self.data.dim();
        let mut data = Array4::<f32>::from_elem((axis.len(), nz, ny, nx), f32::NAN);

        for (row, t) in axis.iter().enumerate() {
            if let Some(source) = self.time.iter().position(|own| own == t) {
                data.index_axis_mut(Axis(0), row)
                    .assign(&self.data.index_axis(Axis(0), source));
            }
        }

        Field {
            time: axis.to_vec(),
            data,
            ..self.empty_like()
        }
    }

    fn take(&self, rows: &[usize]) -> Field {
        Field {
            name: self.name.clone(),
            time: rows.iter().map(|&i| self.time[i]).collect(),
            depth: self.depth.clone(),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            data: self.data.select(Axis(0), rows),
            attributes: self.attributes.clone(),
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    // One value per time step, broadcast over a 1x2x2 grid.
    fn field(name: &str, time: Vec<NaiveDateTime>, values: &[f32]) -> Field {
        let mut data = Array4::<f32>::zeros((values.len(), 1, 2, 2));
        for (i, v) in values.iter().enumerate() {
            data.index_axis_mut(Axis(0), i).fill(*v);
        }
        Field::new(name, time, None, vec![-39.0, -38.0], vec![11.0, 12.0], data).unwrap()
    }

    #[test]
    fn should_reject_mismatched_shape() {
        let data = Array4::<f32>::zeros((2, 1, 2, 2));
        let result = Field::new("surf_el", vec![at(1, 0)], None, vec![0.0, 1.0], vec![0.0, 1.0], data);

        assert!(result.is_err());
    }

    #[test]
    fn should_resample_three_hourly_to_daily_means() {
        let time: Vec<_> = (0..16).map(|i| at(1 + i / 8, (i % 8) * 3)).collect();
        let values: Vec<f32> = (0..16).map(|i| if i < 8 { 1.0 } else { 3.0 + (i % 2) as f32 }).collect();
        let daily = field("salinity", time, &values).resample_daily();

        assert_eq!(daily.time, vec![at(1, 0), at(2, 0)]);
        assert_eq!(daily.data[[0, 0, 0, 0]], 1.0);
        assert_eq!(daily.data[[1, 0, 1, 1]], 3.5);
    }

    #[test]
    fn should_skip_nan_and_fill_gaps_when_resampling() {
        let time = vec![at(1, 0), at(1, 12), at(3, 0)];
        let daily = field("surf_el", time, &[f32::NAN, 2.0, 4.0]).resample_daily();

        assert_eq!(daily.time, vec![at(1, 0), at(2, 0), at(3, 0)]);
        assert_eq!(daily.data[[0, 0, 0, 0]], 2.0);
        assert!(daily.data[[1, 0, 0, 0]].is_nan());
        assert_eq!(daily.data[[2, 0, 0, 0]], 4.0);
    }

    #[test]
    fn should_resample_empty_field_to_empty() {
        let daily = field("surf_el", vec![], &[]).resample_daily();

        assert!(daily.is_empty());
        assert_eq!(daily.data.dim(), (0, 1, 2, 2));
    }

    #[test]
    fn should_concat_sorted_without_duplicates() {
        let parts = vec![
            field("water_u", vec![at(3, 0)], &[3.0]),
            field("water_u", vec![at(1, 0)], &[1.0]),
            field("water_u", vec![at(2, 0)], &[2.0]),
            field("water_u", vec![at(1, 0)], &[9.0]),
        ];
        let combined = Field::concat_sorted(&parts).unwrap();

        assert_eq!(combined.time, vec![at(1, 0), at(2, 0), at(3, 0)]);
        assert_eq!(combined.data[[0, 0, 0, 0]], 1.0);
        assert_eq!(combined.data[[2, 0, 1, 0]], 3.0);
    }

    #[test]
    fn should_refuse_to_concat_different_variables() {
        let parts = vec![
            field("water_u", vec![at(1, 0)], &[1.0]),
            field("water_v", vec![at(2, 0)], &[2.0]),
        ];

        assert!(Field::concat_sorted(&parts).is_err());
        assert!(Field::concat_sorted(&[]).is_err());
    }

    #[test]
    fn should_select_inside_window() {
        let time: Vec<_> = (1..=5).map(|d| at(d, 0)).collect();
        let window = TimeWindow {
            start: at(2, 0),
            end: at(4, 0),
        };
        let selected = field("salinity", time, &[1.0, 2.0, 3.0, 4.0, 5.0]).select_time(&window);

        assert_eq!(selected.time, vec![at(2, 0), at(3, 0), at(4, 0)]);
        assert_eq!(selected.data[[0, 0, 0, 0]], 2.0);
    }

    #[test]
    fn should_pad_last_day() {
        let padded = field("surf_el", vec![at(1, 0), at(2, 0)], &[1.0, 2.0]).pad_last_day();

        assert_eq!(padded.time, vec![at(1, 0), at(2, 0), at(3, 0)]);
        assert_eq!(padded.data[[2, 0, 1, 1]], 2.0);
    }

    #[test]
    fn should_fill_missing_days_with_nan_when_reindexing() {
        let source = field("salinity", vec![at(1, 0), at(3, 0)], &[1.0, 3.0]);
        let reindexed = source.reindex_time(&[at(1, 0), at(2, 0), at(3, 0)]);

        assert_eq!(reindexed.time, vec![at(1, 0), at(2, 0), at(3, 0)]);
        assert_eq!(reindexed.data[[0, 0, 0, 0]], 1.0);
        assert!(reindexed.data[[1, 0, 1, 1]].is_nan());
        assert_eq!(reindexed.data[[2, 0, 1, 0]], 3.0);
        assert!(reindexed.same_grid(&source));

        let empty = source.empty_like().reindex_time(&[at(1, 0)]);
        assert_eq!(empty.data.dim(), (1, 1, 2, 2));
        assert!(empty.data.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn should_split_single_timestep() {
        let source = field("surf_el", vec![at(1, 0), at(2, 0)], &[1.0, 2.0]);
        let step = source.timestep(1);

        assert_eq!(step.time, vec![at(2, 0)]);
        assert_eq!(step.data.dim(), (1, 1, 2, 2));
        assert!(step.same_grid(&source));
    }
}
