//! NetCDF backend: OPeNDAP reads through libnetcdf and CF-style NetCDF4 files.
//!
//! libnetcdf resolves `http(s)://` paths as DAP endpoints, so the same
//! `netcdf::open` serves remote datasets and local files.
//!
//! Remote variables are unpacked on read: `scale_factor`/`add_offset` are
//! applied and `_FillValue`/`missing_value` become `NaN`. Written files carry
//! their own `_FillValue` of `NaN`.

use std::{collections::BTreeMap, ops::Range, path::Path};

use ndarray::Array4;
use netcdf::AttributeValue;

use super::{DatasetError, DatasetHandle, Field, FieldStore, Hyperslab, RemoteSource};
use crate::{
    time::{encode_hours, RawTimeAxis, OUTPUT_CALENDAR, OUTPUT_TIME_UNITS},
    window::{DepthWindow, DomainWindow},
};

/// Attributes describing the packed remote encoding, not the values we keep.
const PACKING_ATTRIBUTES: [&str; 5] = [
    "_FillValue",
    "missing_value",
    "scale_factor",
    "add_offset",
    "_ChunkSizes",
];

const COORDINATES: [&str; 4] = ["time", "depth", "lat", "lon"];

// ============================================================================
// Remote datasets
// ============================================================================

/// Opens THREDDS/OPeNDAP endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpendapSource;

impl RemoteSource for OpendapSource {
    type Handle = OpendapHandle;

    fn open(
        &self,
        uri: &str,
        drop_variables: &[&str],
        domain: &DomainWindow,
    ) -> Result<OpendapHandle, DatasetError> {
        let file = netcdf::open(uri)?;

        let lat = read_coordinate(&file, "lat")?;
        let lon = read_coordinate(&file, "lon")?;
        let lat_range = domain.lat_indices(&lat);
        let lon_range = domain.lon_indices(&lon);

        Ok(OpendapHandle {
            file,
            uri: uri.to_string(),
            dropped: drop_variables.iter().map(|v| v.to_string()).collect(),
            lat: lat_range.map(|r| (r.clone(), lat[r].to_vec())),
            lon: lon_range.map(|r| (r.clone(), lon[r].to_vec())),
        })
    }
}

pub struct OpendapHandle {
    file: netcdf::File,
    uri: String,
    dropped: Vec<String>,
    lat: Option<(Range<usize>, Vec<f64>)>,
    lon: Option<(Range<usize>, Vec<f64>)>,
}

impl DatasetHandle for OpendapHandle {
    fn time_axis(&self) -> Result<RawTimeAxis, DatasetError> {
        let var = self
            .file
            .variable("time")
            .ok_or_else(|| DatasetError::MissingVariable(format!("time in {}", self.uri)))?;

        Ok(RawTimeAxis {
            values: var.get_values::<f64, _>(..)?,
            units: string_attribute(&var, "units"),
            calendar: string_attribute(&var, "calendar"),
        })
    }

    fn read(
        &self,
        variable: &str,
        time: Range<usize>,
        depth: &DepthWindow,
    ) -> Result<Hyperslab, DatasetError> {
        if self.dropped.iter().any(|v| v == variable) {
            return Err(DatasetError::MissingVariable(format!(
                "{} is excluded from {}",
                variable, self.uri
            )));
        }

        let var = self.file.variable(variable).ok_or_else(|| {
            DatasetError::MissingVariable(format!("{} in {}", variable, self.uri))
        })?;

        let (Some((lat_range, lat)), Some((lon_range, lon))) = (&self.lat, &self.lon) else {
            return Err(DatasetError::InvalidData(format!(
                "requested domain does not intersect the grid of {}",
                self.uri
            )));
        };

        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let nt = time.len();
        let (ny, nx) = (lat.len(), lon.len());

        let (depth_values, raw) = match dims.len() {
            4 => {
                let levels = read_coordinate(&self.file, &dims[1])?;
                let range = depth.indices(&levels).ok_or_else(|| {
                    DatasetError::InvalidData(format!(
                        "no depth levels of {} match {:?}",
                        variable, depth
                    ))
                })?;
                let raw = if nt == 0 {
                    Vec::new()
                } else {
                    var.get_values::<f32, _>((
                        time.clone(),
                        range.clone(),
                        lat_range.clone(),
                        lon_range.clone(),
                    ))?
                };
                (Some(levels[range].to_vec()), raw)
            }
            3 => {
                let raw = if nt == 0 {
                    Vec::new()
                } else {
                    var.get_values::<f32, _>((time.clone(), lat_range.clone(), lon_range.clone()))?
                };
                (None, raw)
            }
            n => {
                return Err(DatasetError::InvalidData(format!(
                    "{} has {} dimensions, expected (time, [depth,] lat, lon)",
                    variable, n
                )))
            }
        };

        let nz = depth_values.as_ref().map_or(1, |d| d.len());
        let values = unpack(&var, raw);
        let data = Array4::from_shape_vec((nt, nz, ny, nx), values)
            .map_err(|e| DatasetError::InvalidData(format!("{}: {}", variable, e)))?;

        Ok(Hyperslab {
            depth: depth_values,
            lat: lat.clone(),
            lon: lon.clone(),
            data,
            attributes: kept_attributes(&var),
        })
    }

    fn close(self) -> Result<(), DatasetError> {
        // libnetcdf closes the dataset when the handle is dropped.
        drop(self.file);
        Ok(())
    }
}

// ============================================================================
// Local files
// ============================================================================

/// Reads and writes CF-conventions NetCDF4 files.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfStore;

impl FieldStore for NetcdfStore {
    fn write(&self, path: &Path, fields: &[Field]) -> Result<(), DatasetError> {
        let first = fields
            .first()
            .ok_or_else(|| DatasetError::InvalidData(format!("no fields to write to {:?}", path)))?;

        if let Some(other) = fields
            .iter()
            .find(|f| f.time != first.time || f.lat != first.lat || f.lon != first.lon)
        {
            return Err(DatasetError::InvalidData(format!(
                "{} and {} do not share a time axis and grid",
                first.name, other.name
            )));
        }
        let depth = fields.iter().find_map(|f| f.depth.clone());
        if fields.iter().any(|f| f.depth.is_some() && f.depth != depth) {
            return Err(DatasetError::InvalidData(
                "fields have different depth levels".to_string(),
            ));
        }
        if first.lat.is_empty() || first.lon.is_empty() {
            return Err(DatasetError::InvalidData(format!(
                "{} has an empty horizontal grid",
                first.name
            )));
        }

        let mut file = netcdf::create(path)?;
        file.add_attribute("Conventions", "CF-1.8")?;
        file.add_attribute("source", "HYCOM ESPC-D-V02 daily means")?;

        let nt = first.time.len();
        file.add_unlimited_dimension("time")?;
        if let Some(levels) = &depth {
            file.add_dimension("depth", levels.len())?;
        }
        file.add_dimension("lat", first.lat.len())?;
        file.add_dimension("lon", first.lon.len())?;

        {
            let mut var = file.add_variable::<f64>("time", &["time"])?;
            var.put_attribute("standard_name", "time")?;
            var.put_attribute("units", OUTPUT_TIME_UNITS)?;
            var.put_attribute("calendar", OUTPUT_CALENDAR)?;
            if nt > 0 {
                var.put_values(&encode_hours(&first.time), (0..nt,))?;
            }
        }

        if let Some(levels) = &depth {
            let mut var = file.add_variable::<f64>("depth", &["depth"])?;
            var.put_attribute("standard_name", "depth")?;
            var.put_attribute("units", "m")?;
            var.put_attribute("positive", "down")?;
            var.put_values(levels, ..)?;
        }

        {
            let mut var = file.add_variable::<f64>("lat", &["lat"])?;
            var.put_attribute("standard_name", "latitude")?;
            var.put_attribute("units", "degrees_north")?;
            var.put_values(&first.lat, ..)?;
        }

        {
            let mut var = file.add_variable::<f64>("lon", &["lon"])?;
            var.put_attribute("standard_name", "longitude")?;
            var.put_attribute("units", "degrees_east")?;
            var.put_values(&first.lon, ..)?;
        }

        for field in fields {
            let dims: &[&str] = if field.depth.is_some() {
                &["time", "depth", "lat", "lon"]
            } else {
                &["time", "lat", "lon"]
            };

            let mut var = file.add_variable::<f32>(&field.name, dims)?;
            var.put_attribute("_FillValue", f32::NAN)?;
            for (name, value) in &field.attributes {
                var.put_attribute(name, value.as_str())?;
            }

            if nt == 0 {
                continue;
            }
            let values: Vec<f32> = field.data.iter().copied().collect();
            let (_, nz, ny, nx) = field.data.dim();
            if field.depth.is_some() {
                var.put_values(&values, (0..nt, 0..nz, 0..ny, 0..nx))?;
            } else {
                var.put_values(&values, (0..nt, 0..ny, 0..nx))?;
            }
        }

        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<Field>, DatasetError> {
        let file = netcdf::open(path)?;

        let time_var = file
            .variable("time")
            .ok_or_else(|| DatasetError::MissingVariable(format!("time in {:?}", path)))?;
        let time = RawTimeAxis {
            values: time_var.get_values::<f64, _>(..)?,
            units: string_attribute(&time_var, "units"),
            calendar: string_attribute(&time_var, "calendar"),
        }
        .decode()?;

        let lat = read_coordinate(&file, "lat")?;
        let lon = read_coordinate(&file, "lon")?;
        let depth = match file.variable("depth") {
            Some(var) => Some(var.get_values::<f64, _>(..)?),
            None => None,
        };

        let mut fields = Vec::new();
        for var in file.variables() {
            let name = var.name();
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            if COORDINATES.contains(&name.as_str()) || dims.first().map(String::as_str) != Some("time") {
                continue;
            }

            let field_depth = if dims.iter().any(|d| d == "depth") {
                depth.clone()
            } else {
                None
            };
            let nz = field_depth.as_ref().map_or(1, |d| d.len());
            let values = if time.is_empty() {
                Vec::new()
            } else {
                var.get_values::<f32, _>(..)?
            };
            let data = Array4::from_shape_vec((time.len(), nz, lat.len(), lon.len()), values)
                .map_err(|e| DatasetError::InvalidData(format!("{}: {}", name, e)))?;

            let mut field = Field::new(name, time.clone(), field_depth, lat.clone(), lon.clone(), data)?;
            field.attributes = kept_attributes(&var);
            fields.push(field);
        }

        Ok(fields)
    }
}

// -- Helpers -----------------------------------------------------------------

fn read_coordinate(file: &netcdf::File, name: &str) -> Result<Vec<f64>, DatasetError> {
    let var = file
        .variable(name)
        .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))?;

    Ok(var.get_values::<f64, _>(..)?)
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(s) => s.into_iter().next(),
        _ => None,
    }
}

fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    let value = match var.attribute(name)?.value().ok()? {
        AttributeValue::Schar(v) => v as f64,
        AttributeValue::Uchar(v) => v as f64,
        AttributeValue::Short(v) => v as f64,
        AttributeValue::Ushort(v) => v as f64,
        AttributeValue::Int(v) => v as f64,
        AttributeValue::Uint(v) => v as f64,
        AttributeValue::Longlong(v) => v as f64,
        AttributeValue::Ulonglong(v) => v as f64,
        AttributeValue::Float(v) => v as f64,
        AttributeValue::Double(v) => v,
        AttributeValue::Shorts(v) => *v.first()? as f64,
        AttributeValue::Floats(v) => *v.first()? as f64,
        AttributeValue::Doubles(v) => *v.first()?,
        _ => return None,
    };

    Some(value)
}

// String attributes worth carrying into output files.
fn kept_attributes(var: &netcdf::Variable) -> BTreeMap<String, String> {
    var.attributes()
        .filter(|a| !PACKING_ATTRIBUTES.contains(&a.name()))
        .filter_map(|a| match a.value().ok()? {
            AttributeValue::Str(s) => Some((a.name().to_string(), s)),
            _ => None,
        })
        .collect()
}

fn unpack(var: &netcdf::Variable, raw: Vec<f32>) -> Vec<f32> {
    let fill = numeric_attribute(var, "_FillValue");
    let missing = numeric_attribute(var, "missing_value");
    let scale = numeric_attribute(var, "scale_factor").unwrap_or(1.0);
    let offset = numeric_attribute(var, "add_offset").unwrap_or(0.0);

    raw.into_iter()
        .map(|v| {
            let value = v as f64;
            if v.is_nan() || fill == Some(value) || missing == Some(value) {
                f32::NAN
            } else {
                (value * scale + offset) as f32
            }
        })
        .collect()
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;

    fn field(name: &str, depth: Option<Vec<f64>>) -> Field {
        let time = (17..=19)
            .map(|d| NaiveDate::from_ymd_opt(2025, 7, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .collect();
        let nz = depth.as_ref().map_or(1, |d| d.len());
        let mut data = Array4::<f32>::from_elem((3, nz, 2, 3), 35.5);
        data[[1, 0, 1, 2]] = f32::NAN;

        let mut field =
            Field::new(name, time, depth, vec![-39.0, -38.0], vec![11.0, 12.0, 13.0], data).unwrap();
        field.attributes.insert("units".to_string(), "psu".to_string());
        field
    }

    #[test]
    fn should_read_back_what_was_written() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("HYCOM_20250718_00.nc");
        let written = vec![field("surf_el", None), field("salinity", Some(vec![0.0, 10.0]))];

        NetcdfStore.write(&path, &written).unwrap();
        let mut read = NetcdfStore.read(&path).unwrap();
        read.sort_by(|a, b| b.name.cmp(&a.name));

        assert_eq!(read.len(), 2);
        assert_eq!(read[0].name, "surf_el");
        assert_eq!(read[0].time, written[0].time);
        assert_eq!(read[0].depth, None);
        assert_eq!(read[1].depth, Some(vec![0.0, 10.0]));
        assert_eq!(read[1].data[[2, 1, 0, 0]], 35.5);
        assert!(read[1].data[[1, 0, 1, 2]].is_nan());
        assert_eq!(read[1].attributes.get("units").map(String::as_str), Some("psu"));
    }

    #[test]
    fn should_refuse_fields_on_different_grids() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("mixed.nc");
        let fields = vec![
            field("salinity", Some(vec![0.0, 10.0])),
            field("water_u", Some(vec![0.0])),
        ];

        assert!(NetcdfStore.write(&path, &fields).is_err());
    }
}
