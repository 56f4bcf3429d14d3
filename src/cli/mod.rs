//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use chrono::NaiveDateTime;
use clap::{command, ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    catalog::DEFAULT_VARIABLES,
    config::{DEFAULT_MAX_TRIES, DEFAULT_STAGGER},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a HYCOM forecast run and merge its variables into one file
    #[command(name = "download-hycom", alias = "download_hycom")]
    DownloadHycom(HycomArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HycomArgs {
    /// Variables to download, comma separated
    #[arg(long, value_delimiter = ',', default_values = DEFAULT_VARIABLES)]
    pub variables: Vec<String>,

    /// Domain as lon_min,lon_max,lat_min,lat_max
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values_t = [10.0, 25.0, -40.0, -25.0]
    )]
    pub domain: Vec<f64>,

    /// Depth range as min,max in metres, or a single level
    #[arg(long, value_delimiter = ',', default_values_t = [0.0, 5000.0])]
    pub depths: Vec<f64>,

    /// Run date as "YYYY-MM-DD HH:MM:SS"
    #[arg(long = "run-date", alias = "run_date", value_parser = parse_datetime)]
    pub run_date: NaiveDateTime,

    /// Hindcast days before the run date
    #[arg(long, default_value_t = 5.0)]
    pub hdays: f64,

    /// Forecast days after the run date
    #[arg(long, default_value_t = 5.0)]
    pub fdays: f64,

    /// Output directory, defaults to the home directory
    #[arg(long)]
    pub savedir: Option<PathBuf>,

    /// Reach one extra day back and repeat the last day (true/false)
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    pub pad: bool,

    /// Fetch variables concurrently (true/false)
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    pub parallel: bool,

    /// Attempts at opening each remote dataset
    #[arg(long = "max-tries", default_value_t = DEFAULT_MAX_TRIES)]
    pub max_tries: u32,

    /// Seconds between concurrent launches
    #[arg(long = "stagger-secs", default_value_t = DEFAULT_STAGGER.as_secs_f64())]
    pub stagger_secs: f64,
}

/// Parses "YYYY-MM-DD HH:MM:SS", or a bare date meaning midnight.
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::default()))
        })
        .map_err(|_| format!("`{}` is not a date of the form YYYY-MM-DD HH:MM:SS", value))
}

pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => Err(format!("`{}` is not true or false", value)),
    }
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Style for bars with a known length.
pub fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

// -- Tests -------------------------------------------------------------------
