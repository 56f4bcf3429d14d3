//! A complete forecast run: fetch every variable, then merge them into one
//! file named after the run date.

pub mod dispatch;
pub mod merge;

use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use indicatif::MultiProgress;
use tokio::task;
use tracing::info;

use crate::{
    catalog::{build_catalog, run_file_name},
    cli::create_spinner,
    config::FetchConfig,
    dataset::{FieldStore, RemoteSource},
    fetch::{download_variable, FetchError, FetchRequest},
    window::{DepthWindow, DomainWindow, TimeWindow},
};

pub use dispatch::{dispatch, DispatchPolicy, Job};
pub use merge::write_run_file;

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub domain: DomainWindow,
    pub depths: DepthWindow,
    pub run_date: NaiveDateTime,
    pub hdays: f64,
    pub fdays: f64,
    pub output_dir: PathBuf,
    pub variables: Vec<String>,
    /// Reach one day further back and repeat the last day one day forward.
    pub pad: bool,
    pub dispatch: DispatchPolicy,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub path: PathBuf,
    pub variable_files: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl RunRequest {
    pub fn time_window(&self) -> Result<TimeWindow> {
        let window = TimeWindow::for_run(self.run_date, self.hdays, self.fdays)?;

        Ok(if self.pad { window.extend_start() } else { window })
    }
}

/// Fetches every requested variable and merges them into
/// `HYCOM_<YYYYMMDD>_<HH>.nc` in the output directory.
///
/// Any variable failing fails the run, and an existing merged file is then
/// left as it was.
pub async fn download_hycom<S, F>(
    source: Arc<S>,
    store: Arc<F>,
    request: &RunRequest,
    config: &FetchConfig,
) -> Result<RunOutcome>
where
    S: RemoteSource + 'static,
    F: FieldStore + 'static,
{
    let started = Instant::now();
    let window = request.time_window()?;
    let specs = build_catalog(&request.variables, &request.run_date)?;

    fs::create_dir_all(&request.output_dir).with_context(|| {
        format!("Failed to create output directory {}", request.output_dir.display())
    })?;
    info!(
        start = %window.start,
        end = %window.end,
        variables = specs.len(),
        "Downloading HYCOM run {}",
        request.run_date
    );

    let fetch = FetchRequest {
        domain: request.domain,
        depths: request.depths,
        window,
        output_dir: request.output_dir.clone(),
    };
    let bars = MultiProgress::new();

    let jobs: Vec<Job<PathBuf, FetchError>> = specs
        .into_iter()
        .map(|spec| {
            let source = Arc::clone(&source);
            let store = Arc::clone(&store);
            let fetch = fetch.clone();
            let config = config.clone();
            let bar = bars.add(create_spinner(format!("{}: waiting", spec.variable_id)));

            Box::new(move || {
                download_variable(source.as_ref(), store.as_ref(), &spec, &fetch, &config, &bar)
            }) as Job<PathBuf, FetchError>
        })
        .collect();

    let variable_files = dispatch(request.dispatch, jobs)
        .await
        .context("Failed to download HYCOM variables")?;

    let outfile = request.output_dir.join(run_file_name(&request.run_date));
    let merge_store = Arc::clone(&store);
    let merge_files = variable_files.clone();
    let pad = request.pad;
    let path = task::spawn_blocking(move || {
        write_run_file(merge_store.as_ref(), &merge_files, &outfile, pad)
    })
    .await?
    .context("Failed to merge HYCOM variables")?;

    Ok(RunOutcome {
        path,
        variable_files,
        elapsed: started.elapsed(),
    })
}

// -- Tests -------------------------------------------------------------------
