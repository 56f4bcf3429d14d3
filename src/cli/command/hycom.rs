use std::time::Duration;

use anyhow::{anyhow, Result};

use super::{default_savedir, format_elapsed};
use crate::{
    cli::HycomArgs,
    config::FetchConfig,
    run::{DispatchPolicy, RunRequest},
    window::{DepthWindow, DomainWindow},
};

pub async fn download_hycom(args: &HycomArgs) -> Result<String> {
    let (request, config) = build_request(args)?;
    let outcome = run(&request, &config).await?;

    println!("Files downloaded in {}", format_elapsed(outcome.elapsed));

    Ok(outcome.path.to_string_lossy().to_string())
}

/// Turns parsed arguments into a run request and fetch settings.
pub fn build_request(args: &HycomArgs) -> Result<(RunRequest, FetchConfig)> {
    if !(args.stagger_secs >= 0.0 && args.stagger_secs.is_finite()) {
        return Err(anyhow!("--stagger-secs must be a non-negative number"));
    }
    if args.max_tries == 0 {
        return Err(anyhow!("--max-tries must be at least 1"));
    }

    let config = FetchConfig::default()
        .with_max_tries(args.max_tries)
        .with_stagger(Duration::from_secs_f64(args.stagger_secs));

    let request = RunRequest {
        domain: DomainWindow::from_slice(&args.domain)?,
        depths: DepthWindow::from_slice(&args.depths)?,
        run_date: args.run_date,
        hdays: args.hdays,
        fdays: args.fdays,
        output_dir: args.savedir.clone().unwrap_or_else(default_savedir),
        variables: args.variables.clone(),
        pad: args.pad,
        dispatch: DispatchPolicy::from_flags(args.parallel, config.stagger),
    };

    Ok((request, config))
}

#[cfg(feature = "netcdf")]
async fn run(request: &RunRequest, config: &FetchConfig) -> Result<crate::run::RunOutcome> {
    use std::sync::Arc;

    use crate::dataset::netcdf_io::{NetcdfStore, OpendapSource};

    crate::run::download_hycom(Arc::new(OpendapSource), Arc::new(NetcdfStore), request, config).await
}

#[cfg(not(feature = "netcdf"))]
async fn run(_request: &RunRequest, _config: &FetchConfig) -> Result<crate::run::RunOutcome> {
    Err(anyhow!(
        "NetCDF support is not compiled in, rebuild with `--features netcdf`"
    ))
}

// -- Tests -------------------------------------------------------------------
