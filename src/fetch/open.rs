//! Opening remote datasets until they can be trusted.
//!
//! Right after a server-side catalog update, a lazily opened OPeNDAP dataset
//! can report a time axis that is undecodable or shorter than what is
//! published. Only a full reopen recovers from that, so every attempt starts
//! from scratch.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use super::FetchError;
use crate::{
    catalog::VariableSpec,
    config::FetchConfig,
    dataset::{DatasetError, DatasetHandle, RemoteSource},
    window::DomainWindow,
};

/// A handle whose time axis decoded and covers the expected number of steps.
pub struct ValidatedDataset<H> {
    pub handle: H,
    pub time: Vec<NaiveDateTime>,
}

/// Result of one open attempt.
pub enum AttemptOutcome<H> {
    OpenFailed(DatasetError),
    DecodeFailed(DatasetError),
    InsufficientCoverage { found: usize, required: usize },
    Ready(ValidatedDataset<H>),
}

impl<H> AttemptOutcome<H> {
    fn failure(&self) -> Option<String> {
        match self {
            AttemptOutcome::OpenFailed(e) => Some(format!("dataset open failed: {}", e)),
            AttemptOutcome::DecodeFailed(e) => Some(format!("time decoding failed: {}", e)),
            AttemptOutcome::InsufficientCoverage { found, required } => Some(format!(
                "incomplete time coverage: {} of {} time steps",
                found, required
            )),
            AttemptOutcome::Ready(_) => None,
        }
    }
}

/// Makes a single attempt at opening and validating `spec`'s dataset.
pub fn attempt_open<S: RemoteSource>(
    source: &S,
    spec: &VariableSpec,
    domain: &DomainWindow,
    drop_variables: &[&str],
) -> AttemptOutcome<S::Handle> {
    let handle = match source.open(&spec.remote_uri, drop_variables, domain) {
        Ok(handle) => handle,
        Err(e) => return AttemptOutcome::OpenFailed(e),
    };

    let time = match handle
        .time_axis()
        .and_then(|raw| raw.decode().map_err(DatasetError::from))
    {
        Ok(time) => time,
        Err(e) => {
            release(handle, spec);
            return AttemptOutcome::DecodeFailed(e);
        }
    };

    let found = time.iter().collect::<HashSet<_>>().len();
    let required = spec.cadence.min_steps();
    if found < required {
        release(handle, spec);
        return AttemptOutcome::InsufficientCoverage { found, required };
    }

    AttemptOutcome::Ready(ValidatedDataset { handle, time })
}

/// Retries [`attempt_open`] until it succeeds or `config.max_tries` attempts
/// have been spent. Every kind of failure counts against the same budget and
/// is retried immediately.
pub fn open_validated<S: RemoteSource>(
    source: &S,
    spec: &VariableSpec,
    domain: &DomainWindow,
    config: &FetchConfig,
    progress: &ProgressBar,
) -> Result<ValidatedDataset<S::Handle>, FetchError> {
    let drop_variables = config.drop_list();
    let mut last_failure = "no attempts made".to_string();

    for attempt in 1..=config.max_tries {
        progress.set_message(format!(
            "{}: opening dataset (try {}/{})",
            spec.variable_id, attempt, config.max_tries
        ));

        let outcome = attempt_open(source, spec, domain, &drop_variables);
        if let Some(failure) = outcome.failure() {
            warn!(variable = %spec.variable_id, attempt, "[Try {}] {}", attempt, failure);
            last_failure = failure;
            continue;
        }

        if let AttemptOutcome::Ready(dataset) = outcome {
            info!(
                variable = %spec.variable_id,
                attempt,
                steps = dataset.time.len(),
                "[Try {}] Decoded the times",
                attempt
            );
            return Ok(dataset);
        }
    }

    Err(FetchError::RetriesExhausted {
        variable: spec.variable_id.clone(),
        uri: spec.remote_uri.clone(),
        attempts: config.max_tries,
        last_failure,
    })
}

fn release<H: DatasetHandle>(handle: H, spec: &VariableSpec) {
    if let Err(e) = handle.close() {
        debug!(variable = %spec.variable_id, error = %e, "Failed to close dataset");
    }
}

// -- Tests -------------------------------------------------------------------
