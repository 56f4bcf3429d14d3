//! Tunables for fetching, with the defaults used operationally.

use std::time::Duration;

use crate::catalog::DROP_VARIABLES;

pub const DEFAULT_MAX_TRIES: u32 = 100;
pub const DEFAULT_STAGGER: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Opens attempted per variable before giving up.
    pub max_tries: u32,
    /// Gap between worker launches in concurrent mode.
    pub stagger: Duration,
    /// Remote variables that are never read.
    pub drop_variables: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            stagger: DEFAULT_STAGGER,
            drop_variables: DROP_VARIABLES.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl FetchConfig {
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub fn drop_list(&self) -> Vec<&str> {
        self.drop_variables.iter().map(String::as_str).collect()
    }
}

// -- Tests -------------------------------------------------------------------
