pub mod hycom;

use std::{path::PathBuf, time::Duration};

pub use hycom::download_hycom;

/// Where output goes when no directory is given.
pub fn default_savedir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Formats a duration as `H:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();

    format!("{}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(192_600)), "0:03:12");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 61)), "3:01:01");
    }
}
