//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! and parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Backend discovery
  pub backend_ports: Vec<u16>,
  pub default_scheme: String,
  pub default_host: String,
  pub health_check_path: String,
  pub probe_timeout_ms: u64,

  // Requests
  pub request_timeout_secs: u64,
  /// Download requests block until the downloader process exits.
  pub download_timeout_secs: u64,
  /// How many ranked names to offer when a file name doesn't match exactly.
  pub suggestion_count: usize,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.backend_ports, vec![5150, 5000, 8000, 4860]);
    assert_eq!(c.health_check_path, "/health");
    assert_eq!(c.probe_timeout_ms, 300);
    assert!(c.suggestion_count > 0);
  }
}
