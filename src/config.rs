use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::constants;
use crate::formats::MediaFormat;

/// User preferences stored in `prefs.toml` under the platform config dir.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Fixed backend base URL; skips discovery when set.
  pub api_base: Option<String>,
  pub scheme: Option<String>,
  pub host: Option<String>,
  /// Port probed before the built-in candidates.
  pub port: Option<u16>,
  /// Location of a `server.json` document advertising the backend port.
  pub server_config_url: Option<String>,
  pub default_format: Option<String>,
}

pub fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "uvxytdlp")
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(&config_file) {
        return Self::parse(&content).unwrap_or_else(|e| {
          warn!(path = %config_file.display(), err = %e, "config: ignoring malformed prefs");
          Self::default()
        });
      }
    }
    Self::default()
  }

  pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  pub fn scheme(&self) -> &str {
    self.scheme.as_deref().unwrap_or(&constants().default_scheme)
  }

  pub fn host(&self) -> &str {
    self.host.as_deref().unwrap_or(&constants().default_host)
  }

  pub fn default_format(&self) -> MediaFormat {
    self.default_format.as_deref().and_then(MediaFormat::from_config).unwrap_or(MediaFormat::Mp4)
  }
}
