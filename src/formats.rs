use clap::ValueEnum;

/// Output container requested from the backend downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaFormat {
  Mp4,
  Mkv,
  M4a,
  Mp3,
}

impl MediaFormat {
  pub const ALL: [MediaFormat; 4] = [MediaFormat::Mp4, MediaFormat::Mkv, MediaFormat::M4a, MediaFormat::Mp3];

  pub fn label(self) -> &'static str {
    match self {
      MediaFormat::Mp4 => "mp4",
      MediaFormat::Mkv => "mkv",
      MediaFormat::M4a => "m4a",
      MediaFormat::Mp3 => "mp3",
    }
  }

  /// Downloader arguments sent alongside the URL. m4a is requested as aac.
  pub fn template(self) -> &'static str {
    match self {
      MediaFormat::Mp4 => "-t mp4",
      MediaFormat::Mkv => "-t mkv",
      MediaFormat::M4a => "-t aac",
      MediaFormat::Mp3 => "-t mp3",
    }
  }

  pub fn is_audio(self) -> bool {
    matches!(self, MediaFormat::M4a | MediaFormat::Mp3)
  }

  /// Parse a format name from the preferences file; unknown names yield `None`.
  pub fn from_config(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|f| f.label().eq_ignore_ascii_case(s.trim()))
  }
}

/// Only absolute http(s) URLs are handed to the downloader.
pub fn is_url_valid(url: &str) -> bool {
  url.starts_with("http://") || url.starts_with("https://")
}
