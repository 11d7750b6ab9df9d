use serde::{Deserialize, Serialize};

const YOUTUBE_ORIGIN: &str = "https://www.youtube.com";

/// One hit from the backend's YouTube search (`GET /ytsearch/{query}`).
///
/// Every field is a display string as the backend scraped it; missing
/// fields come through empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeResult {
  pub id: String,
  pub title: String,
  pub thumbnails: Vec<String>,
  pub long_desc: String,
  pub channel: String,
  pub duration: String,
  pub views: String,
  pub publish_time: String,
  /// Path below youtube.com, e.g. `/watch?v=aqz-KE-bpKQ&pp=...`.
  pub url_suffix: String,
}

impl YoutubeResult {
  /// Full watch URL, ready to hand to `download`.
  pub fn watch_url(&self) -> String {
    if self.url_suffix.starts_with('/') {
      format!("{}{}", YOUTUBE_ORIGIN, self.url_suffix)
    } else {
      format!("{}/watch?v={}", YOUTUBE_ORIGIN, self.id)
    }
  }

  /// One listing line: duration, channel, title, then the URL on its own
  /// indented line.
  pub fn display_line(&self) -> String {
    let mut line = format!("{:>8}  {}", self.duration, self.title);
    if !self.channel.is_empty() {
      line.push_str(&format!(" ({})", self.channel));
    }
    let meta: Vec<&str> =
      [self.views.as_str(), self.publish_time.as_str()].into_iter().filter(|s| !s.is_empty()).collect();
    if !meta.is_empty() {
      line.push_str(&format!(" · {}", meta.join(", ")));
    }
    format!("{}\n          {}", line, self.watch_url())
  }
}
