use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::search::{DEFAULT_THRESHOLD, search};

/// A downloaded media file as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
  /// Filename, unique within the download directory.
  pub name: String,
  pub size: u64,
  #[serde(rename = "modifiedAt", alias = "mtime", with = "timestamp")]
  pub modified_at: NaiveDateTime,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Free-form, e.g. `12:34` or a number of seconds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<String>,
}

impl LibraryEntry {
  pub fn kind(&self) -> MediaKind {
    MediaKind::of(&self.name)
  }
}

/// Listing payload from `GET /downloaded`.
///
/// Older backends answer with a bare array; newer ones wrap it together with
/// per-file errors hit while scanning the download directory. Entries that
/// don't parse are reported in `errors` instead of failing the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
  pub files: Vec<LibraryEntry>,
  pub errors: Vec<String>,
}

impl Listing {
  fn from_raw(raw: Vec<serde_json::Value>, mut errors: Vec<String>) -> Self {
    let mut files = Vec::with_capacity(raw.len());
    for value in raw {
      let name = value.get("name").and_then(|n| n.as_str()).unwrap_or("<unnamed>").to_string();
      match serde_json::from_value::<LibraryEntry>(value) {
        Ok(entry) => files.push(entry),
        Err(e) => errors.push(format!("skipped entry '{}': {}", name, e)),
      }
    }
    Listing { files, errors }
  }
}

impl<'de> Deserialize<'de> for Listing {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Payload {
      Bare(Vec<serde_json::Value>),
      Wrapped {
        files: Vec<serde_json::Value>,
        #[serde(default)]
        errors: Vec<String>,
      },
    }

    Ok(match Payload::deserialize(deserializer)? {
      Payload::Bare(files) => Listing::from_raw(files, Vec::new()),
      Payload::Wrapped { files, errors } => Listing::from_raw(files, errors),
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Audio,
  Video,
}

impl MediaKind {
  /// Classify by file extension. Anything that is not a known audio
  /// container is treated as video.
  pub fn of(name: &str) -> Self {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()).unwrap_or_default();
    match ext.as_str() {
      "mp3" | "m4a" | "aac" => MediaKind::Audio,
      _ => MediaKind::Video,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      MediaKind::Audio => "audio",
      MediaKind::Video => "video",
    }
  }
}

/// In-memory snapshot of the download directory.
#[derive(Debug, Clone, Default)]
pub struct Library {
  entries: Vec<LibraryEntry>,
}

impl Library {
  pub fn new(entries: Vec<LibraryEntry>) -> Self {
    Self { entries }
  }

  pub fn entries(&self) -> &[LibraryEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, name: &str) -> Option<&LibraryEntry> {
    self.entries.iter().find(|e| e.name == name)
  }

  /// Drop an entry once the backend confirmed its deletion.
  pub fn remove(&mut self, name: &str) -> Option<LibraryEntry> {
    let idx = self.entries.iter().position(|e| e.name == name)?;
    Some(self.entries.remove(idx))
  }

  pub fn search(&self, query: &str) -> Vec<&LibraryEntry> {
    search(self.entries(), query, DEFAULT_THRESHOLD)
  }
}

impl From<Listing> for Library {
  fn from(listing: Listing) -> Self {
    Self::new(listing.files)
  }
}

/// Human-readable byte count using binary units.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Timestamps as the backend writes them: Python `isoformat()` output
/// without an offset, RFC 3339, a bare date, or a Unix epoch number.
mod timestamp {
  use super::*;
  use serde::{Deserializer, Serializer, de::Error};

  const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

  /// Epoch values above this are taken as milliseconds (year 5138 in seconds).
  const MILLIS_CUTOFF: f64 = 1e11;

  pub fn parse(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
      return Some(dt.naive_utc());
    }
    NAIVE_FORMATS
      .iter()
      .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
      .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
  }

  /// Unix epoch in seconds or milliseconds, as UTC.
  pub fn from_epoch(value: f64) -> Option<NaiveDateTime> {
    if !value.is_finite() {
      return None;
    }
    let millis = if value.abs() > MILLIS_CUTOFF { value } else { value * 1000.0 };
    DateTime::from_timestamp_millis(millis.round() as i64).map(|dt| dt.naive_utc())
  }

  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Text(String),
    Number(f64),
  }

  pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    match Raw::deserialize(deserializer)? {
      Raw::Text(raw) => parse(&raw).ok_or_else(|| D::Error::custom(format!("unrecognized timestamp: {}", raw))),
      Raw::Number(n) => from_epoch(n).ok_or_else(|| D::Error::custom(format!("epoch out of range: {}", n))),
    }
  }
}
