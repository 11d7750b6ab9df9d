use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::constants::constants;
use crate::formats::MediaFormat;
use crate::library::{Library, LibraryEntry, format_size};

// --- Helpers ---

/// One listing line: kind, size, modification time, name.
pub fn format_entry_line(entry: &LibraryEntry) -> String {
  let mut line = format!(
    "{:<5}  {:>10}  {}  {}",
    entry.kind().label(),
    format_size(entry.size),
    entry.modified_at.format("%Y-%m-%d %H:%M"),
    entry.name
  );
  if let Some(duration) = &entry.duration {
    line.push_str(&format!("  [{}]", duration));
  }
  line
}

/// Look up `name` exactly. When it isn't there, fail with the closest ranked
/// names so a typo can be corrected without listing everything.
pub fn resolve_name<'a>(library: &'a Library, name: &str) -> Result<&'a LibraryEntry> {
  if let Some(entry) = library.get(name) {
    return Ok(entry);
  }
  let suggestions: Vec<&str> =
    library.search(name).into_iter().take(constants().suggestion_count).map(|e| e.name.as_str()).collect();
  if suggestions.is_empty() {
    bail!("No downloaded file named '{}'", name);
  }
  bail!("No downloaded file named '{}'. Did you mean:\n  {}", name, suggestions.join("\n  "))
}

async fn fetch_library(backend: &Backend) -> Result<Library> {
  let listing = backend.list().await?;
  for error in &listing.errors {
    warn!(error = %error, "library: backend reported a listing error");
  }
  Ok(Library::from(listing))
}

// --- Commands ---

pub fn probe(backend: &Backend) {
  println!("{}", backend.base());
}

pub async fn library(backend: &Backend, query: &str, json: bool) -> Result<()> {
  let library = fetch_library(backend).await?;
  let results = library.search(query);
  info!(query = %query, total = library.len(), matched = results.len(), "library: search");

  if json {
    println!("{}", serde_json::to_string_pretty(&results)?);
    return Ok(());
  }
  if library.is_empty() {
    println!("No downloaded files.");
  } else if results.is_empty() {
    println!("No matches for '{}'.", query.trim());
  }
  for entry in results {
    println!("{}", format_entry_line(entry));
  }
  Ok(())
}

pub async fn download(backend: &Backend, url: &str, format: MediaFormat) -> Result<()> {
  let kind = if format.is_audio() { "audio" } else { "video" };
  eprintln!("Downloading {} as {} ({})…", url, format.label(), kind);
  let summary = backend.download(url, format, |line| println!("{}", line)).await?;
  if summary.lines == 0 {
    eprintln!("The backend finished without any output.");
  }
  Ok(())
}

/// Delete `name` on the backend and drop it from `library`. Returns the
/// backend's confirmation message.
pub async fn delete_entry(backend: &Backend, library: &mut Library, name: &str) -> Result<String> {
  let name = resolve_name(library, name)?.name.clone();
  let message = backend.delete(&name).await?;
  library.remove(&name);
  info!(name = %name, remaining = library.len(), "library: removed entry");
  Ok(message)
}

pub async fn delete(backend: &Backend, name: &str) -> Result<()> {
  let mut library = fetch_library(backend).await?;
  let message = delete_entry(backend, &mut library, name).await?;
  println!("{}", message);
  println!("{} file(s) left.", library.len());
  Ok(())
}

pub async fn fetch(backend: &Backend, name: &str, output: Option<PathBuf>) -> Result<()> {
  let library = fetch_library(backend).await?;
  let entry = resolve_name(&library, name)?;

  let dest = output.unwrap_or_else(|| PathBuf::from(&entry.name));
  let written = backend.fetch(&entry.name, &dest).await?;
  println!("Saved {} ({}) to {}", entry.name, format_size(written), dest.display());
  Ok(())
}

pub async fn search(backend: &Backend, query: &str) -> Result<()> {
  let results = backend.youtube_search(query).await?;
  if results.is_empty() {
    println!("No YouTube results for '{}'.", query.trim());
  }
  for result in &results {
    println!("{}", result.display_line());
  }
  Ok(())
}

/// Print the backend's cookies, or replace them with the contents of `set`.
pub async fn cookies(backend: &Backend, set: Option<&Path>) -> Result<()> {
  match set {
    Some(path) => {
      let cookies =
        tokio::fs::read_to_string(path).await.with_context(|| format!("Failed to read {}", path.display()))?;
      backend.set_cookies(&cookies).await?;
      println!("Saved cookies from {} to the backend.", path.display());
    }
    None => match backend.cookies().await? {
      Some(cookies) => print!("{}", cookies),
      None => eprintln!("The backend has no cookies stored."),
    },
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{requests, serve};
  use chrono::NaiveDate;

  fn entry(name: &str, day: u32) -> LibraryEntry {
    LibraryEntry {
      name: name.to_string(),
      size: 5 * 1024 * 1024,
      modified_at: NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(14, 5, 0).unwrap(),
      title: None,
      description: None,
      duration: None,
    }
  }

  // --- format_entry_line ---

  #[test]
  fn entry_line_layout() {
    let line = format_entry_line(&entry("Big Buck Bunny.mp4", 9));
    assert_eq!(line, "video     5.0 MiB  2024-03-09 14:05  Big Buck Bunny.mp4");
  }

  #[test]
  fn entry_line_includes_duration() {
    let mut e = entry("Song.mp3", 1);
    e.duration = Some("3:41".to_string());
    let line = format_entry_line(&e);
    assert!(line.starts_with("audio"));
    assert!(line.ends_with("Song.mp3  [3:41]"));
  }

  // --- resolve_name ---

  #[test]
  fn resolve_exact_name() {
    let library = Library::new(vec![entry("Interstellar.mp4", 1), entry("Big Buck Bunny.mp4", 2)]);
    assert_eq!(resolve_name(&library, "Interstellar.mp4").unwrap().name, "Interstellar.mp4");
  }

  #[test]
  fn resolve_suggests_close_names() {
    let library = Library::new(vec![entry("Interstellar.mp4", 1), entry("Big Buck Bunny.mp4", 2)]);
    let err = resolve_name(&library, "interstellar").unwrap_err().to_string();
    assert!(err.contains("Did you mean"));
    assert!(err.contains("Interstellar.mp4"));
  }

  #[test]
  fn resolve_without_suggestions() {
    let library = Library::new(vec![entry("Interstellar.mp4", 1)]);
    let err = resolve_name(&library, "documentary").unwrap_err().to_string();
    assert_eq!(err, "No downloaded file named 'documentary'");
  }

  // --- delete_entry ---

  #[tokio::test]
  async fn delete_entry_updates_library() {
    let (port, seen) = serve(|_| (200, r#"{"message": "File deleted."}"#.to_string())).await;
    let backend = Backend::new(reqwest::Client::new(), format!("http://127.0.0.1:{}", port));
    let mut library = Library::new(vec![entry("Interstellar.mp4", 1), entry("Big Buck Bunny.mp4", 2)]);

    let message = delete_entry(&backend, &mut library, "Interstellar.mp4").await.unwrap();
    assert_eq!(message, "File deleted.");
    assert_eq!(library.len(), 1);
    assert!(library.get("Interstellar.mp4").is_none());
    assert_eq!(requests(&seen)[0].path, "/downloaded/Interstellar.mp4");
  }

  #[tokio::test]
  async fn delete_entry_keeps_library_on_failure() {
    let (port, _) = serve(|_| (500, r#"{"detail": "Permission denied"}"#.to_string())).await;
    let backend = Backend::new(reqwest::Client::new(), format!("http://127.0.0.1:{}", port));
    let mut library = Library::new(vec![entry("Interstellar.mp4", 1)]);

    let err = delete_entry(&backend, &mut library, "Interstellar.mp4").await.unwrap_err();
    assert!(err.to_string().contains("Permission denied"));
    assert_eq!(library.len(), 1);
  }

  #[tokio::test]
  async fn delete_entry_needs_exact_name() {
    let (port, seen) = serve(|_| (200, "{}".to_string())).await;
    let backend = Backend::new(reqwest::Client::new(), format!("http://127.0.0.1:{}", port));
    let mut library = Library::new(vec![entry("Interstellar.mp4", 1)]);

    assert!(delete_entry(&backend, &mut library, "interstellar").await.is_err());
    assert!(requests(&seen).is_empty());
    assert_eq!(library.len(), 1);
  }

  // --- cookies ---

  #[tokio::test]
  async fn cookies_set_uploads_file_contents() {
    let (port, seen) = serve(|_| (200, "{}".to_string())).await;
    let backend = Backend::new(reqwest::Client::new(), format!("http://127.0.0.1:{}", port));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cookies.txt");
    std::fs::write(&path, "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tabc\n").unwrap();

    cookies(&backend, Some(&path)).await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&requests(&seen)[0].body).unwrap();
    assert!(body["cookies"].as_str().unwrap().contains("\tSID\tabc"));
  }

  #[tokio::test]
  async fn cookies_set_reports_missing_file() {
    let (port, seen) = serve(|_| (200, "{}".to_string())).await;
    let backend = Backend::new(reqwest::Client::new(), format!("http://127.0.0.1:{}", port));
    let dir = tempfile::tempdir().unwrap();

    let err = cookies(&backend, Some(&dir.path().join("missing.txt"))).await.unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
    assert!(requests(&seen).is_empty());
  }
}
