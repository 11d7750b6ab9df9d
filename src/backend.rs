//! HTTP client for the download backend.
//!
//! The backend wraps yt-dlp behind a small JSON API: `/health`, a listing at
//! `/downloaded`, per-file `GET`/`DELETE` at `/downloaded/{name}`, download
//! requests at `POST /ytdlp` (answered with a streamed log), YouTube search
//! at `/ytsearch/{query}` and the shared cookie jar at `/ytcookies`.

use anyhow::{Context, Result, anyhow, bail};
use futures::StreamExt;
use regex::Regex;
use reqwest::{Client, Method, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::formats::{MediaFormat, is_url_valid};
use crate::library::Listing;
use crate::youtube::YoutubeResult;

const LISTING_PATH: &str = "/downloaded";
const DOWNLOAD_PATH: &str = "/ytdlp";
const SEARCH_PATH: &str = "/ytsearch";
const COOKIES_PATH: &str = "/ytcookies";

/// Where and how to look for a running backend.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
  pub scheme: String,
  pub host: String,
  pub ports: Vec<u16>,
  pub preferred_port: Option<u16>,
  pub server_config_url: Option<String>,
  pub health_check_path: String,
  pub probe_timeout: Duration,
}

impl DiscoveryOptions {
  pub fn from_config(config: &Config) -> Self {
    let c = constants();
    Self {
      scheme: config.scheme().to_string(),
      host: config.host().to_string(),
      ports: c.backend_ports.clone(),
      preferred_port: config.port,
      server_config_url: config.server_config_url.clone(),
      health_check_path: c.health_check_path.clone(),
      probe_timeout: Duration::from_millis(c.probe_timeout_ms),
    }
  }
}

/// Order in which ports are probed: an advertised port first, then the
/// preferred one, then the built-in candidates. Duplicates keep their
/// original position.
pub fn candidate_ports(defaults: &[u16], preferred: Option<u16>, advertised: Option<u16>) -> Vec<u16> {
  let mut ports = defaults.to_vec();
  for port in [preferred, advertised].into_iter().flatten() {
    if !ports.contains(&port) {
      ports.insert(0, port);
    }
  }
  ports
}

#[derive(Deserialize)]
struct ServerConfig {
  port: Option<u16>,
}

/// Read the port advertised by a `server.json` document, if any.
async fn fetch_advertised_port(client: &Client, url: &str) -> Option<u16> {
  let response = match client.get(url).send().await {
    Ok(r) if r.status().is_success() => r,
    Ok(r) => {
      info!(url = %url, status = %r.status(), "probe: no server config, using default ports");
      return None;
    }
    Err(e) => {
      info!(url = %url, err = %e, "probe: server config unreachable, using default ports");
      return None;
    }
  };
  match response.json::<ServerConfig>().await {
    Ok(config) => config.port,
    Err(e) => {
      warn!(url = %url, err = %e, "probe: server config is malformed, using default ports");
      None
    }
  }
}

async fn probe(client: &Client, url: &str, method: Method, timeout: Duration) -> bool {
  match client.request(method.clone(), url).timeout(timeout).send().await {
    Ok(r) => {
      debug!(url = %url, method = %method, status = %r.status(), "probe: response");
      r.status().is_success()
    }
    Err(e) => {
      debug!(url = %url, method = %method, err = %e, "probe: failed");
      false
    }
  }
}

/// Find a live backend by health-checking each candidate port in turn.
///
/// Each port gets a `HEAD` and, failing that, a `GET`. Returns the base URL
/// (no trailing slash) of the first port that answers with a success status.
pub async fn discover(client: &Client, options: &DiscoveryOptions) -> Result<String> {
  let advertised = match &options.server_config_url {
    Some(url) => fetch_advertised_port(client, url).await,
    None => None,
  };
  let ports = candidate_ports(&options.ports, options.preferred_port, advertised);
  info!(host = %options.host, ports = ?ports, "probe: looking for backend");

  for port in ports {
    let base = format!("{}://{}:{}", options.scheme, options.host, port);
    let health = join_url(&base, &options.health_check_path);
    if probe(client, &health, Method::HEAD, options.probe_timeout).await
      || probe(client, &health, Method::GET, options.probe_timeout).await
    {
      info!(base = %base, "probe: backend found");
      return Ok(base);
    }
  }

  Err(anyhow!("Cannot connect to backend service on {}. Please check URL or backend status.", options.host))
}

/// Shared HTTP client. Only connecting is bounded here; each request sets
/// its own overall timeout, and file fetches run unbounded.
pub fn http_client() -> Result<Client> {
  Client::builder()
    .connect_timeout(request_timeout())
    .user_agent(concat!("uvxytdlp/", env!("CARGO_PKG_VERSION")))
    .build()
    .context("Failed to build HTTP client")
}

fn request_timeout() -> Duration {
  Duration::from_secs(constants().request_timeout_secs)
}

/// Join a base URL and an API path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
  let base = base.trim_end_matches('/');
  if path.starts_with('/') { format!("{}{}", base, path) } else { format!("{}/{}", base, path) }
}

#[derive(Deserialize)]
struct ErrorBody {
  detail: Option<String>,
}

/// Turn a non-success response into an error, preferring the backend's
/// `detail` message over the bare status.
async fn response_error(response: Response, action: &str) -> anyhow::Error {
  let status = response.status();
  let body = response.text().await.unwrap_or_default();
  let detail = serde_json::from_str::<ErrorBody>(&body).ok().and_then(|b| b.detail).filter(|d| !d.is_empty());
  match detail {
    Some(detail) => anyhow!("{} failed ({}): {}", action, status, detail),
    None => anyhow!("{} failed ({})", action, status),
  }
}

// --- Download log ---

static PROGRESS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("progress pattern is a valid regex"));

/// Percentage from a yt-dlp `[download]` progress line such as
/// `[download]  42.3% of ~10.00MiB at 1.20MiB/s ETA 00:05`.
pub fn parse_progress(line: &str) -> Option<f64> {
  if !line.trim_start().starts_with("[download]") {
    return None;
  }
  PROGRESS.captures(line).and_then(|c| c[1].parse().ok())
}

/// Splits a byte stream into lines. Chunk boundaries may fall anywhere,
/// including inside a multi-byte character.
#[derive(Debug, Default)]
struct LineBuffer {
  pending: Vec<u8>,
}

impl LineBuffer {
  fn push(&mut self, chunk: &[u8]) -> Vec<String> {
    self.pending.extend_from_slice(chunk);
    let mut lines = Vec::new();
    while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
      let line: Vec<u8> = self.pending.drain(..=pos).collect();
      lines.push(Self::decode(&line[..pos]));
    }
    lines
  }

  fn finish(self) -> Option<String> {
    if self.pending.is_empty() { None } else { Some(Self::decode(&self.pending)) }
  }

  fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\r').to_string()
  }
}

/// What a finished download reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadSummary {
  pub lines: usize,
  /// Last progress percentage seen, if the log carried any.
  pub progress: Option<f64>,
}

/// Temporary name `fetch` writes to before moving the file into place.
fn part_path(dest: &Path) -> Result<PathBuf> {
  let name = dest.file_name().ok_or_else(|| anyhow!("Not a file path: {}", dest.display()))?;
  let mut part = name.to_os_string();
  part.push(".part");
  Ok(dest.with_file_name(part))
}

// --- Backend ---

/// A connected backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Backend {
  http: Client,
  base: String,
}

impl Backend {
  pub fn new(http: Client, base: impl Into<String>) -> Self {
    let base = base.into().trim_end_matches('/').to_string();
    Self { http, base }
  }

  /// Use `api_base` (or the configured one) when given, otherwise discover.
  pub async fn connect(http: Client, config: &Config, api_base: Option<String>) -> Result<Self> {
    let base = match api_base.or_else(|| config.api_base.clone()) {
      Some(base) => {
        info!(base = %base, "probe: using configured backend");
        base
      }
      None => discover(&http, &DiscoveryOptions::from_config(config)).await?,
    };
    Ok(Self::new(http, base))
  }

  pub fn base(&self) -> &str {
    &self.base
  }

  /// `{base}{path}/{segment}` with `segment` percent-encoded as one path segment.
  fn segment_url(&self, path: &str, segment: &str) -> Result<Url> {
    let mut url =
      Url::parse(&join_url(&self.base, path)).with_context(|| format!("Invalid backend base URL: {}", self.base))?;
    url.path_segments_mut().map_err(|_| anyhow!("Backend base URL cannot hold a path: {}", self.base))?.push(segment);
    Ok(url)
  }

  /// URL of a downloaded file.
  pub fn content_url(&self, name: &str) -> Result<Url> {
    self.segment_url(LISTING_PATH, name)
  }

  pub async fn list(&self) -> Result<Listing> {
    let url = join_url(&self.base, LISTING_PATH);
    let response =
      self.http.get(&url).timeout(request_timeout()).send().await.with_context(|| format!("Failed to reach {}", url))?;
    if !response.status().is_success() {
      return Err(response_error(response, "Listing downloads").await);
    }
    let listing: Listing = response.json().await.context("Failed to parse download listing")?;
    debug!(files = listing.files.len(), errors = listing.errors.len(), "library: listing received");
    Ok(listing)
  }

  /// Delete a downloaded file. Returns the backend's confirmation message.
  pub async fn delete(&self, name: &str) -> Result<String> {
    let url = self.content_url(name)?;
    let response = self
      .http
      .delete(url.clone())
      .timeout(request_timeout())
      .send()
      .await
      .with_context(|| format!("Failed to reach {}", url))?;
    if !response.status().is_success() {
      return Err(response_error(response, &format!("Deleting '{}'", name)).await);
    }

    #[derive(Deserialize)]
    struct Deleted {
      message: Option<String>,
    }
    let message = response.json::<Deleted>().await.ok().and_then(|d| d.message);
    info!(name = %name, "library: file deleted");
    Ok(message.unwrap_or_else(|| format!("File '{}' deleted successfully.", name)))
  }

  /// Ask the backend to download `url`. The downloader's log is streamed
  /// back; `on_line` sees each line as soon as it arrives.
  pub async fn download(
    &self,
    url: &str,
    format: MediaFormat,
    mut on_line: impl FnMut(&str),
  ) -> Result<DownloadSummary> {
    if !is_url_valid(url) {
      bail!("Invalid URL '{}': only http:// and https:// URLs can be downloaded", url);
    }
    let endpoint = join_url(&self.base, DOWNLOAD_PATH);
    info!(url = %url, format = format.label(), "download: requesting");

    let response = self
      .http
      .post(&endpoint)
      .json(&json!({ "url": url, "args": format.template() }))
      .timeout(Duration::from_secs(constants().download_timeout_secs))
      .send()
      .await
      .with_context(|| format!("Failed to reach {}", endpoint))?;
    if !response.status().is_success() {
      return Err(response_error(response, "Download").await);
    }

    let mut summary = DownloadSummary::default();
    let mut handle = |line: &str| {
      summary.lines += 1;
      if let Some(percent) = parse_progress(line) {
        debug!(url = %url, percent, "download: progress");
        summary.progress = Some(percent);
      }
      on_line(line);
    };

    let mut lines = LineBuffer::default();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
      let chunk = chunk.context("Download log was cut off")?;
      for line in lines.push(&chunk) {
        handle(&line);
      }
    }
    if let Some(rest) = lines.finish() {
      handle(&rest);
    }

    info!(url = %url, lines = summary.lines, progress = ?summary.progress, "download: finished");
    Ok(summary)
  }

  /// Stream a downloaded file to `dest`. Returns the number of bytes written.
  ///
  /// Bytes go to `dest` with a `.part` suffix first and are moved into place
  /// only once the whole body arrived, so a failed fetch leaves an existing
  /// `dest` untouched.
  pub async fn fetch(&self, name: &str, dest: &Path) -> Result<u64> {
    let url = self.content_url(name)?;
    let response = self.http.get(url.clone()).send().await.with_context(|| format!("Failed to reach {}", url))?;
    if !response.status().is_success() {
      return Err(response_error(response, &format!("Fetching '{}'", name)).await);
    }

    let part = part_path(dest)?;
    let written = match write_body(response, &part).await {
      Ok(written) => written,
      Err(e) => {
        if let Err(rm) = tokio::fs::remove_file(&part).await {
          debug!(part = %part.display(), err = %rm, "library: could not remove partial file");
        }
        return Err(e.context(format!("Failed while downloading {}", url)));
      }
    };
    tokio::fs::rename(&part, dest)
      .await
      .with_context(|| format!("Failed to move {} to {}", part.display(), dest.display()))?;
    info!(name = %name, bytes = written, dest = %dest.display(), "library: file fetched");
    Ok(written)
  }

  /// Search YouTube through the backend.
  pub async fn youtube_search(&self, query: &str) -> Result<Vec<YoutubeResult>> {
    let query = query.trim();
    if query.is_empty() {
      bail!("Search query is empty");
    }
    let url = self.segment_url(SEARCH_PATH, query)?;
    let response = self
      .http
      .get(url.clone())
      .timeout(request_timeout())
      .send()
      .await
      .with_context(|| format!("Failed to reach {}", url))?;
    if !response.status().is_success() {
      return Err(response_error(response, "Searching YouTube").await);
    }
    let results = response.json::<Option<Vec<YoutubeResult>>>().await.context("Failed to parse search results")?;
    let results = results.unwrap_or_default();
    info!(query = %query, results = results.len(), "search: youtube results");
    Ok(results)
  }

  /// Cookies the backend passes to yt-dlp, if any are stored.
  pub async fn cookies(&self) -> Result<Option<String>> {
    let url = join_url(&self.base, COOKIES_PATH);
    let response =
      self.http.get(&url).timeout(request_timeout()).send().await.with_context(|| format!("Failed to reach {}", url))?;
    if !response.status().is_success() {
      return Err(response_error(response, "Reading cookies").await);
    }
    let body = response.json::<Cookies>().await.context("Failed to parse cookies")?;
    Ok(body.cookies.filter(|c| !c.trim().is_empty()))
  }

  /// Replace the backend's stored cookies.
  pub async fn set_cookies(&self, cookies: &str) -> Result<()> {
    let url = join_url(&self.base, COOKIES_PATH);
    let response = self
      .http
      .post(&url)
      .json(&json!({ "cookies": cookies }))
      .timeout(request_timeout())
      .send()
      .await
      .with_context(|| format!("Failed to reach {}", url))?;
    if !response.status().is_success() {
      return Err(response_error(response, "Saving cookies").await);
    }
    info!(bytes = cookies.len(), "cookies: stored on backend");
    Ok(())
  }
}

#[derive(Deserialize)]
struct Cookies {
  #[serde(default)]
  cookies: Option<String>,
}

async fn write_body(response: Response, part: &Path) -> Result<u64> {
  let expected = response.content_length();
  let mut file =
    tokio::fs::File::create(part).await.with_context(|| format!("Failed to create {}", part.display()))?;
  let mut written = 0u64;
  let mut stream = response.bytes_stream();
  while let Some(chunk) = stream.next().await {
    let chunk = chunk?;
    file.write_all(&chunk).await.with_context(|| format!("Failed to write {}", part.display()))?;
    written += chunk.len() as u64;
  }
  file.flush().await.with_context(|| format!("Failed to write {}", part.display()))?;
  if let Some(expected) = expected
    && written != expected
  {
    bail!("Body ended after {} of {} bytes", written, expected);
  }
  Ok(written)
}
