mod backend;
mod commands;
mod config;
mod constants;
mod distance;
mod formats;
mod library;
mod normalize;
mod search;
#[cfg(test)]
mod test_support;
mod youtube;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use backend::{Backend, http_client};
use config::Config;
use formats::MediaFormat;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Browse and manage a uvxytdlp download backend", long_about = None)]
struct Args {
  /// Backend base URL, e.g. http://localhost:5150 (skips port discovery)
  #[arg(long, global = true)]
  api_base: Option<String>,

  /// Host to probe for the backend (default: localhost)
  #[arg(long, global = true)]
  host: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Locate the backend and print its base URL
  Probe,
  /// List downloaded files, ranked against an optional search query
  #[command(visible_alias = "ls")]
  Library {
    /// Search words; omit to list everything, newest first
    query: Vec<String>,
    /// Print the results as JSON
    #[arg(long)]
    json: bool,
  },
  /// Ask the backend to download a URL
  Download {
    url: String,
    /// Output format (default: `default_format` from prefs, else mp4)
    #[arg(short, long)]
    format: Option<MediaFormat>,
  },
  /// Delete a downloaded file from the backend
  #[command(visible_alias = "rm")]
  Delete { name: String },
  /// Save a downloaded file locally
  Fetch {
    name: String,
    /// Destination path (default: the file name in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Search YouTube through the backend; pass a printed URL to `download`
  Search {
    #[arg(required = true)]
    query: Vec<String>,
  },
  /// Show the cookies the backend hands to yt-dlp, or replace them
  Cookies {
    /// Upload this Netscape cookies.txt file instead of printing
    #[arg(long, value_name = "FILE")]
    set: Option<PathBuf>,
  },
  /// Print a shell completion script
  Completions { shell: clap_complete::Shell },
}

// --- Logging ---

/// Log to a daily file under the data dir so stdout stays clean for output.
/// Falls back to stderr (warnings only) when there is no data dir.
fn init_logging() -> Option<WorkerGuard> {
  if let Some(proj_dirs) = config::project_dirs() {
    let log_dir = proj_dirs.data_local_dir().join("logs");
    if std::fs::create_dir_all(&log_dir).is_ok() {
      let appender = tracing_appender::rolling::daily(log_dir, "uvxytdlp.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
      tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
      return Some(guard);
    }
  }
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
  None
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Command::Completions { shell } = args.command {
    clap_complete::generate(shell, &mut Args::command(), "uvxytdlp", &mut std::io::stdout());
    return Ok(());
  }

  let _guard = init_logging();
  run(args).await
}

async fn run(args: Args) -> Result<()> {
  let mut config = Config::load();
  if args.host.is_some() {
    config.host = args.host;
  }
  info!(command = ?args.command, "starting");

  let backend = Backend::connect(http_client()?, &config, args.api_base).await?;

  match args.command {
    Command::Probe => commands::probe(&backend),
    Command::Library { query, json } => commands::library(&backend, &query.join(" "), json).await?,
    Command::Download { url, format } => {
      commands::download(&backend, &url, format.unwrap_or_else(|| config.default_format())).await?
    }
    Command::Delete { name } => commands::delete(&backend, &name).await?,
    Command::Fetch { name, output } => commands::fetch(&backend, &name, output).await?,
    Command::Search { query } => commands::search(&backend, &query.join(" ")).await?,
    Command::Cookies { set } => commands::cookies(&backend, set.as_deref()).await?,
    Command::Completions { .. } => {}
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn search_joins_words_and_requires_a_query() {
    let args = Args::try_parse_from(["uvxytdlp", "search", "big", "buck", "bunny"]).unwrap();
    assert!(matches!(args.command, Command::Search { ref query } if query.join(" ") == "big buck bunny"));
    assert!(Args::try_parse_from(["uvxytdlp", "search"]).is_err());
  }

  #[test]
  fn cookies_set_takes_a_file() {
    let args = Args::try_parse_from(["uvxytdlp", "cookies", "--set", "cookies.txt"]).unwrap();
    assert!(matches!(args.command, Command::Cookies { set: Some(ref p) } if p.to_str() == Some("cookies.txt")));
    let args = Args::try_parse_from(["uvxytdlp", "cookies"]).unwrap();
    assert!(matches!(args.command, Command::Cookies { set: None }));
  }
}
