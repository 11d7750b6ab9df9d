//! Ranking of downloaded files against a free-text query.
//!
//! Scores blend two signals: per-word edit distance between query words and
//! name words, and whole-name substring hits for each query word. An empty
//! query is the browse view, newest first.

use std::cmp::Reverse;

use crate::distance::distance;
use crate::library::LibraryEntry;
use crate::normalize::normalize;

/// Maximum edit distance at which a query word still counts as a fuzzy hit.
pub const DEFAULT_THRESHOLD: usize = 3;

struct ScoredEntry<'a> {
  entry: &'a LibraryEntry,
  score: usize,
}

/// Fuzzy points for a word pair at `distance`: closer pairs earn more, and a
/// pair at exactly `threshold` still earns one point.
pub fn fuzzy_points(distance: usize, threshold: usize) -> usize {
  if distance <= threshold { threshold - distance + 1 } else { 0 }
}

fn score_entry(entry: &LibraryEntry, query_words: &[&str], threshold: usize) -> usize {
  let name = normalize(&entry.name);

  let fuzzy: usize = query_words
    .iter()
    .flat_map(|q| name.split(' ').filter(|w| !w.is_empty()).map(move |w| fuzzy_points(distance(q, w), threshold)))
    .sum();
  let exact = query_words.iter().filter(|q| name.contains(**q)).count();

  fuzzy + exact
}

/// Rank `library` against `query`.
///
/// Entries scoring zero are dropped. Ties fall back to the most recently
/// modified entry, then to the input order.
pub fn search<'a>(library: &'a [LibraryEntry], query: &str, threshold: usize) -> Vec<&'a LibraryEntry> {
  let query = normalize(query);
  let query = query.trim();

  if query.is_empty() {
    let mut all: Vec<&LibraryEntry> = library.iter().collect();
    all.sort_by_key(|e| Reverse(e.modified_at));
    return all;
  }

  let query_words: Vec<&str> = query.split_whitespace().collect();

  let mut scored: Vec<ScoredEntry<'a>> = library
    .iter()
    .map(|entry| ScoredEntry { entry, score: score_entry(entry, &query_words, threshold) })
    .filter(|s| s.score > 0)
    .collect();
  scored.sort_by_key(|s| (Reverse(s.score), Reverse(s.entry.modified_at)));

  scored.into_iter().map(|s| s.entry).collect()
}
