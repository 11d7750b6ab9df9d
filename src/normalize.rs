//! Text canonicalization shared by queries and library names.

use unicode_normalization::UnicodeNormalization;

/// Small capital letters some uploaders use for stylized titles, folded to
/// their plain lowercase letters. There is no small capital X.
const SMALL_CAPS: [(char, char); 25] = [
  ('ᴀ', 'a'),
  ('ʙ', 'b'),
  ('ᴄ', 'c'),
  ('ᴅ', 'd'),
  ('ᴇ', 'e'),
  ('ꜰ', 'f'),
  ('ɢ', 'g'),
  ('ʜ', 'h'),
  ('ɪ', 'i'),
  ('ᴊ', 'j'),
  ('ᴋ', 'k'),
  ('ʟ', 'l'),
  ('ᴍ', 'm'),
  ('ɴ', 'n'),
  ('ᴏ', 'o'),
  ('ᴘ', 'p'),
  ('ꞯ', 'q'),
  ('ʀ', 'r'),
  ('ꜱ', 's'),
  ('ᴛ', 't'),
  ('ᴜ', 'u'),
  ('ᴠ', 'v'),
  ('ᴡ', 'w'),
  ('ʏ', 'y'),
  ('ᴢ', 'z'),
];

fn fold_small_cap(c: char) -> char {
  SMALL_CAPS.iter().find(|(small, _)| *small == c).map_or(c, |(_, plain)| *plain)
}

/// Canonicalize a name or query: NFC, lowercase, then small caps to ASCII.
pub fn normalize(text: &str) -> String {
  let composed: String = text.nfc().collect();
  composed.to_lowercase().chars().map(fold_small_cap).collect()
}
