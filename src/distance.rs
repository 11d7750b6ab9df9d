/// Levenshtein edit distance between `a` and `b`, counted in chars.
///
/// Keeps two rows sized to the shorter input.
pub fn distance(a: &str, b: &str) -> usize {
  let a: Vec<char> = a.chars().collect();
  let b: Vec<char> = b.chars().collect();
  let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

  if short.is_empty() {
    return long.len();
  }

  let mut prev: Vec<usize> = (0..=short.len()).collect();
  let mut curr = vec![0; short.len() + 1];

  for (i, lc) in long.iter().enumerate() {
    curr[0] = i + 1;
    for (j, sc) in short.iter().enumerate() {
      let substitution = prev[j] + usize::from(lc != sc);
      curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
    }
    std::mem::swap(&mut prev, &mut curr);
  }

  prev[short.len()]
}
