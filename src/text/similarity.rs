//! Edit-distance based string similarity

/// Similarity score between two strings in `[0, 1]`.
///
/// 1.0 for identical strings, otherwise `1 - lev(a, b) / max(|a|, |b|)`
/// over characters. Two empty strings are identical (1.0); an empty
/// string against a non-empty one scores 0.0.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());

    let distance = levenshtein(&a, &b);
    1.0 - distance as f64 / max_len as f64
}

/// Levenshtein distance over char slices, single-row formulation.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut row: Vec<usize> = (0..=a.len()).collect();

    for (j, bc) in b.iter().enumerate() {
        let mut prev_diagonal = row[0];
        row[0] = j + 1;

        for (i, ac) in a.iter().enumerate() {
            let cost = usize::from(ac != bc);
            let substituted = prev_diagonal + cost;
            let inserted = row[i] + 1;
            let deleted = row[i + 1] + 1;

            prev_diagonal = row[i + 1];
            row[i + 1] = substituted.min(inserted).min(deleted);
        }
    }

    row[a.len()]
}
