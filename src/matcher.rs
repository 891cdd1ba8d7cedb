//! Fuzzy string similarity used to snap free text onto answer options.
//!
//! The score is the Ratcliff/Obershelp ratio: find the longest common
//! contiguous block, recurse on the pieces to its left and right, and
//! report `2 * matched / (len(a) + len(b))`.
//!
//! No junk heuristic is applied: every character of both strings is
//! eligible for matching regardless of length, unlike difflib's `autojunk`
//! which drops popular characters from strings of 200 or more.

use crate::error::{EvalError, Result};

/// Similarity of two strings in `[0, 1]`, computed over chars.
///
/// Two empty strings are identical and score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Return the candidate most similar to `target` and its index.
///
/// Ties keep the earliest candidate. Fails with [`EvalError::InvalidInput`]
/// when `candidates` is empty.
pub fn find_best_match<S: AsRef<str>>(candidates: &[S], target: &str) -> Result<(String, usize)> {
    if candidates.is_empty() {
        return Err(EvalError::InvalidInput(format!(
            "no candidates to match against '{}'",
            target
        )));
    }

    let mut best_index = 0;
    let mut best_score = f64::NEG_INFINITY;

    for (i, candidate) in candidates.iter().enumerate() {
        let score = similarity(candidate.as_ref(), target);
        if score > best_score {
            best_index = i;
            best_score = score;
        }
    }

    Ok((candidates[best_index].as_ref().to_string(), best_index))
}

/// Total size of the matching blocks between `a` and `b`.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }

    total
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
///
/// Among equally long blocks the one starting earliest in `a` wins.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo + 1;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width];
    let mut cur = vec![0usize; width];

    for i in alo..ahi {
        for j in blo..bhi {
            let slot = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[slot - 1] + 1;
                cur[slot] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                cur[slot] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    best
}
