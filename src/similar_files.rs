//! Similar-filename discovery and digit-aware ordering.
//!
//! "Similar" means two names are identical except for a single run of digits
//! (episode numbering, disc numbering). Such names compare numerically by
//! that run so `ep2` sorts before `ep10`; unrelated names fall back to
//! case-insensitive lexicographic order.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use log::debug;

/// Longest contiguous digit run in `name` as `(byte_start, byte_len)`.
fn longest_digit_run(name: &str) -> Option<(usize, usize)> {
    let bytes = name.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index].is_ascii_digit() {
            let start = index;
            while index < bytes.len() && bytes[index].is_ascii_digit() {
                index += 1;
            }
            let len = index - start;
            if best.map(|(_, best_len)| len > best_len).unwrap_or(true) {
                best = Some((start, len));
            }
        } else {
            index += 1;
        }
    }
    best
}

/// Splits a name around its longest digit run: `(prefix, digits, suffix)`.
fn split_at_digit_run(name: &str) -> Option<(&str, &str, &str)> {
    let (start, len) = longest_digit_run(name)?;
    Some((&name[..start], &name[start..start + len], &name[start + len..]))
}

/// Whether two names are identical outside their longest digit runs.
pub fn are_similar(a: &str, b: &str) -> bool {
    match (split_at_digit_run(a), split_at_digit_run(b)) {
        (Some((prefix_a, _, suffix_a)), Some((prefix_b, _, suffix_b))) => {
            prefix_a == prefix_b && suffix_a == suffix_b
        }
        _ => false,
    }
}

/// Orders two names: numerically by digit run when similar, otherwise
/// case-insensitive lexicographic.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    if are_similar(a, b) {
        if let (Some((_, digits_a, _)), Some((_, digits_b, _))) =
            (split_at_digit_run(a), split_at_digit_run(b))
        {
            // Leading zeros make the runs unequal in length but equal in
            // value; compare by length first, then textually.
            let ordering = digits_a
                .len()
                .cmp(&digits_b.len())
                .then_with(|| digits_a.cmp(digits_b));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
    }
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Collects playable files in `path`'s directory whose stems are similar to
/// `path`'s stem, sorted by `compare_names`. The original file is included.
/// Unreadable directories yield just the original.
pub fn find_similar_files(path: &Path, is_playable: &dyn Fn(&str) -> bool) -> Vec<PathBuf> {
    let mut found = vec![path.to_path_buf()];

    let Some(parent) = path.parent() else {
        return found;
    };
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return found;
    };
    let entries = match std::fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("could not scan {} for similar files: {err}", parent.display());
            return found;
        }
    };

    for entry in entries.flatten() {
        let candidate = entry.path();
        if candidate == *path || !candidate.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_playable(&name) {
            continue;
        }
        let Some(candidate_stem) = candidate.file_stem().map(|s| s.to_string_lossy().into_owned())
        else {
            continue;
        };
        if are_similar(&stem, &candidate_stem) {
            found.push(candidate);
        }
    }

    found.sort_by(|a, b| {
        compare_names(
            &a.file_name().unwrap_or_default().to_string_lossy(),
            &b.file_name().unwrap_or_default().to_string_lossy(),
        )
    });
    found
}
