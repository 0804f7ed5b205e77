//! Derives near-neighbor probe paths from a confirmed hit: backup
//! artifacts, adjacent version numbers, and case variants.

use once_cell::sync::Lazy;
use regex::Regex;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit run regex"));

const BACKUP_SUFFIXES: [&str; 5] = [".bak", ".old", ".orig", "~", ".swp"];

/// Emits variants of `path` in a fixed order: backup forms, then numeric
/// version bumps, then case toggles of the final segment. The output never
/// contains `path` itself and carries no duplicates. Callers must not feed
/// the output back in; the scan coordinator enforces that by origin.
pub fn mutate(path: &str) -> Vec<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if candidate != path && candidate != trimmed && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    // backup forms, skipped for paths that already look like one
    if !BACKUP_SUFFIXES.iter().any(|s| trimmed.ends_with(s)) {
        for suffix in BACKUP_SUFFIXES {
            push(format!("{trimmed}{suffix}"));
        }
    }

    // every embedded decimal integer, bumped up and down
    for m in DIGIT_RUN.find_iter(trimmed) {
        if let Ok(value) = m.as_str().parse::<u64>() {
            let width = m.as_str().len();
            if let Some(up) = value.checked_add(1) {
                push(replace_run(trimmed, m.start(), m.end(), up, width));
            }
            if value >= 2 {
                push(replace_run(trimmed, m.start(), m.end(), value - 1, width));
            }
        }
    }

    // case toggles of the final segment
    let (dir, segment) = match trimmed.rfind('/') {
        Some(idx) => (&trimmed[..idx + 1], &trimmed[idx + 1..]),
        None => ("", trimmed),
    };
    if !segment.is_empty() {
        for toggled in [
            segment.to_lowercase(),
            segment.to_uppercase(),
            capitalize_segment(segment),
        ] {
            if toggled != segment {
                push(format!("{dir}{toggled}"));
            }
        }
    }

    out
}

fn replace_run(path: &str, start: usize, end: usize, value: u64, width: usize) -> String {
    format!("{}{:0width$}{}", &path[..start], value, &path[end..], width = width)
}

fn capitalize_segment(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
