//! Turns raw dictionary entries into concrete probe candidates.

use std::collections::HashSet;

use itertools::iproduct;

/// Where a candidate came from. Mutation-derived candidates are treated
/// specially downstream: they are never mutated again and never recurse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateOrigin {
    Seed,
    Mutation,
    Recursion,
}

/// One concrete path about to be probed against a target. Immutable once
/// built; discarded after classification.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub path: String,
    pub extension: Option<String>,
    pub depth: usize,
    pub origin: CandidateOrigin,
}

impl Candidate {
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }
}

const EXT_TOKEN: &str = "%EXT%";

#[derive(Clone, Debug, Default)]
pub struct ExpandRules {
    pub extensions: Vec<String>,
    pub force_extensions: bool,
    pub overwrite_extensions: bool,
    pub exclude_extensions: Vec<String>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

/// Pure, restartable expansion: the same entry and rules always produce the
/// same candidate sequence.
#[derive(Clone, Debug)]
pub struct DictionaryExpander {
    rules: ExpandRules,
}

impl DictionaryExpander {
    pub fn new(rules: ExpandRules) -> Self {
        Self { rules }
    }

    pub fn expand(&self, entry: &str, depth: usize, origin: CandidateOrigin) -> Vec<Candidate> {
        let entry = entry.trim().trim_start_matches('/');
        if entry.is_empty() {
            return Vec::new();
        }
        let is_dir = entry.ends_with('/');

        // extension rules first
        let mut bases: Vec<(String, Option<String>)> = Vec::new();
        if entry.contains(EXT_TOKEN) {
            for ext in self.rules.extensions.iter() {
                bases.push((entry.replace(EXT_TOKEN, ext), Some(ext.clone())));
            }
        } else if self.rules.overwrite_extensions && !is_dir && path_extension(entry).is_some() {
            let stem = match entry.rfind('.') {
                Some(idx) => &entry[..idx],
                None => entry,
            };
            for ext in self.rules.extensions.iter() {
                bases.push((format!("{stem}.{ext}"), Some(ext.clone())));
            }
        } else {
            bases.push((entry.to_string(), path_extension(entry)));
            if self.rules.force_extensions && !is_dir {
                for ext in self.rules.extensions.iter() {
                    bases.push((format!("{entry}.{ext}"), Some(ext.clone())));
                }
            }
        }

        if !self.rules.exclude_extensions.is_empty() {
            bases.retain(|(path, _)| match path_extension(path) {
                Some(ext) => !self
                    .rules
                    .exclude_extensions
                    .iter()
                    .any(|ex| ex.eq_ignore_ascii_case(&ext)),
                None => true,
            });
        }

        let empty = vec![String::new()];
        let prefixes = if self.rules.prefixes.is_empty() {
            &empty
        } else {
            &self.rules.prefixes
        };
        let suffixes = if self.rules.suffixes.is_empty() || is_dir {
            &empty
        } else {
            &self.rules.suffixes
        };

        let mut out: Vec<Candidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for ((path, extension), (prefix, suffix)) in
            iproduct!(bases.iter(), iproduct!(prefixes.iter(), suffixes.iter()))
        {
            let full = format!("{prefix}{path}{suffix}");
            if !seen.insert(full.clone()) {
                continue;
            }
            out.push(Candidate {
                path: full,
                extension: extension.clone(),
                depth,
                origin,
            });
        }
        out
    }
}

/// Extension of the final path segment, lowercased. Directory entries have
/// none.
pub fn path_extension(path: &str) -> Option<String> {
    if path.ends_with('/') {
        return None;
    }
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < segment.len() => {
            Some(segment[idx + 1..].to_lowercase())
        }
        _ => None,
    }
}
