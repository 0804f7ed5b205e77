pub mod expander;

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

#[derive(Debug, Error)]
pub enum WordlistError {
    #[error("failed to open wordlist: {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read wordlist: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which case forms of each raw entry get emitted. With no flag set the
/// entry passes through untouched; with flags set, one emission per
/// selected form.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaseTransforms {
    pub uppercase: bool,
    pub lowercase: bool,
    pub capital: bool,
}

impl CaseTransforms {
    pub fn forms(&self, entry: &str) -> Vec<String> {
        if !(self.uppercase || self.lowercase || self.capital) {
            return vec![entry.to_string()];
        }
        let mut out = Vec::new();
        if self.lowercase {
            out.push(entry.to_lowercase());
        }
        if self.uppercase {
            out.push(entry.to_uppercase());
        }
        if self.capital {
            out.push(capitalize(entry));
        }
        out
    }
}

fn capitalize(entry: &str) -> String {
    let mut chars = entry.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Lazy reader over the configured dictionary files.
///
/// Lines are trimmed; comments (`#`) and blanks are skipped; duplicate raw
/// entries are dropped for the whole session, tracked by a compact set of
/// 64-bit line hashes so the wordlist itself is never materialized.
pub struct WordlistStream {
    files: VecDeque<PathBuf>,
    current: Option<(String, Lines<BufReader<File>>)>,
    pending: VecDeque<String>,
    seen: HashSet<u64>,
    transforms: CaseTransforms,
}

impl WordlistStream {
    pub fn new(files: Vec<PathBuf>, transforms: CaseTransforms) -> Self {
        Self {
            files: files.into(),
            current: None,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            transforms,
        }
    }

    pub async fn next_entry(&mut self) -> Result<Option<String>, WordlistError> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(Some(entry));
            }

            if self.current.is_none() {
                match self.files.pop_front() {
                    Some(path) => {
                        let display = path.display().to_string();
                        let handle =
                            File::open(&path)
                                .await
                                .map_err(|source| WordlistError::Open {
                                    path: display.clone(),
                                    source,
                                })?;
                        self.current = Some((display, BufReader::new(handle).lines()));
                    }
                    None => return Ok(None),
                }
            }

            let line = if let Some((path, lines)) = self.current.as_mut() {
                match lines.next_line().await {
                    Ok(line) => line,
                    Err(source) => {
                        let path = path.clone();
                        self.current = None;
                        return Err(WordlistError::Read { path, source });
                    }
                }
            } else {
                None
            };

            match line {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let mut hasher = DefaultHasher::new();
                    line.hash(&mut hasher);
                    if !self.seen.insert(hasher.finish()) {
                        continue;
                    }
                    for form in self.transforms.forms(line) {
                        self.pending.push_back(form);
                    }
                }
                None => {
                    self.current = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_wordlist(name: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pathscout-wl-{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    async fn drain(stream: &mut WordlistStream) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(entry) = stream.next_entry().await.unwrap() {
            out.push(entry);
        }
        out
    }

    #[tokio::test]
    async fn skips_comments_blanks_and_duplicates() {
        let path = temp_wordlist("basic", "# header\nadmin\n\nlogin\nadmin\n");
        let mut stream = WordlistStream::new(vec![path.clone()], CaseTransforms::default());
        assert_eq!(drain(&mut stream).await, vec!["admin", "login"]);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn dedup_spans_multiple_files() {
        let a = temp_wordlist("multi-a", "admin\nbackup\n");
        let b = temp_wordlist("multi-b", "backup\npanel\n");
        let mut stream =
            WordlistStream::new(vec![a.clone(), b.clone()], CaseTransforms::default());
        assert_eq!(drain(&mut stream).await, vec!["admin", "backup", "panel"]);
        std::fs::remove_file(a).ok();
        std::fs::remove_file(b).ok();
    }

    #[tokio::test]
    async fn case_transforms_emit_each_selected_form() {
        let path = temp_wordlist("case", "AdminPanel\n");
        let transforms = CaseTransforms {
            uppercase: true,
            lowercase: true,
            capital: false,
        };
        let mut stream = WordlistStream::new(vec![path.clone()], transforms);
        assert_eq!(drain(&mut stream).await, vec!["adminpanel", "ADMINPANEL"]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn capitalize_matches_single_leading_uppercase() {
        assert_eq!(capitalize("admin-OLD"), "Admin-old");
        assert_eq!(capitalize(""), "");
    }

    #[tokio::test]
    async fn missing_file_is_an_open_error() {
        let mut stream = WordlistStream::new(
            vec![PathBuf::from("/nonexistent/pathscout-wordlist.txt")],
            CaseTransforms::default(),
        );
        assert!(matches!(
            stream.next_entry().await,
            Err(WordlistError::Open { .. })
        ));
    }
}
