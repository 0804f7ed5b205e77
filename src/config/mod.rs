use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::utils::StatusRanges;

/// The immutable scan configuration, threaded through constructors. There
/// is no process-global state; independent scans can run side by side in
/// one process.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub targets: Vec<String>,
    pub wordlists: Vec<PathBuf>,

    pub extensions: Vec<String>,
    pub force_extensions: bool,
    pub overwrite_extensions: bool,
    pub exclude_extensions: Vec<String>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
    pub uppercase: bool,
    pub lowercase: bool,
    pub capital: bool,
    pub mutation: bool,

    pub threads: usize,
    pub max_rate: u32,
    pub delay_ms: u64,
    pub retries: u32,
    pub timeout_seconds: u64,
    pub exit_on_error: bool,
    pub max_time: Option<u64>,
    pub target_max_time: Option<u64>,

    pub recursive: bool,
    pub deep_recursive: bool,
    pub force_recursive: bool,
    pub max_recursion_depth: usize,
    pub recursion_status: StatusRanges,
    pub exclude_subdirs: Vec<String>,
    pub filter_threshold: u64,

    pub include_status: StatusRanges,
    pub exclude_status: StatusRanges,
    pub exclude_sizes: Vec<usize>,
    pub exclude_text: Vec<String>,
    pub exclude_regex: Option<String>,
    pub exclude_redirect: Option<String>,
    pub exclude_response: Option<String>,
    pub min_response_size: Option<usize>,
    pub max_response_size: Option<usize>,
    pub no_wildcard: bool,
    pub calibration: bool,
    pub skip_on_status: StatusRanges,

    pub method: String,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
    pub cookie: Option<String>,
    pub auth: Option<String>,
    pub proxy: Option<String>,
    pub follow_redirects: bool,
    pub raw_request: Option<PathBuf>,
    pub waf_signatures: Option<PathBuf>,

    pub output: Option<PathBuf>,
    pub session: Option<PathBuf>,
    pub quiet: bool,
    pub no_color: bool,
    pub async_mode: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            wordlists: Vec::new(),
            extensions: Vec::new(),
            force_extensions: false,
            overwrite_extensions: false,
            exclude_extensions: Vec::new(),
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            uppercase: false,
            lowercase: false,
            capital: false,
            mutation: false,
            threads: 25,
            max_rate: 0,
            delay_ms: 0,
            retries: 1,
            timeout_seconds: 10,
            exit_on_error: false,
            max_time: None,
            target_max_time: None,
            recursive: false,
            deep_recursive: false,
            force_recursive: false,
            max_recursion_depth: 3,
            recursion_status: StatusRanges::from_ranges(vec![(200, 299), (300, 399)]),
            exclude_subdirs: Vec::new(),
            filter_threshold: 0,
            include_status: StatusRanges::default(),
            exclude_status: StatusRanges::default(),
            exclude_sizes: Vec::new(),
            exclude_text: Vec::new(),
            exclude_regex: None,
            exclude_redirect: None,
            exclude_response: None,
            min_response_size: None,
            max_response_size: None,
            no_wildcard: false,
            calibration: false,
            skip_on_status: StatusRanges::default(),
            method: "GET".to_string(),
            user_agent: crate::executor::DEFAULT_USER_AGENT.to_string(),
            headers: Vec::new(),
            cookie: None,
            auth: None,
            proxy: None,
            follow_redirects: false,
            raw_request: None,
            waf_signatures: None,
            output: None,
            session: None,
            quiet: false,
            no_color: false,
            async_mode: false,
        }
    }
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn recursion_enabled(&self) -> bool {
        self.recursive || self.deep_recursive || self.force_recursive
    }

    /// Calibration runs unless wildcard suppression is disabled outright.
    pub fn calibration_enabled(&self) -> bool {
        !self.no_wildcard
    }

    /// With `--calibration`, every recursed directory gets its own probe
    /// round instead of inheriting the target root's wildcard profile.
    pub fn recalibrate_per_directory(&self) -> bool {
        self.calibration && !self.no_wildcard
    }

    /// Request headers in final form: configured headers plus cookie and
    /// authorization, passed through opaquely.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut out = self.headers.clone();
        if let Some(cookie) = self.cookie.as_ref() {
            out.push(("Cookie".to_string(), cookie.clone()));
        }
        if let Some(auth) = self.auth.as_ref() {
            out.push(("Authorization".to_string(), auth.clone()));
        }
        out
    }
}

/// Optional YAML config file. Every field mirrors a CLI flag; CLI values
/// win over file values.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub urls: Option<Vec<String>>,
    pub wordlists: Option<Vec<String>>,
    pub extensions: Option<String>,
    pub threads: Option<usize>,
    pub max_rate: Option<u32>,
    pub delay: Option<u64>,
    pub retries: Option<u32>,
    pub timeout: Option<u64>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub follow_redirects: Option<bool>,
    pub recursive: Option<bool>,
    pub max_recursion_depth: Option<usize>,
    pub recursion_status: Option<String>,
    pub filter_threshold: Option<u64>,
    pub include_status: Option<String>,
    pub exclude_status: Option<String>,
    pub no_wildcard: Option<bool>,
    pub waf_signatures: Option<String>,
    pub output: Option<String>,
    pub session: Option<String>,
    pub quiet: Option<bool>,
    pub no_color: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .find_map(|var| env::var_os(var))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn default_config_path() -> Option<PathBuf> {
    let mut path = home_dir()?;
    path.push(".pathscout");
    path.push("config.yml");
    Some(path)
}

/// Expands a leading `~` (bare or followed by a separator) to the home
/// directory. `~user` forms and mid-path tildes pass through untouched.
pub fn expand_tilde(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    if !rest.is_empty() && !rest.starts_with('/') && !rest.starts_with('\\') {
        return PathBuf::from(path);
    }
    match home_dir() {
        Some(home) => {
            let rest = rest.trim_start_matches(['/', '\\']);
            if rest.is_empty() {
                home
            } else {
                home.join(rest)
            }
        }
        None => PathBuf::from(path),
    }
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, ConfigError> {
    let display = path.display().to_string();
    if !path.is_file() {
        if allow_missing {
            return Ok(ConfigFile::default());
        }
        return Err(ConfigError::NotFound { path: display });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ScanConfig::default();
        assert_eq!(config.threads, 25);
        assert_eq!(config.timeout_seconds, 10);
        assert!(config.calibration_enabled());
        assert!(!config.recursion_enabled());
        assert!(config.recursion_status.contains(200));
        assert!(config.recursion_status.contains(301));
        assert!(!config.recursion_status.contains(404));
    }

    #[test]
    fn request_headers_append_cookie_and_auth() {
        let config = ScanConfig {
            headers: vec![("X-Probe".to_string(), "1".to_string())],
            cookie: Some("session=abc".to_string()),
            auth: Some("Bearer xyz".to_string()),
            ..Default::default()
        };
        let headers = config.request_headers();
        assert_eq!(headers.len(), 3);
        assert!(headers.iter().any(|(k, v)| k == "Cookie" && v == "session=abc"));
        assert!(headers.iter().any(|(k, _)| k == "Authorization"));
    }

    #[test]
    fn config_file_parses_partial_yaml() {
        let file: ConfigFile =
            serde_yaml::from_str("threads: 50\nmax_rate: 100\nrecursive: true\n").unwrap();
        assert_eq!(file.threads, Some(50));
        assert_eq!(file.max_rate, Some(100));
        assert_eq!(file.recursive, Some(true));
        assert!(file.urls.is_none());
    }

    #[test]
    fn recalibration_requires_both_flags() {
        let config = ScanConfig {
            calibration: true,
            ..Default::default()
        };
        assert!(config.recalibrate_per_directory());

        let config = ScanConfig {
            calibration: true,
            no_wildcard: true,
            ..Default::default()
        };
        assert!(!config.recalibrate_per_directory());
        assert!(!ScanConfig::default().recalibrate_per_directory());
    }

    #[test]
    fn tilde_expansion_leaves_non_home_paths_alone() {
        assert_eq!(expand_tilde("/etc/wordlist.txt"), PathBuf::from("/etc/wordlist.txt"));
        assert_eq!(expand_tilde("~other/lists"), PathBuf::from("~other/lists"));
        assert_eq!(expand_tilde("a/~/b"), PathBuf::from("a/~/b"));
    }

    #[test]
    fn tilde_expansion_resolves_against_home() {
        let home = match super::home_dir() {
            Some(home) => home,
            None => return,
        };
        assert_eq!(expand_tilde("~"), home);
        assert_eq!(expand_tilde("~/lists/common.txt"), home.join("lists/common.txt"));
    }

    #[test]
    fn missing_config_file_is_tolerated_only_when_allowed() {
        let path = PathBuf::from("/nonexistent/pathscout-config.yml");
        assert!(load_config(&path, true).is_ok());
        assert!(matches!(
            load_config(&path, false),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn malformed_config_file_is_a_parse_error() {
        let mut path = std::env::temp_dir();
        path.push(format!("pathscout-cfg-{}.yml", std::process::id()));
        std::fs::write(&path, "threads: [not a number\n").unwrap();
        assert!(matches!(
            load_config(&path, true),
            Err(ConfigError::Parse { .. })
        ));
        std::fs::remove_file(path).ok();
    }
}
