//! Decides which survivors spawn sub-scans. Recursion is a queue of prefix
//! passes inside the coordinator, never nested control flow.

use crate::utils::StatusRanges;
use crate::wordlist::expander::{Candidate, CandidateOrigin};

#[derive(Clone, Debug)]
pub struct RecursionController {
    pub enabled: bool,
    pub force: bool,
    pub deep: bool,
    pub statuses: StatusRanges,
    pub max_depth: usize,
    pub exclude_subdirs: Vec<String>,
}

impl RecursionController {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            force: false,
            deep: false,
            statuses: StatusRanges::default(),
            max_depth: 0,
            exclude_subdirs: Vec::new(),
        }
    }

    /// `full_path` is the candidate path including the pass prefix,
    /// relative to the target root.
    pub fn should_recurse(&self, candidate: &Candidate, status: u16, full_path: &str) -> bool {
        if !self.enabled {
            return false;
        }
        // mutation-derived candidates never spawn sub-scans
        if candidate.origin == CandidateOrigin::Mutation {
            return false;
        }
        if !full_path.ends_with('/') && !self.force {
            return false;
        }
        if !self.statuses.contains(status) {
            return false;
        }
        if candidate.depth >= self.max_depth {
            return false;
        }
        !self.subdir_excluded(full_path)
    }

    pub fn subdir_excluded(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        self.exclude_subdirs.iter().any(|excluded| {
            let excluded = excluded.trim_start_matches('/').trim_end_matches('/');
            if excluded.is_empty() {
                return false;
            }
            let trimmed = path.trim_end_matches('/');
            trimmed == excluded || trimmed.starts_with(&format!("{excluded}/"))
        })
    }

    /// Ancestor directories of `full_path`, shallowest first, excluding the
    /// path itself. Used by deep recursion to pick up intermediate
    /// directories the wordlist never named.
    pub fn ancestors(full_path: &str) -> Vec<String> {
        let trimmed = full_path.trim_start_matches('/').trim_end_matches('/');
        let mut out = Vec::new();
        let mut current = String::new();
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() <= 1 {
            return out;
        }
        for segment in &segments[..segments.len() - 1] {
            current.push_str(segment);
            current.push('/');
            out.push(current.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(depth: usize, origin: CandidateOrigin) -> Candidate {
        Candidate {
            path: "api/".to_string(),
            extension: None,
            depth,
            origin,
        }
    }

    fn controller() -> RecursionController {
        RecursionController {
            enabled: true,
            force: false,
            deep: false,
            statuses: StatusRanges::parse("2xx,3xx").unwrap(),
            max_depth: 2,
            exclude_subdirs: vec!["static/".to_string()],
        }
    }

    #[test]
    fn directories_with_eligible_status_recurse() {
        let c = controller();
        assert!(c.should_recurse(&candidate(0, CandidateOrigin::Seed), 200, "api/"));
        assert!(c.should_recurse(&candidate(1, CandidateOrigin::Recursion), 301, "api/v2/"));
    }

    #[test]
    fn files_need_force_recursive() {
        let mut c = controller();
        assert!(!c.should_recurse(&candidate(0, CandidateOrigin::Seed), 200, "api"));
        c.force = true;
        assert!(c.should_recurse(&candidate(0, CandidateOrigin::Seed), 200, "api"));
    }

    #[test]
    fn status_outside_recursion_set_is_ignored() {
        let c = controller();
        assert!(!c.should_recurse(&candidate(0, CandidateOrigin::Seed), 403, "api/"));
    }

    #[test]
    fn depth_limit_is_a_hard_stop() {
        let c = controller();
        assert!(c.should_recurse(&candidate(1, CandidateOrigin::Recursion), 200, "a/b/"));
        assert!(!c.should_recurse(&candidate(2, CandidateOrigin::Recursion), 200, "a/b/c/"));
    }

    #[test]
    fn mutations_never_recurse() {
        let c = controller();
        assert!(!c.should_recurse(&candidate(0, CandidateOrigin::Mutation), 200, "api/"));
    }

    #[test]
    fn excluded_subdirs_cover_prefixes() {
        let c = controller();
        assert!(c.subdir_excluded("static/"));
        assert!(c.subdir_excluded("static/js/"));
        assert!(!c.subdir_excluded("statically/"));
        assert!(!c.should_recurse(&candidate(0, CandidateOrigin::Seed), 200, "static/js/"));
    }

    #[test]
    fn ancestors_come_shallowest_first() {
        assert_eq!(
            RecursionController::ancestors("a/b/c.txt"),
            vec!["a/".to_string(), "a/b/".to_string()]
        );
        assert_eq!(
            RecursionController::ancestors("a/b/"),
            vec!["a/".to_string()]
        );
        assert!(RecursionController::ancestors("file.txt").is_empty());
    }
}
