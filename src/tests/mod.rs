use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::FutureExt;
use indicatif::ProgressBar;
use tokio::sync::watch;

use crate::classify::waf::SignatureDb;
use crate::classify::ResponseKind;
use crate::config::ScanConfig;
use crate::executor::{RequestExecutor, RequestSpec, ResponseSummary, TransportError};
use crate::scanner::{ScanSummary, Scanner};
use crate::sink::{MemorySink, ResultRecord, Sink};
use crate::utils::StatusRanges;

#[derive(Clone)]
struct Scripted {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
}

impl Scripted {
    fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: Vec::new(),
        }
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// In-process stand-in for an HTTP origin: responses are keyed by candidate
/// path, unknown paths get the closest prefix fallback or the global one
/// (the origin's "not found" behavior, which can differ per directory).
struct ScriptedExecutor {
    routes: HashMap<String, Scripted>,
    prefix_fallbacks: Vec<(String, Scripted)>,
    fallback: Scripted,
    fail_all: bool,
    log: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(fallback: Scripted) -> Self {
        Self {
            routes: HashMap::new(),
            prefix_fallbacks: Vec::new(),
            fallback,
            fail_all: false,
            log: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        let mut executor = Self::new(Scripted::new(404, "not found"));
        executor.fail_all = true;
        executor
    }

    fn route(mut self, path: &str, scripted: Scripted) -> Self {
        self.routes.insert(path.to_string(), scripted);
        self
    }

    fn prefix_fallback(mut self, prefix: &str, scripted: Scripted) -> Self {
        self.prefix_fallbacks.push((prefix.to_string(), scripted));
        self
    }

    fn lookup(&self, path: &str) -> &Scripted {
        if let Some(scripted) = self.routes.get(path) {
            return scripted;
        }
        self.prefix_fallbacks
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, scripted)| scripted)
            .unwrap_or(&self.fallback)
    }

    fn requests(&self) -> Vec<String> {
        match self.log.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RequestExecutor for ScriptedExecutor {
    fn execute<'a>(
        &'a self,
        spec: &'a RequestSpec,
    ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>> {
        async move {
            if let Ok(mut log) = self.log.lock() {
                log.push(spec.path.clone());
            }
            if self.fail_all {
                return Err(TransportError::Connect("scripted failure".to_string()));
            }
            let scripted = self.lookup(&spec.path);
            let mut headers = HashMap::new();
            for (k, v) in scripted.headers.iter() {
                headers.insert(k.to_lowercase(), v.clone());
            }
            Ok(ResponseSummary {
                status: scripted.status,
                body: scripted.body.as_bytes().to_vec(),
                body_size: scripted.body.len(),
                headers,
                final_url: spec.url.clone(),
                redirect_chain: Vec::new(),
                elapsed_ms: 1,
                retry_count: 0,
            })
        }
        .boxed()
    }
}

fn write_wordlist(name: &str, entries: &[&str]) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("pathscout-e2e-{}-{name}.txt", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    for entry in entries {
        writeln!(file, "{entry}").unwrap();
    }
    path
}

fn test_config(name: &str, entries: &[&str]) -> ScanConfig {
    ScanConfig {
        targets: vec!["http://scanme.local/".to_string()],
        wordlists: vec![write_wordlist(name, entries)],
        threads: 4,
        no_wildcard: true,
        ..Default::default()
    }
}

async fn run_scan(
    config: ScanConfig,
    executor: Arc<ScriptedExecutor>,
) -> (Vec<ResultRecord>, ScanSummary) {
    let memory = Arc::new(MemorySink::new());
    let sinks: Vec<Arc<dyn Sink>> = vec![memory.clone()];
    let scanner = Scanner::new(
        config,
        executor,
        sinks,
        Arc::new(SignatureDb::builtin()),
        ProgressBar::hidden(),
    )
    .expect("scanner construction");
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let summary = scanner.run(cancel_rx).await.expect("scan run");
    (memory.records(), summary)
}

fn paths(records: &[ResultRecord]) -> Vec<String> {
    records.iter().map(|r| r.path.clone()).collect()
}

#[tokio::test]
async fn extension_substitution_probes_expected_candidates() {
    let config = test_config("ext-subst", &["index.%EXT%", "admin/"]);
    let config = ScanConfig {
        extensions: vec!["php".to_string(), "html".to_string()],
        ..config
    };
    let executor = Arc::new(
        ScriptedExecutor::new(Scripted::new(404, "not found"))
            .route("index.php", Scripted::new(200, "the php index page"))
            .route("index.html", Scripted::new(200, "the html index page body"))
            .route("admin/", Scripted::new(200, "the admin directory listing page")),
    );

    let (records, summary) = run_scan(config, executor.clone()).await;

    let mut probed = executor.requests();
    probed.sort();
    assert_eq!(probed, vec!["admin/", "index.html", "index.php"]);
    let mut found = paths(&records);
    found.sort();
    assert_eq!(found, vec!["admin/", "index.html", "index.php"]);
    assert!(summary.any_target_completed());
}

#[tokio::test]
async fn force_extensions_never_touch_directories() {
    let config = test_config("force-dir", &["admin/"]);
    let config = ScanConfig {
        extensions: vec!["php".to_string()],
        force_extensions: true,
        ..config
    };
    let executor = Arc::new(ScriptedExecutor::new(Scripted::new(404, "not found")));

    let _ = run_scan(config, executor.clone()).await;

    assert_eq!(executor.requests(), vec!["admin/"]);
}

#[tokio::test]
async fn calibration_suppresses_soft_404_responses() {
    let config = test_config("calibration", &["admin/", "secret"]);
    let config = ScanConfig {
        no_wildcard: false,
        ..config
    };
    // the origin answers 200 "Page not found" for anything unknown
    let executor = Arc::new(
        ScriptedExecutor::new(Scripted::new(200, "Page not found"))
            .route("admin/", Scripted::new(200, "Page not found"))
            .route("secret", Scripted::new(200, "a genuinely different page body here")),
    );

    let (records, _) = run_scan(config, executor.clone()).await;

    assert_eq!(paths(&records), vec!["secret"]);
    // calibration issued its probe round before the dictionary
    assert!(executor.requests().len() > 2);
}

#[tokio::test]
async fn recalibration_learns_each_directory_wildcard() {
    // the root answers 404 for garbage, but /api/ soft-404s with a 200
    let origin = || {
        Arc::new(
            ScriptedExecutor::new(Scripted::new(404, "not found"))
                .prefix_fallback("api/", Scripted::new(200, "nothing here"))
                .route("api/", Scripted::new(200, "api root directory index page"))
                .route("api/users", Scripted::new(200, "the real users endpoint payload")),
        )
    };

    let config = test_config("recal-on", &["api/", "users", "ghost1", "ghost2"]);
    let config = ScanConfig {
        no_wildcard: false,
        calibration: true,
        recursive: true,
        max_recursion_depth: 2,
        ..config
    };
    let (records, _) = run_scan(config, origin()).await;
    let mut found = paths(&records);
    found.sort();
    assert_eq!(found, vec!["api/", "api/users"]);

    // without --calibration the sub-directory inherits the root profile
    // and the soft 404s come through as findings
    let config = test_config("recal-off", &["api/", "users", "ghost1", "ghost2"]);
    let config = ScanConfig {
        no_wildcard: false,
        calibration: false,
        recursive: true,
        max_recursion_depth: 2,
        ..config
    };
    let (records, _) = run_scan(config, origin()).await;
    assert!(paths(&records).contains(&"api/ghost1".to_string()));
}

#[tokio::test]
async fn duplicate_signatures_stop_after_threshold() {
    let entries: Vec<String> = (0..15).map(|i| format!("path{i:02}")).collect();
    let entry_refs: Vec<&str> = entries.iter().map(String::as_str).collect();
    let config = test_config("dup-threshold", &entry_refs);
    let config = ScanConfig {
        filter_threshold: 10,
        ..config
    };
    let executor = Arc::new(ScriptedExecutor::new(Scripted::new(
        200,
        "identical page body on every path",
    )));

    let (records, _) = run_scan(config, executor.clone()).await;

    assert_eq!(executor.requests().len(), 15);
    assert_eq!(records.len(), 10);
}

#[tokio::test]
async fn waf_and_backend_responses_get_distinct_tags() {
    let config = test_config("waf-tags", &["blocked", "forbidden"]);
    let executor = Arc::new(
        ScriptedExecutor::new(Scripted::new(404, "not found"))
            .route(
                "blocked",
                Scripted::new(403, "Attention Required! | Cloudflare")
                    .with_header("Server", "cloudflare"),
            )
            .route(
                "forbidden",
                Scripted::new(403, "{\"error\":\"forbidden\"}").with_header("Server", "nginx"),
            ),
    );

    let (records, _) = run_scan(config, executor).await;

    let blocked = records.iter().find(|r| r.path == "blocked").unwrap();
    assert_eq!(blocked.kind, ResponseKind::Waf);
    assert_eq!(blocked.source_label, "Cloudflare WAF");

    let forbidden = records.iter().find(|r| r.path == "forbidden").unwrap();
    assert_eq!(forbidden.kind, ResponseKind::App);
    assert_eq!(forbidden.source_label, "Backend");
}

#[tokio::test]
async fn recursion_descends_until_the_depth_limit() {
    let config = test_config("recursion", &["api/", "v2/", "users"]);
    let config = ScanConfig {
        recursive: true,
        max_recursion_depth: 2,
        include_status: StatusRanges::parse("200-299").unwrap(),
        ..config
    };
    let executor = Arc::new(
        ScriptedExecutor::new(Scripted::new(404, "not found"))
            .route("api/", Scripted::new(200, "api root directory index"))
            .route("api/v2/", Scripted::new(200, "api v2 directory index page"))
            .route("api/v2/users", Scripted::new(200, "the users collection listing")),
    );

    let (records, _) = run_scan(config, executor.clone()).await;

    let mut found = paths(&records);
    found.sort();
    assert_eq!(found, vec!["api/", "api/v2/", "api/v2/users"]);

    let users = records.iter().find(|r| r.path == "api/v2/users").unwrap();
    assert_eq!(users.depth, 2);

    // nothing was probed beyond the depth limit
    assert!(executor
        .requests()
        .iter()
        .all(|p| !p.starts_with("api/v2/users/")));
    assert!(records.iter().all(|r| r.depth <= 2));
}

#[tokio::test]
async fn skip_on_status_drops_the_target_immediately() {
    let config = test_config("skip-status", &["tarpit", "a", "b", "c"]);
    let config = ScanConfig {
        threads: 1,
        skip_on_status: StatusRanges::parse("429").unwrap(),
        ..config
    };
    let executor = Arc::new(
        ScriptedExecutor::new(Scripted::new(404, "not found"))
            .route("tarpit", Scripted::new(429, "slow down")),
    );

    let (records, summary) = run_scan(config, executor.clone()).await;

    assert_eq!(executor.requests(), vec!["tarpit"]);
    assert!(records.is_empty());
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn mutation_finds_backup_neighbors_without_recursing_on_them() {
    let config = test_config("mutation", &["config"]);
    let config = ScanConfig {
        mutation: true,
        include_status: StatusRanges::parse("200-299").unwrap(),
        ..config
    };
    let executor = Arc::new(
        ScriptedExecutor::new(Scripted::new(404, "not found"))
            .route("config", Scripted::new(200, "the live configuration endpoint"))
            .route("config.bak", Scripted::new(200, "stale configuration backup dump")),
    );

    let (records, _) = run_scan(config, executor.clone()).await;

    assert!(records.iter().any(|r| r.path == "config.bak"));
    // variants of variants are never generated
    let probed = executor.requests();
    assert!(probed.iter().all(|p| !p.contains(".bak.")));
    assert!(probed.iter().all(|p| !p.ends_with(".bak~")));
}

#[tokio::test]
async fn exhausted_transports_drop_candidates_silently() {
    let config = test_config("transport-drop", &["a", "b", "c"]);
    let config = ScanConfig {
        retries: 0,
        ..config
    };
    let executor = Arc::new(ScriptedExecutor::failing());

    let (records, summary) = run_scan(config, executor).await;

    assert!(records.is_empty());
    assert_eq!(summary.reports[0].stats.transport_errors, 3);
    assert!(!summary.fatal_transport);
    assert!(summary.any_target_completed());
}

#[tokio::test]
async fn exit_on_error_escalates_transport_failures() {
    let config = test_config("transport-fatal", &["a", "b", "c"]);
    let config = ScanConfig {
        retries: 0,
        exit_on_error: true,
        ..config
    };
    let executor = Arc::new(ScriptedExecutor::failing());

    let (records, summary) = run_scan(config, executor).await;

    assert!(records.is_empty());
    assert!(summary.fatal_transport);
}

#[tokio::test]
async fn global_rate_limit_spreads_requests_over_time() {
    let entries: Vec<String> = (0..10).map(|i| format!("rate{i}")).collect();
    let entry_refs: Vec<&str> = entries.iter().map(String::as_str).collect();
    let config = test_config("rate-limit", &entry_refs);
    let config = ScanConfig {
        max_rate: 20,
        threads: 8,
        ..config
    };
    let executor = Arc::new(ScriptedExecutor::new(Scripted::new(404, "not found")));

    let started = std::time::Instant::now();
    let (_, summary) = run_scan(config, executor.clone()).await;
    let elapsed = started.elapsed();

    assert_eq!(executor.requests().len(), 10);
    // nine tokens behind the first, fifty milliseconds apart
    assert!(elapsed >= Duration::from_millis(400), "elapsed {elapsed:?}");
    assert!(summary.any_target_completed());
}

#[tokio::test]
async fn candidates_are_probed_at_most_once_per_target() {
    let config = test_config("unique", &["admin", "admin", "ADMIN"]);
    let config = ScanConfig {
        lowercase: true,
        ..config
    };
    let executor = Arc::new(ScriptedExecutor::new(Scripted::new(404, "not found")));

    let _ = run_scan(config, executor.clone()).await;

    // both raw entries lowercase to the same candidate
    assert_eq!(executor.requests(), vec!["admin"]);
}
