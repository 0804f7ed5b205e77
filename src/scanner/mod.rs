//! The scan coordinator: owns per-target lifecycle, the bounded candidate
//! queue, the worker pool, and the feedback loops that turn survivors into
//! new work (mutations first, then recursion).

pub mod recursion;

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task;
use tokio::time::Instant;

use crate::calibrate::{self, CalibrationData, CalibrationError};
use crate::classify::filters::FilterChain;
use crate::classify::waf::SignatureDb;
use crate::classify::Classifier;
use crate::config::ScanConfig;
use crate::executor::{RequestExecutor, RequestSpec, ResponseSummary, TransportError};
use crate::limiter::{global_limiter, DirectLimiter, RateGate};
use crate::mutator;
use crate::sink::{ResultRecord, Sink};
use crate::utils;
use crate::wordlist::expander::{Candidate, CandidateOrigin, DictionaryExpander, ExpandRules};
use crate::wordlist::{CaseTransforms, WordlistStream};
use recursion::RecursionController;

const QUEUE_FACTOR: usize = 4;
const WORKER_CHANNEL_BOUND: usize = 4;
const GRACE: Duration = Duration::from_secs(2);
const BACKOFF_BASE_MS: u64 = 250;
const BACKOFF_CAP_MS: u64 = 4_000;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no targets provided")]
    NoTargets,

    #[error("a wordlist is required")]
    MissingWordlist,

    #[error("invalid exclude regex: {source}")]
    ExcludeRegex {
        #[source]
        source: regex::Error,
    },

    #[error("invalid redirect regex: {source}")]
    RedirectRegex {
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target URL: {url}")]
    InvalidUrl { url: String },

    #[error("calibration failed: {source}")]
    Calibration {
        #[from]
        source: CalibrationError,
    },

    #[error("transport failure was fatal")]
    FatalTransport,
}

#[derive(Debug, Default)]
pub struct ScanStats {
    pub requests: AtomicU64,
    pub retries: AtomicU64,
    pub transport_errors: AtomicU64,
    pub filtered: AtomicU64,
    pub delivered: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub retries: u64,
    pub transport_errors: u64,
    pub filtered: u64,
    pub delivered: u64,
}

impl ScanStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Everything the coordinator owns for one target's lifetime.
pub struct TargetContext {
    pub base_url: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub transport: Arc<dyn RequestExecutor>,
    pub calibration: Option<Arc<CalibrationData>>,
    pub stats: Arc<ScanStats>,
    pub deadline: Option<Instant>,
}

#[derive(Clone, Debug)]
pub struct TargetReport {
    pub base_url: String,
    pub completed: bool,
    pub skipped: Option<String>,
    pub stats: StatsSnapshot,
    pub pending_prefixes: Vec<(String, usize)>,
}

#[derive(Debug)]
pub struct ScanSummary {
    pub reports: Vec<TargetReport>,
    pub interrupted: bool,
    pub fatal_transport: bool,
    pub elapsed: Duration,
}

impl ScanSummary {
    pub fn any_target_completed(&self) -> bool {
        self.reports.iter().any(|r| r.completed)
    }
}

pub struct Scanner {
    config: Arc<ScanConfig>,
    executor: Arc<dyn RequestExecutor>,
    sinks: Arc<Vec<Arc<dyn Sink>>>,
    db: Arc<SignatureDb>,
    pb: ProgressBar,
    global: Option<Arc<DirectLimiter>>,
    exclude_regex: Option<Regex>,
    exclude_redirect: Option<Regex>,
    method: reqwest::Method,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        executor: Arc<dyn RequestExecutor>,
        sinks: Vec<Arc<dyn Sink>>,
        db: Arc<SignatureDb>,
        pb: ProgressBar,
    ) -> Result<Self, ScanError> {
        if config.targets.is_empty() {
            return Err(ScanError::NoTargets);
        }
        if config.wordlists.is_empty() {
            return Err(ScanError::MissingWordlist);
        }
        let exclude_regex = match config.exclude_regex.as_deref() {
            Some(pattern) => {
                Some(Regex::new(pattern).map_err(|source| ScanError::ExcludeRegex { source })?)
            }
            None => None,
        };
        let exclude_redirect = match config.exclude_redirect.as_deref() {
            Some(pattern) => {
                Some(Regex::new(pattern).map_err(|source| ScanError::RedirectRegex { source })?)
            }
            None => None,
        };
        let global = global_limiter(config.max_rate);
        let method = reqwest::Method::from_bytes(config.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        Ok(Self {
            config: Arc::new(config),
            executor,
            sinks: Arc::new(sinks),
            db,
            pb,
            global,
            exclude_regex,
            exclude_redirect,
            method,
        })
    }

    /// Drives all configured targets in input order. `external_cancel` is
    /// the interrupt signal from the embedding application.
    pub async fn run(&self, external_cancel: watch::Receiver<bool>) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();

        let (scan_cancel_tx, scan_cancel_rx) = watch::channel(false);
        let scan_cancel_tx = Arc::new(scan_cancel_tx);
        let scan_deadline = self
            .config
            .max_time
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let forwarder = {
            let mut external = external_cancel.clone();
            let tx = scan_cancel_tx.clone();
            task::spawn(async move {
                match scan_deadline {
                    Some(deadline) => {
                        tokio::select! {
                            _ = cancelled(&mut external) => {}
                            _ = tokio::time::sleep_until(deadline) => {}
                        }
                    }
                    None => cancelled(&mut external).await,
                }
                let _ = tx.send(true);
            })
        };

        let mut reports: Vec<TargetReport> = Vec::new();
        let mut fatal_transport = false;

        for target in self.config.targets.iter() {
            if *scan_cancel_rx.borrow() {
                break;
            }
            match self.scan_target(target, scan_cancel_rx.clone()).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    self.pb.println(format!("skipping {target}: {err}"));
                    let is_fatal = matches!(err, TargetError::FatalTransport);
                    reports.push(TargetReport {
                        base_url: target.clone(),
                        completed: false,
                        skipped: Some(err.to_string()),
                        stats: StatsSnapshot::default(),
                        pending_prefixes: Vec::new(),
                    });
                    // with exit-on-error every non-fatal target error
                    // escalates to a scan-fatal one
                    if is_fatal || self.config.exit_on_error {
                        fatal_transport = true;
                        break;
                    }
                }
            }
        }

        forwarder.abort();
        for sink in self.sinks.iter() {
            let _ = sink.flush();
        }

        Ok(ScanSummary {
            reports,
            interrupted: *external_cancel.borrow(),
            fatal_transport,
            elapsed: started.elapsed(),
        })
    }

    async fn scan_target(
        &self,
        target: &str,
        scan_cancel: watch::Receiver<bool>,
    ) -> Result<TargetReport, TargetError> {
        let parsed = reqwest::Url::parse(target).map_err(|_| TargetError::InvalidUrl {
            url: target.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| TargetError::InvalidUrl {
                url: target.to_string(),
            })?
            .to_string();
        let base_url = if target.ends_with('/') {
            target.to_string()
        } else {
            format!("{target}/")
        };

        self.pb.println(format!("starting scan against {base_url}"));

        // per-target cancellation, fed by the scan signal, the target
        // deadline, and skip-on-status hits inside workers
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let deadline = self
            .config
            .target_max_time
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let forwarder = {
            let mut scan_cancel = scan_cancel.clone();
            let tx = cancel_tx.clone();
            task::spawn(async move {
                match deadline {
                    Some(deadline) => {
                        tokio::select! {
                            _ = cancelled(&mut scan_cancel) => {}
                            _ = tokio::time::sleep_until(deadline) => {}
                        }
                    }
                    None => cancelled(&mut scan_cancel).await,
                }
                let _ = tx.send(true);
            })
        };

        let gate = Arc::new(RateGate::new(self.global.clone(), self.config.delay()));
        let headers = self.config.request_headers();
        let stats = Arc::new(ScanStats::default());

        let calibration = if self.config.calibration_enabled() {
            let result = calibrate::calibrate(
                self.executor.as_ref(),
                &gate,
                &base_url,
                "",
                self.config.extensions.first().map(String::as_str),
                &headers,
                self.config.timeout(),
            )
            .await;
            match result {
                Ok(data) => Some(Arc::new(data)),
                Err(source) => {
                    forwarder.abort();
                    return Err(TargetError::Calibration { source });
                }
            }
        } else {
            None
        };

        let ctx = TargetContext {
            base_url: base_url.clone(),
            scheme: parsed.scheme().to_string(),
            host,
            port: parsed.port(),
            headers,
            transport: self.executor.clone(),
            calibration,
            stats,
            deadline,
        };

        let similarity_ref = self.fetch_similarity_reference(&ctx, &gate).await;
        let chain = FilterChain {
            include_status: self.config.include_status.clone(),
            exclude_status: self.config.exclude_status.clone(),
            min_size: self.config.min_response_size,
            max_size: self.config.max_response_size,
            exclude_sizes: self.config.exclude_sizes.iter().copied().collect(),
            exclude_text: self.config.exclude_text.clone(),
            exclude_regex: self.exclude_regex.clone(),
            exclude_redirect: self.exclude_redirect.clone(),
            similarity_ref,
        };
        let classifier = Arc::new(Classifier::new(
            chain,
            self.db.clone(),
            self.config.filter_threshold,
        ));
        let controller = Arc::new(RecursionController {
            enabled: self.config.recursion_enabled(),
            force: self.config.force_recursive,
            deep: self.config.deep_recursive,
            statuses: self.config.recursion_status.clone(),
            max_depth: self.config.max_recursion_depth,
            exclude_subdirs: self.config.exclude_subdirs.clone(),
        });

        let fatal = Arc::new(AtomicBool::new(false));
        let seen: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(String::new());
        let mut pending: VecDeque<(String, usize)> = VecDeque::new();
        pending.push_back((String::new(), 0));

        while let Some((prefix, depth)) = pending.pop_front() {
            if *cancel_rx.borrow() {
                pending.push_front((prefix, depth));
                break;
            }

            let pass_calibration = self.pass_calibration(&ctx, &gate, &prefix, depth).await;

            let outcome = self
                .run_pass(
                    &ctx,
                    PassFeed::Dictionary {
                        prefix: prefix.clone(),
                        depth,
                    },
                    pass_calibration.clone(),
                    &gate,
                    &classifier,
                    &controller,
                    &fatal,
                    &seen,
                    &cancel_tx,
                    cancel_rx.clone(),
                )
                .await;

            // derived candidates: the mutation wave runs before any queued
            // sub-scan starts
            if !outcome.mutations.is_empty() && !*cancel_rx.borrow() {
                self.run_pass(
                    &ctx,
                    PassFeed::Candidates(outcome.mutations),
                    pass_calibration,
                    &gate,
                    &classifier,
                    &controller,
                    &fatal,
                    &seen,
                    &cancel_tx,
                    cancel_rx.clone(),
                )
                .await;
            }

            for (discovered, sub_depth) in outcome.discovered {
                if visited.insert(discovered.clone()) {
                    pending.push_back((discovered, sub_depth));
                }
            }
        }

        forwarder.abort();

        if fatal.load(Ordering::Relaxed) {
            return Err(TargetError::FatalTransport);
        }

        Ok(TargetReport {
            base_url,
            completed: pending.is_empty(),
            skipped: None,
            stats: ctx.stats.snapshot(),
            pending_prefixes: pending.into_iter().collect(),
        })
    }

    /// Picks the wildcard profile for one prefix pass: the target root's
    /// profile by default, a fresh per-directory probe round under
    /// `--calibration`. A failed probe round keeps the root baseline
    /// rather than aborting a scan that is already under way.
    async fn pass_calibration(
        &self,
        ctx: &TargetContext,
        gate: &Arc<RateGate>,
        prefix: &str,
        depth: usize,
    ) -> Option<Arc<CalibrationData>> {
        if depth == 0 || !self.config.recalibrate_per_directory() {
            return ctx.calibration.clone();
        }
        let result = calibrate::calibrate(
            ctx.transport.as_ref(),
            gate,
            &ctx.base_url,
            prefix,
            self.config.extensions.first().map(String::as_str),
            &ctx.headers,
            self.config.timeout(),
        )
        .await;
        match result {
            Ok(data) => Some(Arc::new(data)),
            Err(err) => {
                self.pb.println(format!(
                    "recalibration under {prefix} failed ({err}), keeping target baseline"
                ));
                ctx.calibration.clone()
            }
        }
    }

    async fn fetch_similarity_reference(
        &self,
        ctx: &TargetContext,
        gate: &RateGate,
    ) -> Option<ResponseSummary> {
        let path = self.config.exclude_response.as_ref()?;
        gate.acquire().await;
        let spec = RequestSpec {
            method: self.method.clone(),
            url: utils::join_url(&ctx.base_url, path),
            path: path.clone(),
            headers: ctx.headers.clone(),
            body: None,
            follow_redirects: self.config.follow_redirects,
            timeout: self.config.timeout(),
        };
        match ctx.transport.execute(&spec).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                self.pb
                    .println(format!("could not fetch similarity reference {path}: {err}"));
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pass(
        &self,
        ctx: &TargetContext,
        feed: PassFeed,
        calibration: Option<Arc<CalibrationData>>,
        gate: &Arc<RateGate>,
        classifier: &Arc<Classifier>,
        controller: &Arc<RecursionController>,
        fatal: &Arc<AtomicBool>,
        seen: &Arc<Mutex<HashSet<String>>>,
        cancel_tx: &Arc<watch::Sender<bool>>,
        cancel_rx: watch::Receiver<bool>,
    ) -> PassOutcome {
        let worker_count = self.config.threads.max(1);
        let (cand_tx, mut cand_rx) =
            mpsc::channel::<Candidate>(QUEUE_FACTOR * worker_count);
        let (delivery_tx, mut delivery_rx) = mpsc::channel::<ResultRecord>(256);
        let (mutation_tx, mut mutation_rx) = mpsc::channel::<Candidate>(1024);
        let (discovery_tx, mut discovery_rx) = mpsc::channel::<(String, usize)>(1024);

        // dedicated producer so workers never block on disk reads
        let producer = {
            let config = self.config.clone();
            let seen = seen.clone();
            let mut cancel = cancel_rx.clone();
            let pb = self.pb.clone();
            task::spawn(async move {
                match feed {
                    PassFeed::Dictionary { prefix, depth } => {
                        let origin = if prefix.is_empty() {
                            CandidateOrigin::Seed
                        } else {
                            CandidateOrigin::Recursion
                        };
                        let expander = DictionaryExpander::new(ExpandRules {
                            extensions: config.extensions.clone(),
                            force_extensions: config.force_extensions,
                            overwrite_extensions: config.overwrite_extensions,
                            exclude_extensions: config.exclude_extensions.clone(),
                            prefixes: config.prefixes.clone(),
                            suffixes: config.suffixes.clone(),
                        });
                        let transforms = CaseTransforms {
                            uppercase: config.uppercase,
                            lowercase: config.lowercase,
                            capital: config.capital,
                        };
                        let mut stream =
                            WordlistStream::new(config.wordlists.clone(), transforms);
                        'outer: loop {
                            let entry = match stream.next_entry().await {
                                Ok(Some(entry)) => entry,
                                Ok(None) => break,
                                Err(err) => {
                                    pb.println(format!("wordlist read failed: {err}"));
                                    break;
                                }
                            };
                            for mut candidate in expander.expand(&entry, depth, origin) {
                                candidate.path = format!("{prefix}{}", candidate.path);
                                if !insert_seen(&seen, &candidate.path) {
                                    continue;
                                }
                                tokio::select! {
                                    sent = cand_tx.send(candidate) => {
                                        if sent.is_err() {
                                            break 'outer;
                                        }
                                    }
                                    _ = cancelled(&mut cancel) => break 'outer,
                                }
                            }
                        }
                    }
                    PassFeed::Candidates(candidates) => {
                        for candidate in candidates {
                            if !insert_seen(&seen, &candidate.path) {
                                continue;
                            }
                            tokio::select! {
                                sent = cand_tx.send(candidate) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                                _ = cancelled(&mut cancel) => break,
                            }
                        }
                    }
                }
            })
        };

        // round-robin fan-out to per-worker channels
        let mut worker_rxs = Vec::with_capacity(worker_count);
        let mut worker_txs = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (tx, rx) = mpsc::channel::<Candidate>(WORKER_CHANNEL_BOUND);
            worker_txs.push(tx);
            worker_rxs.push(rx);
        }
        let dispatcher = task::spawn(async move {
            let mut idx = 0usize;
            while let Some(candidate) = cand_rx.recv().await {
                if worker_txs.is_empty() {
                    break;
                }
                let tx = worker_txs[idx % worker_txs.len()].clone();
                let _ = tx.send(candidate).await;
                idx = idx.wrapping_add(1);
            }
        });

        let pass_ctx = Arc::new(PassContext {
            config: self.config.clone(),
            executor: ctx.transport.clone(),
            classifier: classifier.clone(),
            calibration,
            controller: controller.clone(),
            gate: gate.clone(),
            stats: ctx.stats.clone(),
            delivery_tx,
            mutation_tx,
            discovery_tx,
            cancel_tx: cancel_tx.clone(),
            fatal: fatal.clone(),
            base_url: ctx.base_url.clone(),
            headers: ctx.headers.clone(),
            method: self.method.clone(),
            pb: self.pb.clone(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for rx in worker_rxs {
            let ctx = pass_ctx.clone();
            let cancel = cancel_rx.clone();
            workers.push(task::spawn(worker_loop(ctx, rx, cancel)));
        }
        drop(pass_ctx);

        let sinks = self.sinks.clone();
        let stats = ctx.stats.clone();
        let pb = self.pb.clone();
        let delivery = task::spawn(async move {
            let mut failed: HashSet<&'static str> = HashSet::new();
            while let Some(record) = delivery_rx.recv().await {
                for sink in sinks.iter() {
                    if let Err(err) = sink.deliver(&record) {
                        if failed.insert(sink.name()) {
                            pb.println(format!("sink {} failed: {err}", sink.name()));
                        }
                    }
                }
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
        });

        let mutation_collect = task::spawn(async move {
            let mut out: Vec<Candidate> = Vec::new();
            while let Some(candidate) = mutation_rx.recv().await {
                out.push(candidate);
            }
            out
        });
        let discovery_collect = task::spawn(async move {
            let mut out: Vec<(String, usize)> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            while let Some((prefix, depth)) = discovery_rx.recv().await {
                if seen.insert(prefix.clone()) {
                    out.push((prefix, depth));
                }
            }
            out
        });

        let _ = producer.await;
        let _ = dispatcher.await;
        for worker in workers {
            let _ = worker.await;
        }
        let _ = delivery.await;
        let mutations = mutation_collect.await.unwrap_or_default();
        let discovered = discovery_collect.await.unwrap_or_default();

        PassOutcome {
            mutations,
            discovered,
        }
    }
}

enum PassFeed {
    Dictionary { prefix: String, depth: usize },
    Candidates(Vec<Candidate>),
}

struct PassOutcome {
    mutations: Vec<Candidate>,
    discovered: Vec<(String, usize)>,
}

struct PassContext {
    config: Arc<ScanConfig>,
    executor: Arc<dyn RequestExecutor>,
    classifier: Arc<Classifier>,
    calibration: Option<Arc<CalibrationData>>,
    controller: Arc<RecursionController>,
    gate: Arc<RateGate>,
    stats: Arc<ScanStats>,
    delivery_tx: mpsc::Sender<ResultRecord>,
    mutation_tx: mpsc::Sender<Candidate>,
    discovery_tx: mpsc::Sender<(String, usize)>,
    cancel_tx: Arc<watch::Sender<bool>>,
    fatal: Arc<AtomicBool>,
    base_url: String,
    headers: Vec<(String, String)>,
    method: reqwest::Method,
    pb: ProgressBar,
}

fn insert_seen(seen: &Arc<Mutex<HashSet<String>>>, path: &str) -> bool {
    let mut guard = match seen.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.insert(path.to_string())
}

async fn worker_loop(
    ctx: Arc<PassContext>,
    mut rx: mpsc::Receiver<Candidate>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        if *cancel.borrow() {
            break;
        }
        let candidate = tokio::select! {
            next = rx.recv() => match next {
                Some(candidate) => candidate,
                None => break,
            },
            _ = cancelled(&mut cancel) => break,
        };

        tokio::select! {
            _ = ctx.gate.acquire() => {}
            _ = cancelled(&mut cancel) => break,
        }

        let url = utils::join_url(&ctx.base_url, &candidate.path);
        let spec = RequestSpec {
            method: ctx.method.clone(),
            url: url.clone(),
            path: candidate.path.clone(),
            headers: ctx.headers.clone(),
            body: None,
            follow_redirects: ctx.config.follow_redirects,
            timeout: ctx.config.timeout(),
        };

        ctx.stats.requests.fetch_add(1, Ordering::Relaxed);
        let summary = match execute_with_retry(
            ctx.executor.as_ref(),
            &spec,
            ctx.config.retries,
            &ctx.stats,
            &mut cancel,
        )
        .await
        {
            ExecOutcome::Response(summary) => summary,
            ExecOutcome::Cancelled => break,
            ExecOutcome::Failed(err) => {
                ctx.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
                if ctx.config.exit_on_error {
                    ctx.fatal.store(true, Ordering::Relaxed);
                    if !ctx.cancel_tx.send_replace(true) {
                        ctx.pb.println(format!("fatal transport error on {url}: {err}"));
                    }
                    break;
                }
                ResponseSummary::transport_failure(&url)
            }
        };

        if summary.status != 0 && ctx.config.skip_on_status.contains(summary.status) {
            if !ctx.cancel_tx.send_replace(true) {
                ctx.pb.println(format!(
                    "status {} on {url} matched skip-on-status, dropping target",
                    summary.status
                ));
            }
            break;
        }

        ctx.pb.inc(1);
        let classification = ctx
            .classifier
            .classify(&summary, ctx.calibration.as_deref());
        if !classification.keep {
            ctx.stats.filtered.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let record = ResultRecord::new(
            &ctx.base_url,
            &candidate.path,
            candidate.depth,
            &classification,
            &summary,
        );
        if ctx.delivery_tx.send(record).await.is_err() {
            continue;
        }

        if ctx.config.mutation && candidate.origin != CandidateOrigin::Mutation {
            for variant in mutator::mutate(&candidate.path) {
                let mutated = Candidate {
                    path: variant,
                    extension: None,
                    depth: candidate.depth,
                    origin: CandidateOrigin::Mutation,
                };
                if ctx.mutation_tx.send(mutated).await.is_err() {
                    break;
                }
            }
        }

        if ctx
            .controller
            .should_recurse(&candidate, summary.status, &candidate.path)
        {
            let prefix = if candidate.path.ends_with('/') {
                candidate.path.clone()
            } else {
                format!("{}/", candidate.path)
            };
            let _ = ctx.discovery_tx.send((prefix, candidate.depth + 1)).await;
        }

        if ctx.controller.enabled
            && ctx.controller.deep
            && candidate.origin != CandidateOrigin::Mutation
            && ctx.controller.statuses.contains(summary.status)
            && candidate.depth < ctx.controller.max_depth
        {
            for ancestor in RecursionController::ancestors(&candidate.path) {
                if !ctx.controller.subdir_excluded(&ancestor) {
                    let _ = ctx
                        .discovery_tx
                        .send((ancestor, candidate.depth + 1))
                        .await;
                }
            }
        }
    }
}

enum ExecOutcome {
    Response(ResponseSummary),
    Cancelled,
    Failed(TransportError),
}

/// Runs one request with the retry policy: transport failures back off
/// exponentially with full jitter; HTTP responses are never retried. After
/// cancellation an in-flight request gets a short grace window to finish.
async fn execute_with_retry(
    executor: &dyn RequestExecutor,
    spec: &RequestSpec,
    retries: u32,
    stats: &ScanStats,
    cancel: &mut watch::Receiver<bool>,
) -> ExecOutcome {
    let mut attempt: u32 = 0;
    loop {
        let mut fut = executor.execute(spec);
        let result = tokio::select! {
            result = &mut fut => Some(result),
            _ = cancelled(cancel) => tokio::time::timeout(GRACE, &mut fut).await.ok(),
        };
        let result = match result {
            Some(result) => result,
            None => return ExecOutcome::Cancelled,
        };
        match result {
            Ok(mut summary) => {
                summary.retry_count = attempt;
                return ExecOutcome::Response(summary);
            }
            Err(err) if err.is_retryable() && attempt < retries => {
                attempt += 1;
                stats.retries.fetch_add(1, Ordering::Relaxed);
                let delay = backoff_delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancelled(cancel) => return ExecOutcome::Cancelled,
                }
            }
            Err(err) => return ExecOutcome::Failed(err),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(6);
    let cap = (BACKOFF_BASE_MS << shift).min(BACKOFF_CAP_MS);
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=cap))
}

/// Resolves when the cancellation signal flips to true. If the sender is
/// gone without firing, no cancellation can ever arrive and this pends
/// forever, which is exactly what select arms want.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    loop {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if *rx.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_respects_base_and_cap() {
        for _ in 0..50 {
            assert!(backoff_delay(1) <= Duration::from_millis(BACKOFF_BASE_MS));
            assert!(backoff_delay(10) <= Duration::from_millis(BACKOFF_CAP_MS));
        }
    }

    #[tokio::test]
    async fn cancelled_resolves_once_signal_fires() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move {
            cancelled(&mut rx).await;
            true
        });
        tx.send(true).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn stats_snapshot_reads_counters() {
        let stats = ScanStats::default();
        stats.requests.fetch_add(3, Ordering::Relaxed);
        stats.filtered.fetch_add(1, Ordering::Relaxed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.filtered, 1);
        assert_eq!(snapshot.delivered, 0);
    }
}
