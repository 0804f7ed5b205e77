use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

use crate::classify::waf::{SignatureDb, SignatureDbError};
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile, ScanConfig};
use crate::executor::raw::{RawRequestTemplate, RawTemplateExecutor};
use crate::executor::{HttpExecutor, RequestExecutor};
use crate::scanner::{ScanSummary, Scanner};
use crate::session::{self, SessionSnapshot};
use crate::sink::{JsonLinesSink, Sink, TerminalSink};
use crate::utils;

pub const EXIT_OK: i32 = 0;
pub const EXIT_CONFIG: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 2;
pub const EXIT_ON_ERROR: i32 = 3;

const DEFAULT_SIGNATURE_DB: &str = "db/waf_signatures.json";

fn print_banner() {
    const BANNER: &str = r#"
                 __  __                           __
    ____  ____ _/ /_/ /_  ______________  __  ___/ /_
   / __ \/ __ `/ __/ __ \/ ___/ ___/ __ \/ / / / __/
  / /_/ / /_/ / /_/ / / (__  ) /__/ /_/ / /_/ / /_
 / .___/\__,_/\__/_/ /_/____/\___/\____/\__,_/\__/
/_/
         v0.4.1 - web-path discovery scanner
"#;
    println!("{BANNER}");
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<12}: {}", label, value);
}

pub fn run_cli() -> i32 {
    let args = CliArgs::parse();
    match run_with_args(args) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{message}");
            EXIT_CONFIG
        }
    }
}

fn run_with_args(args: CliArgs) -> Result<i32, String> {
    validation::validate(&args)?;

    let file = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)
            .map_err(|e| e.to_string())?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true).map_err(|e| e.to_string())?,
            None => ConfigFile::default(),
        },
    };
    let config = build_config(&args, &file)?;

    if config.no_color {
        colored::control::set_override(false);
    }
    if !config.quiet {
        print_banner();
        print_settings(&config);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    runtime.block_on(run_scan(config))
}

async fn run_scan(mut config: ScanConfig) -> Result<i32, String> {
    let pb = if config.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {pos} candidates probed")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let db = load_signature_db(&config, &pb);
    let (executor, inferred_target) = build_executor(&config)?;
    if config.targets.is_empty() {
        if let Some(target) = inferred_target {
            config.targets.push(target);
        }
    }

    let mut sinks: Vec<Arc<dyn Sink>> =
        vec![Arc::new(TerminalSink::new(pb.clone(), config.quiet))];
    if let Some(path) = config.output.as_ref() {
        sinks.push(Arc::new(
            JsonLinesSink::create(path).map_err(|e| e.to_string())?,
        ));
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let session_path = config.session.clone();
    let quiet = config.quiet;
    let scanner = Scanner::new(config, executor, sinks, db, pb.clone())
        .map_err(|e| e.to_string())?;
    let summary = scanner.run(cancel_rx).await.map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    if let Some(path) = session_path {
        let snapshot = SessionSnapshot::from_summary(&summary);
        if let Err(err) = session::save(&path, &snapshot) {
            eprintln!("{err}");
        }
    }
    if !quiet {
        print_summary(&summary);
    }

    Ok(exit_code(&summary))
}

fn exit_code(summary: &ScanSummary) -> i32 {
    if summary.fatal_transport {
        EXIT_ON_ERROR
    } else if summary.interrupted {
        EXIT_INTERRUPTED
    } else if summary.any_target_completed() {
        EXIT_OK
    } else {
        EXIT_CONFIG
    }
}

fn print_settings(config: &ScanConfig) {
    format_kv_line("targets", &config.targets.len().to_string());
    format_kv_line(
        "wordlists",
        &config
            .wordlists
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );
    format_kv_line("threads", &config.threads.to_string());
    if config.max_rate > 0 {
        format_kv_line("max rate", &format!("{}/s", config.max_rate));
    }
    if !config.extensions.is_empty() {
        format_kv_line("extensions", &config.extensions.join(","));
    }
    if config.recursion_enabled() {
        format_kv_line("recursion", &format!("depth {}", config.max_recursion_depth));
    }
    println!();
}

fn print_summary(summary: &ScanSummary) {
    println!();
    for report in summary.reports.iter() {
        let state = if report.completed {
            "completed".to_string()
        } else if let Some(reason) = report.skipped.as_ref() {
            format!("skipped ({reason})")
        } else {
            "stopped early".to_string()
        };
        format_kv_line(&report.base_url, &state);
        format_kv_line(
            "  requests",
            &format!(
                "{} ({} retries, {} transport errors)",
                report.stats.requests, report.stats.retries, report.stats.transport_errors
            ),
        );
        format_kv_line(
            "  results",
            &format!(
                "{} delivered, {} filtered",
                report.stats.delivered, report.stats.filtered
            ),
        );
    }
    format_kv_line("elapsed", &format!("{:.1}s", summary.elapsed.as_secs_f64()));
}

fn load_signature_db(config: &ScanConfig, pb: &ProgressBar) -> Arc<SignatureDb> {
    let default_path = PathBuf::from(DEFAULT_SIGNATURE_DB);
    let path = config.waf_signatures.as_ref().unwrap_or(&default_path);
    match SignatureDb::load(path) {
        Ok(db) => Arc::new(db),
        Err(err) => {
            // a missing default file is fine; anything else gets one warning
            let silent =
                config.waf_signatures.is_none() && matches!(err, SignatureDbError::Read { .. });
            if !silent {
                pb.println(format!(
                    "signature database unusable ({err}), falling back to built-in defaults"
                ));
            }
            Arc::new(SignatureDb::builtin())
        }
    }
}

fn build_executor(
    config: &ScanConfig,
) -> Result<(Arc<dyn RequestExecutor>, Option<String>), String> {
    if let Some(path) = config.raw_request.as_ref() {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read raw request '{}': {e}", path.display()))?;
        let template =
            RawRequestTemplate::parse(&raw).map_err(|e| format!("invalid raw request: {e}"))?;
        let inferred = template
            .base_url()
            .map_err(|e| format!("invalid raw request: {e}"))?;
        let executor = RawTemplateExecutor::new(
            template,
            config.proxy.as_deref(),
            config.timeout(),
            &config.user_agent,
        )
        .map_err(|e| e.to_string())?;
        Ok((Arc::new(executor), Some(inferred)))
    } else {
        let executor =
            HttpExecutor::new(config.proxy.as_deref(), config.timeout(), &config.user_agent)
                .map_err(|e| e.to_string())?;
        Ok((Arc::new(executor), None))
    }
}

fn build_config(args: &CliArgs, file: &ConfigFile) -> Result<ScanConfig, String> {
    let mut config = ScanConfig::default();

    // file values first, CLI wins
    if let Some(urls) = file.urls.as_ref() {
        config.targets = urls.iter().map(|u| u.trim().to_string()).collect();
    }
    if let Some(wordlists) = file.wordlists.as_ref() {
        config.wordlists = wordlists.iter().map(|p| config::expand_tilde(p)).collect();
    }
    apply_file_options(&mut config, file)?;

    let mut targets: Vec<String> = args
        .url
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if let Some(path) = args.url_file.as_deref() {
        let expanded = config::expand_tilde(path);
        let contents = std::fs::read_to_string(&expanded)
            .map_err(|e| format!("failed to read url file '{path}': {e}"))?;
        targets.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    if args.stdin {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = line.map_err(|e| format!("failed to read stdin: {e}"))?;
            let line = line.trim();
            if !line.is_empty() {
                targets.push(line.to_string());
            }
        }
    }
    if !targets.is_empty() {
        config.targets = targets;
    }

    if !args.wordlist.is_empty() {
        config.wordlists = args.wordlist.iter().map(|p| config::expand_tilde(p)).collect();
    }
    if let Some(raw) = args.extensions.as_deref() {
        config.extensions = utils::parse_extensions_csv(raw)?;
    }
    config.force_extensions |= args.force_extensions;
    config.overwrite_extensions |= args.overwrite_extensions;
    if let Some(raw) = args.exclude_extensions.as_deref() {
        config.exclude_extensions = utils::parse_extensions_csv(raw)?;
    }
    if let Some(raw) = args.prefixes.as_deref() {
        config.prefixes = utils::parse_csv(raw);
    }
    if let Some(raw) = args.suffixes.as_deref() {
        config.suffixes = utils::parse_csv(raw);
    }
    config.mutation |= args.mutation;
    config.uppercase |= args.uppercase;
    config.lowercase |= args.lowercase;
    config.capital |= args.capital;

    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config.async_mode |= args.async_mode;
    if let Some(rate) = args.max_rate {
        config.max_rate = rate;
    }
    if let Some(delay) = args.delay {
        config.delay_ms = delay;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_seconds = timeout;
    }
    config.exit_on_error |= args.exit_on_error;
    if args.max_time.is_some() {
        config.max_time = args.max_time;
    }
    if args.target_max_time.is_some() {
        config.target_max_time = args.target_max_time;
    }

    config.recursive |= args.recursive;
    config.deep_recursive |= args.deep_recursive;
    config.force_recursive |= args.force_recursive;
    if let Some(depth) = args.max_recursion_depth {
        config.max_recursion_depth = depth;
    }
    if let Some(raw) = args.recursion_status.as_deref() {
        config.recursion_status = utils::StatusRanges::parse(raw)?;
    }
    if let Some(threshold) = args.filter_threshold {
        config.filter_threshold = threshold;
    }
    if let Some(raw) = args.exclude_subdirs.as_deref() {
        config.exclude_subdirs = utils::parse_csv(raw);
    }

    if let Some(raw) = args.include_status.as_deref() {
        config.include_status = utils::StatusRanges::parse(raw)?;
    }
    if let Some(raw) = args.exclude_status.as_deref() {
        config.exclude_status = utils::StatusRanges::parse(raw)?;
    }
    if let Some(raw) = args.exclude_sizes.as_deref() {
        config.exclude_sizes = utils::parse_usize_csv(raw)?;
    }
    if !args.exclude_text.is_empty() {
        config.exclude_text = args.exclude_text.clone();
    }
    if args.exclude_regex.is_some() {
        config.exclude_regex = args.exclude_regex.clone();
    }
    if args.exclude_redirect.is_some() {
        config.exclude_redirect = args.exclude_redirect.clone();
    }
    if args.exclude_response.is_some() {
        config.exclude_response = args.exclude_response.clone();
    }
    if args.min_response_size.is_some() {
        config.min_response_size = args.min_response_size;
    }
    if args.max_response_size.is_some() {
        config.max_response_size = args.max_response_size;
    }
    config.no_wildcard |= args.no_wildcard;
    config.calibration |= args.calibration;
    if let Some(raw) = args.skip_on_status.as_deref() {
        config.skip_on_status = utils::StatusRanges::parse(raw)?;
    }

    if let Some(ua) = args.user_agent.as_ref() {
        config.user_agent = ua.clone();
    }
    for header in args.header.iter() {
        if let Some((key, value)) = header.split_once(':') {
            config
                .headers
                .push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    if args.cookie.is_some() {
        config.cookie = args.cookie.clone();
    }
    if args.auth.is_some() {
        config.auth = args.auth.clone();
    }
    if args.proxy.is_some() {
        config.proxy = args.proxy.clone();
    }
    config.follow_redirects |= args.follow_redirects;
    if let Some(path) = args.raw.as_deref() {
        config.raw_request = Some(config::expand_tilde(path));
    }
    if let Some(path) = args.waf_signatures.as_deref() {
        config.waf_signatures = Some(config::expand_tilde(path));
    }

    if let Some(path) = args.output.as_deref() {
        config.output = Some(config::expand_tilde(path));
    }
    if let Some(path) = args.session.as_deref() {
        config.session = Some(config::expand_tilde(path));
    }
    config.quiet |= args.quiet;
    config.no_color |= args.no_color;

    Ok(config)
}

fn apply_file_options(config: &mut ScanConfig, file: &ConfigFile) -> Result<(), String> {
    if let Some(raw) = file.extensions.as_deref() {
        config.extensions = utils::parse_extensions_csv(raw)?;
    }
    if let Some(threads) = file.threads {
        config.threads = threads.max(1);
    }
    if let Some(rate) = file.max_rate {
        config.max_rate = rate;
    }
    if let Some(delay) = file.delay {
        config.delay_ms = delay;
    }
    if let Some(retries) = file.retries {
        config.retries = retries;
    }
    if let Some(timeout) = file.timeout {
        config.timeout_seconds = timeout;
    }
    if let Some(ua) = file.user_agent.as_ref() {
        config.user_agent = ua.clone();
    }
    if file.proxy.is_some() {
        config.proxy = file.proxy.clone();
    }
    if let Some(follow) = file.follow_redirects {
        config.follow_redirects = follow;
    }
    if let Some(recursive) = file.recursive {
        config.recursive = recursive;
    }
    if let Some(depth) = file.max_recursion_depth {
        config.max_recursion_depth = depth;
    }
    if let Some(raw) = file.recursion_status.as_deref() {
        config.recursion_status = utils::StatusRanges::parse(raw)?;
    }
    if let Some(threshold) = file.filter_threshold {
        config.filter_threshold = threshold;
    }
    if let Some(raw) = file.include_status.as_deref() {
        config.include_status = utils::StatusRanges::parse(raw)?;
    }
    if let Some(raw) = file.exclude_status.as_deref() {
        config.exclude_status = utils::StatusRanges::parse(raw)?;
    }
    if let Some(no_wildcard) = file.no_wildcard {
        config.no_wildcard = no_wildcard;
    }
    if let Some(path) = file.waf_signatures.as_deref() {
        config.waf_signatures = Some(config::expand_tilde(path));
    }
    if let Some(path) = file.output.as_deref() {
        config.output = Some(config::expand_tilde(path));
    }
    if let Some(path) = file.session.as_deref() {
        config.session = Some(config::expand_tilde(path));
    }
    if let Some(quiet) = file.quiet {
        config.quiet = quiet;
    }
    if let Some(no_color) = file.no_color {
        config.no_color = no_color;
    }
    Ok(())
}
