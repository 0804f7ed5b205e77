use crate::cli::args::CliArgs;
use crate::utils;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if args.url.is_empty() && args.url_file.is_none() && !args.stdin && args.raw.is_none() {
        return Err("no targets provided (use -u, -l, --stdin, or --raw)".to_string());
    }
    if args.wordlist.is_empty() {
        return Err("a wordlist is required (use -w)".to_string());
    }
    for path in args.wordlist.iter() {
        let expanded = crate::config::expand_tilde(path);
        if std::fs::metadata(&expanded).is_err() {
            return Err(format!("unreadable wordlist '{path}'"));
        }
    }
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err("invalid --threads, expected positive integer".to_string());
        }
    }
    if let Some(depth) = args.max_recursion_depth {
        if depth == 0 && (args.recursive || args.deep_recursive || args.force_recursive) {
            return Err("invalid --max-recursion-depth, expected positive integer".to_string());
        }
    }
    if args.overwrite_extensions && args.force_extensions {
        return Err("use either --force-extensions or --overwrite-extensions, not both".to_string());
    }
    if (args.force_extensions || args.overwrite_extensions) && args.extensions.is_none() {
        return Err("extension flags require -e/--extensions".to_string());
    }
    for (flag, value) in [
        ("--include-status", args.include_status.as_deref()),
        ("--exclude-status", args.exclude_status.as_deref()),
        ("--recursion-status", args.recursion_status.as_deref()),
        ("--skip-on-status", args.skip_on_status.as_deref()),
    ] {
        if let Some(raw) = value {
            utils::StatusRanges::parse(raw).map_err(|e| format!("invalid {flag} '{raw}': {e}"))?;
        }
    }
    if let Some(raw) = args.extensions.as_deref() {
        utils::parse_extensions_csv(raw).map_err(|e| format!("invalid --extensions '{raw}': {e}"))?;
    }
    if let Some(raw) = args.exclude_extensions.as_deref() {
        utils::parse_extensions_csv(raw)
            .map_err(|e| format!("invalid --exclude-extensions '{raw}': {e}"))?;
    }
    if let Some(raw) = args.exclude_sizes.as_deref() {
        utils::parse_usize_csv(raw).map_err(|e| format!("invalid --exclude-sizes '{raw}': {e}"))?;
    }
    if let Some(raw) = args.exclude_regex.as_deref() {
        regex::Regex::new(raw).map_err(|e| format!("invalid --exclude-regex: {e}"))?;
    }
    if let Some(raw) = args.exclude_redirect.as_deref() {
        regex::Regex::new(raw).map_err(|e| format!("invalid --exclude-redirect: {e}"))?;
    }
    for header in args.header.iter() {
        if !header.contains(':') {
            return Err(format!("invalid header '{header}', expected 'Key: Value'"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use std::path::PathBuf;

    fn wordlist() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pathscout-cli-{}.txt", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"admin\n").unwrap();
        path
    }

    fn parse(extra: &[&str]) -> CliArgs {
        let wl = wordlist();
        let wl = wl.to_str().unwrap();
        let mut argv = vec!["pathscout", "-u", "http://t/", "-w", wl];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn minimal_invocation_validates() {
        assert!(validate(&parse(&[])).is_ok());
    }

    #[test]
    fn missing_targets_are_rejected() {
        let wl = wordlist();
        let args = CliArgs::parse_from(["pathscout", "-w", wl.to_str().unwrap()]);
        assert!(validate(&args).is_err());
    }

    #[test]
    fn bad_status_sets_are_rejected() {
        assert!(validate(&parse(&["-i", "200-abc"])).is_err());
        assert!(validate(&parse(&["--skip-on-status", "9xx"])).is_err());
        assert!(validate(&parse(&["-i", "200-299,403"])).is_ok());
    }

    #[test]
    fn extension_flags_require_extensions() {
        assert!(validate(&parse(&["-f"])).is_err());
        assert!(validate(&parse(&["-f", "-e", "php"])).is_ok());
    }

    #[test]
    fn conflicting_extension_modes_are_rejected() {
        assert!(validate(&parse(&["-f", "--overwrite-extensions", "-e", "php"])).is_err());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(validate(&parse(&["-H", "NoColonHere"])).is_err());
        assert!(validate(&parse(&["-H", "X-Probe: 1"])).is_ok());
    }
}
