use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pathscout",
    version,
    about = "concurrent web-path discovery scanner",
    long_about = "Pathscout probes candidate paths from a wordlist against one or more HTTP origins, learns each origin's wildcard behavior, fingerprints WAF and backend responses, and reports the survivors.\n\nExamples:\n  pathscout -u https://target.tld/ -w wordlist.txt\n  pathscout -u https://target.tld/ -w wordlist.txt -e php,html -f -r\n  pathscout -l targets.txt -w wordlist.txt --max-rate 100 -o findings.jsonl"
)]
pub struct CliArgs {
    #[arg(
        short = 'u',
        long = "url",
        value_name = "URL",
        action = ArgAction::Append,
        help_heading = "Input",
        help = "Target URL (repeatable)."
    )]
    pub url: Vec<String>,

    #[arg(
        short = 'l',
        long = "url-file",
        value_name = "FILE",
        help_heading = "Input",
        help = "Load target URLs from a file (one per line)."
    )]
    pub url_file: Option<String>,

    #[arg(
        long = "stdin",
        help_heading = "Input",
        help = "Read target URLs from standard input."
    )]
    pub stdin: bool,

    #[arg(
        long = "raw",
        value_name = "FILE",
        help_heading = "Input",
        help = "Replay a raw HTTP request file; candidate paths are injected at the '*' marker."
    )]
    pub raw: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.pathscout/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        action = ArgAction::Append,
        help_heading = "Dictionary",
        help = "Wordlist file (repeatable)."
    )]
    pub wordlist: Vec<String>,

    #[arg(
        short = 'e',
        long = "extensions",
        value_name = "EXTS",
        help_heading = "Dictionary",
        help = "Extensions for %EXT% substitution and -f (comma-separated)."
    )]
    pub extensions: Option<String>,

    #[arg(
        short = 'f',
        long = "force-extensions",
        help_heading = "Dictionary",
        help = "Append every extension to wordlist entries (directories excluded)."
    )]
    pub force_extensions: bool,

    #[arg(
        long = "overwrite-extensions",
        help_heading = "Dictionary",
        help = "Replace existing entry extensions with the configured ones."
    )]
    pub overwrite_extensions: bool,

    #[arg(
        long = "exclude-extensions",
        value_name = "EXTS",
        help_heading = "Dictionary",
        help = "Drop candidates with these final extensions (comma-separated)."
    )]
    pub exclude_extensions: Option<String>,

    #[arg(
        long = "prefixes",
        value_name = "LIST",
        help_heading = "Dictionary",
        help = "Prepend each prefix to every entry (comma-separated)."
    )]
    pub prefixes: Option<String>,

    #[arg(
        long = "suffixes",
        value_name = "LIST",
        help_heading = "Dictionary",
        help = "Append each suffix to every non-directory entry (comma-separated)."
    )]
    pub suffixes: Option<String>,

    #[arg(
        long = "mutation",
        help_heading = "Dictionary",
        help = "Derive backup, version, and case variants from confirmed hits."
    )]
    pub mutation: bool,

    #[arg(
        long = "uppercase",
        help_heading = "Dictionary",
        help = "Emit wordlist entries uppercased."
    )]
    pub uppercase: bool,

    #[arg(
        long = "lowercase",
        help_heading = "Dictionary",
        help = "Emit wordlist entries lowercased."
    )]
    pub lowercase: bool,

    #[arg(
        long = "capital",
        help_heading = "Dictionary",
        help = "Emit wordlist entries capitalized."
    )]
    pub capital: bool,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "N",
        help_heading = "Scan",
        help = "Worker pool size."
    )]
    pub threads: Option<usize>,

    #[arg(
        short = 'a',
        long = "async",
        help_heading = "Scan",
        help = "Cooperative scheduling mode (the engine is natively asynchronous)."
    )]
    pub async_mode: bool,

    #[arg(
        short = 'r',
        long = "recursive",
        help_heading = "Scan",
        help = "Re-scan discovered directories."
    )]
    pub recursive: bool,

    #[arg(
        long = "deep-recursive",
        help_heading = "Scan",
        help = "Also enqueue unvisited ancestor directories of findings."
    )]
    pub deep_recursive: bool,

    #[arg(
        long = "force-recursive",
        help_heading = "Scan",
        help = "Recurse on non-directory findings too."
    )]
    pub force_recursive: bool,

    #[arg(
        short = 'R',
        long = "max-recursion-depth",
        value_name = "N",
        help_heading = "Scan",
        help = "Hard limit on recursion depth."
    )]
    pub max_recursion_depth: Option<usize>,

    #[arg(
        long = "recursion-status",
        value_name = "CODES",
        help_heading = "Scan",
        help = "Status codes eligible for recursion (e.g. 2xx,3xx)."
    )]
    pub recursion_status: Option<String>,

    #[arg(
        long = "filter-threshold",
        value_name = "N",
        help_heading = "Scan",
        help = "Suppress a response signature after this many kept results (0 disables)."
    )]
    pub filter_threshold: Option<u64>,

    #[arg(
        long = "exclude-subdirs",
        value_name = "DIRS",
        help_heading = "Scan",
        help = "Never recurse under these path prefixes (comma-separated)."
    )]
    pub exclude_subdirs: Option<String>,

    #[arg(
        short = 'i',
        long = "include-status",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Report only these status codes (e.g. 200-299,403)."
    )]
    pub include_status: Option<String>,

    #[arg(
        short = 'x',
        long = "exclude-status",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Drop these status codes (e.g. 404,5xx)."
    )]
    pub exclude_status: Option<String>,

    #[arg(
        long = "exclude-sizes",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Drop responses with these exact body sizes (comma-separated)."
    )]
    pub exclude_sizes: Option<String>,

    #[arg(
        long = "exclude-text",
        value_name = "TEXT",
        action = ArgAction::Append,
        help_heading = "Filters",
        help = "Drop responses whose body contains this text (repeatable)."
    )]
    pub exclude_text: Vec<String>,

    #[arg(
        long = "exclude-regex",
        value_name = "REGEX",
        help_heading = "Filters",
        help = "Drop responses whose body matches this regex."
    )]
    pub exclude_regex: Option<String>,

    #[arg(
        long = "exclude-redirect",
        value_name = "REGEX",
        help_heading = "Filters",
        help = "Drop responses redirecting to a matching target."
    )]
    pub exclude_redirect: Option<String>,

    #[arg(
        long = "exclude-response",
        value_name = "PATH",
        help_heading = "Filters",
        help = "Drop responses similar to the one served at this path."
    )]
    pub exclude_response: Option<String>,

    #[arg(
        long = "min-response-size",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Drop responses smaller than this."
    )]
    pub min_response_size: Option<usize>,

    #[arg(
        long = "max-response-size",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Drop responses larger than this."
    )]
    pub max_response_size: Option<usize>,

    #[arg(
        long = "no-wildcard",
        help_heading = "Filters",
        help = "Disable wildcard calibration and suppression."
    )]
    pub no_wildcard: bool,

    #[arg(
        long = "calibration",
        help_heading = "Filters",
        help = "Recalibrate wildcard detection inside each recursed directory."
    )]
    pub calibration: bool,

    #[arg(
        long = "skip-on-status",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Drop the whole target as soon as one of these statuses is seen."
    )]
    pub skip_on_status: Option<String>,

    #[arg(
        long = "max-time",
        value_name = "SECONDS",
        help_heading = "Runtime",
        help = "Overall scan deadline."
    )]
    pub max_time: Option<u64>,

    #[arg(
        long = "target-max-time",
        value_name = "SECONDS",
        help_heading = "Runtime",
        help = "Per-target deadline."
    )]
    pub target_max_time: Option<u64>,

    #[arg(
        long = "exit-on-error",
        help_heading = "Runtime",
        help = "Treat unrecoverable target and transport errors as fatal."
    )]
    pub exit_on_error: bool,

    #[arg(
        long = "max-rate",
        value_name = "RPS",
        help_heading = "Runtime",
        help = "Global request rate limit (0 = unlimited)."
    )]
    pub max_rate: Option<u32>,

    #[arg(
        long = "retries",
        value_name = "N",
        help_heading = "Runtime",
        help = "Transport retry attempts per request."
    )]
    pub retries: Option<u32>,

    #[arg(
        long = "delay",
        value_name = "MS",
        help_heading = "Runtime",
        help = "Minimum gap between requests to the same target."
    )]
    pub delay: Option<u64>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Runtime",
        help = "Per-request timeout."
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Route requests through this proxy."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'H',
        long = "header",
        value_name = "K: V",
        action = ArgAction::Append,
        help_heading = "HTTP",
        help = "Extra request header (repeatable)."
    )]
    pub header: Vec<String>,

    #[arg(
        long = "cookie",
        value_name = "COOKIE",
        help_heading = "HTTP",
        help = "Cookie header value, passed through opaquely."
    )]
    pub cookie: Option<String>,

    #[arg(
        long = "auth",
        value_name = "CREDENTIALS",
        help_heading = "HTTP",
        help = "Authorization header value, passed through opaquely."
    )]
    pub auth: Option<String>,

    #[arg(
        long = "user-agent",
        value_name = "UA",
        help_heading = "HTTP",
        help = "Override the User-Agent header."
    )]
    pub user_agent: Option<String>,

    #[arg(
        long = "follow-redirects",
        help_heading = "HTTP",
        help = "Follow redirects and record the hop chain."
    )]
    pub follow_redirects: bool,

    #[arg(
        long = "waf-signatures",
        value_name = "FILE",
        help_heading = "Output",
        help = "WAF signature database (defaults to db/waf_signatures.json)."
    )]
    pub waf_signatures: Option<String>,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write findings as JSON lines to this file."
    )]
    pub output: Option<String>,

    #[arg(
        long = "session",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write a resumable session snapshot here."
    )]
    pub session: Option<String>,

    #[arg(
        short = 'q',
        long = "quiet",
        help_heading = "Output",
        help = "Print found URLs only."
    )]
    pub quiet: bool,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,
}
