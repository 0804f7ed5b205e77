//! Delivery of classified findings. The coordinator funnels every kept
//! result through one channel, so sinks see records serially and never
//! need their own locking for ordering.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::ProgressBar;
use serde::Serialize;
use thiserror::Error;

use crate::classify::{Classification, ResponseKind};
use crate::executor::ResponseSummary;

/// The single externally observable unit of a scan.
#[derive(Clone, Debug, Serialize)]
pub struct ResultRecord {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub path: String,
    pub final_url: String,
    pub kind: ResponseKind,
    pub source_label: String,
    pub signature: String,
    pub status: u16,
    pub body_size: usize,
    pub elapsed_ms: u64,
    pub depth: usize,
    pub redirect: Option<String>,
}

impl ResultRecord {
    pub fn new(
        target: &str,
        path: &str,
        depth: usize,
        classification: &Classification,
        summary: &ResponseSummary,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            target: target.to_string(),
            path: path.to_string(),
            final_url: summary.final_url.clone(),
            kind: classification.kind,
            source_label: classification.source_label.clone(),
            signature: classification.signature.clone(),
            status: summary.status,
            body_size: summary.body_size,
            elapsed_ms: summary.elapsed_ms,
            depth,
            redirect: summary.redirect_chain.last().cloned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Write(String),
}

pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;
    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError>;
    fn flush(&self) -> Result<(), SinkError>;
}

/// Prints one line per finding above the progress bar.
pub struct TerminalSink {
    pb: ProgressBar,
    quiet: bool,
}

impl TerminalSink {
    pub fn new(pb: ProgressBar, quiet: bool) -> Self {
        Self { pb, quiet }
    }

    fn format_line(record: &ResultRecord) -> String {
        let status = match record.status {
            200..=299 => record.status.to_string().green(),
            300..=399 => record.status.to_string().blue(),
            400..=499 => record.status.to_string().truecolor(255, 165, 0),
            500..=599 => record.status.to_string().red(),
            _ => record.status.to_string().white(),
        };
        let label = if record.source_label.is_empty() {
            format!("{}", record.kind)
        } else {
            format!("{}: {}", record.kind, record.source_label)
        };
        let redirect = record
            .redirect
            .as_deref()
            .map(|target| format!(" -> {target}"))
            .unwrap_or_default();
        format!(
            "{} {:>9}B {:>6}ms  {}  [{}]{}",
            status, record.body_size, record.elapsed_ms, record.final_url, label, redirect
        )
    }
}

impl Sink for TerminalSink {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError> {
        if self.quiet {
            self.pb.println(record.final_url.clone());
        } else {
            self.pb.println(Self::format_line(record));
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One JSON object per line, append-only.
pub struct JsonLinesSink {
    file: Mutex<std::fs::File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::Write(format!("{}: {e}", path.display())))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Sink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError> {
        let line =
            serde_json::to_string(record).map_err(|e| SinkError::Write(e.to_string()))?;
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(file, "{line}").map_err(|e| SinkError::Write(e.to_string()))
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.flush().map_err(|e| SinkError::Write(e.to_string()))
    }
}

/// Collects records in memory; the sink used by library consumers and the
/// test suite.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ResultRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn deliver(&self, record: &ResultRecord) -> Result<(), SinkError> {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push(record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;

    fn record() -> ResultRecord {
        let mut summary = ResponseSummary::transport_failure("http://t/admin/");
        summary.status = 200;
        summary.body_size = 1234;
        let classification = Classification {
            kind: ResponseKind::Ok,
            source_label: String::new(),
            signature: "sig".to_string(),
            keep: true,
            drop_reason: None,
        };
        ResultRecord::new("http://t/", "admin/", 0, &classification, &summary)
    }

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.deliver(&record()).unwrap();
        sink.deliver(&record()).unwrap();
        assert_eq!(sink.records().len(), 2);
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_line() {
        let mut path = std::env::temp_dir();
        path.push(format!("pathscout-sink-{}.jsonl", std::process::id()));
        std::fs::remove_file(&path).ok();

        let sink = JsonLinesSink::create(&path).unwrap();
        sink.deliver(&record()).unwrap();
        sink.deliver(&record()).unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["status"], 200);
        assert_eq!(parsed["kind"], "OK");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn terminal_line_carries_type_tag_and_label() {
        let mut r = record();
        r.kind = ResponseKind::Waf;
        r.source_label = "Cloudflare WAF".to_string();
        let line = TerminalSink::format_line(&r);
        assert!(line.contains("WAF: Cloudflare WAF"));
        assert!(line.contains("http://t/admin/"));
    }
}
