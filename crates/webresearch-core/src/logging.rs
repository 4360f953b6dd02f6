//! Append-only JSONL run log with secret redaction and retention pruning.

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

static REDACTION_PATTERNS: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key".to_string(),
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret".to_string(),
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer".to_string(),
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token".to_string(),
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

#[derive(Debug, Clone)]
pub struct RunLogInput {
    pub session_id: String,
    pub query: String,
    pub status: String,
    pub duration_secs: f64,
    pub sources: Vec<String>,
}

#[derive(Serialize)]
struct RunLogRecord {
    timestamp: String,
    session_id: String,
    query: String,
    status: String,
    duration_secs: f64,
    sources: Vec<String>,
    redactions: Vec<String>,
}

#[derive(Serialize)]
struct AuditLogRecord {
    timestamp: String,
    session_id: String,
    redactions: Vec<String>,
}

/// Writes one line per research run to `{dir}/{YYYY}/{MM}/research.jsonl`.
#[derive(Debug, Clone)]
pub struct RunLogger {
    base_dir: PathBuf,
    retention_days: u64,
}

impl RunLogger {
    pub fn new(base_dir: impl Into<PathBuf>, retention_days: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            retention_days,
        }
    }

    pub fn append(&self, input: RunLogInput) -> Result<()> {
        let timestamp = Utc::now();
        let mut redactions = BTreeSet::new();

        let query = sanitize_text(&input.query, &mut redactions);
        let sources: Vec<String> = input
            .sources
            .iter()
            .map(|source| sanitize_text(source, &mut redactions))
            .collect();

        let record = RunLogRecord {
            timestamp: timestamp.to_rfc3339(),
            session_id: input.session_id.clone(),
            query,
            status: input.status,
            duration_secs: input.duration_secs,
            sources,
            redactions: redactions.into_iter().collect(),
        };

        let month_dir = self
            .base_dir
            .join(format!("{:04}", timestamp.year()))
            .join(format!("{:02}", timestamp.month()));
        append_json_line(&month_dir.join("research.jsonl"), &record)?;

        if !record.redactions.is_empty() {
            let audit = AuditLogRecord {
                timestamp: record.timestamp.clone(),
                session_id: input.session_id.clone(),
                redactions: record.redactions.clone(),
            };
            append_json_line(&month_dir.join("audit.jsonl"), &audit)?;
            warn!(
                session_id = %input.session_id,
                fields = ?record.redactions,
                "redacted potential secrets from run log"
            );
        }

        self.enforce_retention()
    }

    fn enforce_retention(&self) -> Result<()> {
        if self.retention_days == 0 || !self.base_dir.exists() {
            return Ok(());
        }
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(self.retention_days.saturating_mul(86_400)))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        prune_directory(&self.base_dir, cutoff)
    }
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{}", line)
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn sanitize_text(input: &str, redactions: &mut BTreeSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert(name.clone());
        }
    }
    output
}

fn prune_directory(dir: &Path, cutoff: SystemTime) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_directory(&path, cutoff)?;
            if path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
        } else if metadata.is_file()
            && metadata
                .modified()
                .map(|time| time < cutoff)
                .unwrap_or(false)
        {
            fs::remove_file(&path).ok();
        }
    }

    Ok(())
}
