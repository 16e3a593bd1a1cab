//! Parse the textual output of a Claude worker into structured fields.
//!
//! Extraction order:
//! 1. unwrap the CLI's JSON envelope (`{"result": "...", "is_error": false}`)
//! 2. a fenced ```` ```json ```` block
//! 3. a fenced ```` ```summary ```` block of `key: value` lines
//! 4. the tail of the output as a plain summary

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::errors::InvocationError;
use crate::util::{extract_json_object, tail_chars};

/// Characters of raw output kept as summary when nothing structured is found.
pub const FALLBACK_SUMMARY_CHARS: usize = 1500;

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n\s*```").unwrap());

static SUMMARY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```summary\s*\n(.*?)\n\s*```").unwrap());

/// Fields recovered from worker output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub summary: String,
    pub files_changed: Vec<PathBuf>,
    pub issues: Vec<String>,
    pub blocked: bool,
    pub block_reason: Option<String>,
    /// The structured JSON block, if one was found.
    pub structured: Option<Value>,
    /// Text the fields were recovered from (envelope unwrapped).
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
}

/// Parse raw stdout from the Claude CLI.
pub fn parse_worker_output(raw: &str) -> Result<ParsedOutput, InvocationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvocationError::Malformed("worker produced no output".to_string()));
    }

    let body = match serde_json::from_str::<Envelope>(trimmed) {
        Ok(Envelope {
            result: Some(result),
            is_error,
        }) => {
            if is_error {
                return Err(InvocationError::Reported(tail_chars(&result, 500).to_string()));
            }
            result
        }
        Ok(Envelope {
            result: None,
            is_error: true,
        }) => return Err(InvocationError::Reported("CLI reported an error".to_string())),
        _ => trimmed.to_string(),
    };

    if body.trim().is_empty() {
        return Err(InvocationError::Malformed("worker result was empty".to_string()));
    }

    if let Some(value) = json_block(&body) {
        let mut parsed = from_json(&value);
        parsed.structured = Some(value);
        parsed.body = body;
        return Ok(parsed);
    }

    if let Some(caps) = SUMMARY_BLOCK.captures(&body) {
        let mut parsed = from_summary_block(caps.get(1).map_or("", |m| m.as_str()));
        parsed.body = body;
        return Ok(parsed);
    }

    Ok(ParsedOutput {
        summary: tail_chars(&body, FALLBACK_SUMMARY_CHARS).trim().to_string(),
        body,
        ..Default::default()
    })
}

/// First fenced JSON block that parses as an object.
pub(crate) fn json_block(body: &str) -> Option<Value> {
    JSON_BLOCK.captures_iter(body).find_map(|caps| {
        let inner = caps.get(1)?.as_str();
        let object = extract_json_object(inner)?;
        serde_json::from_str::<Value>(object)
            .ok()
            .filter(Value::is_object)
    })
}

fn from_json(value: &Value) -> ParsedOutput {
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut files_changed = Vec::new();
    for key in ["files_changed", "files_created"] {
        if let Some(list) = value.get(key).and_then(Value::as_array) {
            for path in list.iter().filter_map(Value::as_str) {
                let path = PathBuf::from(path);
                if !files_changed.contains(&path) {
                    files_changed.push(path);
                }
            }
        }
    }

    let mut issues = Vec::new();
    for key in ["issues", "vulnerabilities"] {
        if let Some(list) = value.get(key).and_then(Value::as_array) {
            issues.extend(list.iter().filter_map(describe_issue));
        }
    }

    let blocked = value.get("blocked").is_some_and(truthy);
    let block_reason = value
        .get("block_reason")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from);

    ParsedOutput {
        summary,
        files_changed,
        issues,
        blocked,
        block_reason,
        ..Default::default()
    }
}

/// Render one issue entry as `severity: description (file:line)`.
fn describe_issue(entry: &Value) -> Option<String> {
    if let Some(text) = entry.as_str() {
        return Some(text.to_string());
    }
    let obj = entry.as_object()?;
    let description = obj
        .get("description")
        .or_else(|| obj.get("message"))
        .and_then(Value::as_str)?;

    let mut line = match obj.get("severity").and_then(Value::as_str) {
        Some(sev) => format!("{}: {}", sev.to_lowercase(), description),
        None => description.to_string(),
    };
    if let Some(file) = obj.get("file").and_then(Value::as_str) {
        match obj.get("line").and_then(Value::as_u64) {
            Some(n) => line.push_str(&format!(" ({}:{})", file, n)),
            None => line.push_str(&format!(" ({})", file)),
        }
    }
    Some(line)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "yes" | "true" | "1"),
        Value::Number(n) => n.as_u64() == Some(1),
        _ => false,
    }
}

fn from_summary_block(text: &str) -> ParsedOutput {
    let mut parsed = ParsedOutput {
        summary: text.trim().to_string(),
        ..Default::default()
    };

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace(' ', "_");
        let value = value.trim();
        match key.as_str() {
            "files_changed" | "files_created" => parsed.files_changed.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(PathBuf::from),
            ),
            "issues" => parsed.issues.extend(
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|i| !i.is_empty() && !i.eq_ignore_ascii_case("none"))
                    .map(String::from),
            ),
            "blocked" => {
                parsed.blocked = matches!(value.to_lowercase().as_str(), "yes" | "true" | "1")
            }
            "block_reason" if !value.is_empty() => parsed.block_reason = Some(value.to_string()),
            _ => {}
        }
    }

    parsed
}
