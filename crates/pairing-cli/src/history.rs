//! Chat history discovery and parsing for the communication backfill scan.
//!
//! Reads `.jsonl` transcripts and keeps only what the founder wrote. Two
//! line shapes are understood: flat `{role, content, created_at}` records
//! and nested `{type: "user", message: {content}}` transcript entries.
//! Content may be a string or an array of `{type: "text", text}` blocks.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pairing_core::{Signal, Timestamp};
use serde_json::Value;

pub const BACKFILL_SOURCE: &str = "chat_backfill";

/// One founder-authored message recovered from history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub content: String,
    pub created_at: Option<Timestamp>,
}

impl HistoryMessage {
    /// A message signal stamped with its original time, or `now`.
    pub fn into_signal(self, now: Timestamp) -> Signal {
        Signal::message(&self.content, BACKFILL_SOURCE, self.created_at.unwrap_or(now))
    }
}

/// Every `.jsonl` file directly under `dir`, sorted by name.
pub fn discover_histories(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

/// User messages from one transcript, in file order. Malformed lines and
/// non-user roles are skipped.
pub fn extract_user_messages(path: &Path) -> Result<Vec<HistoryMessage>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|obj| parse_line(&obj))
        .collect())
}

fn parse_line(obj: &Value) -> Option<HistoryMessage> {
    let (role, content) = match obj.get("message") {
        Some(msg) => (
            obj.get("type")
                .or_else(|| msg.get("role"))
                .and_then(Value::as_str)?,
            msg.get("content")?,
        ),
        None => (obj.get("role")?.as_str()?, obj.get("content")?),
    };
    if role != "user" {
        return None;
    }
    let text = content_text(content)?;
    if text.trim().is_empty() {
        return None;
    }
    Some(HistoryMessage {
        content: text,
        created_at: obj
            .get("created_at")
            .or_else(|| obj.get("timestamp"))
            .and_then(timestamp),
    })
}

fn content_text(content: &Value) -> Option<String> {
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    let texts: Vec<&str> = content
        .as_array()?
        .iter()
        .filter_map(|block| {
            if block.get("type")?.as_str()? == "text" {
                block.get("text")?.as_str()
            } else {
                None
            }
        })
        .collect();
    (!texts.is_empty()).then(|| texts.join("\n"))
}

fn timestamp(v: &Value) -> Option<Timestamp> {
    match v {
        Value::String(s) => Timestamp::parse_iso8601(s),
        Value::Number(n) => n.as_u64().map(Timestamp::from_unix),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairing_core::SignalType;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_lines(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        path
    }

    #[test]
    fn test_discover_histories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.jsonl"), "").unwrap();
        fs::write(dir.path().join("a.jsonl"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("nested.jsonl")).unwrap();

        let files = discover_histories(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }

    #[test]
    fn test_flat_records_keep_only_user() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(
            &dir,
            "chat.jsonl",
            &[
                r#"{"role":"user","content":"We should ship the pricing page today.","created_at":"2026-02-21T09:30:00Z"}"#,
                r#"{"role":"assistant","content":"Sounds good."}"#,
                r#"{"role":"user","content":"   "}"#,
                "not json at all",
                r#"{"role":"user","content":"Second thought","created_at":1771666200}"#,
            ],
        );
        let msgs = extract_user_messages(&path).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "We should ship the pricing page today.");
        assert_eq!(msgs[0].created_at, Timestamp::parse_iso8601("2026-02-21T09:30:00Z"));
        assert_eq!(msgs[1].created_at, Some(Timestamp::from_unix(1_771_666_200)));
    }

    #[test]
    fn test_nested_transcript_entries() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(
            &dir,
            "session.jsonl",
            &[
                r#"{"type":"user","message":{"role":"user","content":[{"type":"text","text":"How do I price this?"},{"type":"image"}]}}"#,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Start with value."}]}}"#,
                r#"{"type":"file-history-snapshot","snapshot":{}}"#,
            ],
        );
        let msgs = extract_user_messages(&path).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "How do I price this?");
        assert_eq!(msgs[0].created_at, None);
    }

    #[test]
    fn test_into_signal_uses_backfill_source() {
        let now = Timestamp::from_unix(1_771_632_000);
        let msg = HistoryMessage {
            content: "hello there".into(),
            created_at: None,
        };
        let s = msg.into_signal(now);
        assert_eq!(s.signal_type(), SignalType::Message);
        assert_eq!(s.source, BACKFILL_SOURCE);
        assert_eq!(s.occurred_at, now);
    }
}
