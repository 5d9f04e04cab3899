//! Two-phase action parser.
//!
//! Phase one extracts top-level `<tag>…</tag>` elements from the raw LLM
//! text. Phase two parses each element body as an indent-based key-value
//! payload and validates it into a typed [`Action`]. The phases are
//! deliberately decoupled so either can change independently.
//!
//! Parse errors are non-fatal: each offending element becomes an error
//! string that is echoed into the agent's next prompt so the model can
//! self-correct.

use regex::Regex;
use std::sync::OnceLock;

use super::types::*;
use super::Action;

/// Tags that carry free-form thinking rather than actions. They are
/// recorded on the turn but never dispatched.
const THINKING_TAGS: &[&str] = &["reasoning", "think", "plan_md"];

/// Tags that parse into actions.
const ACTION_TAGS: &[&str] = &[
    "bash",
    "finish",
    "todo",
    "file",
    "search",
    "scratchpad",
    "report",
    "write_temp_script",
    "task_create",
    "add_context",
    "launch_subagent",
];

/// Result of parsing one LLM response.
#[derive(Debug, Default)]
pub struct ParsedResponse {
    /// Valid actions in document order.
    pub actions: Vec<Action>,
    /// Errors for malformed elements, formatted for the next prompt.
    pub errors: Vec<String>,
    /// Free-form thinking blocks, kept for the turn record.
    pub thinking: Vec<String>,
    /// True when the response contained at least one action-shaped element.
    pub found_action_attempt: bool,
}

/// Parse a raw LLM response into actions.
pub fn parse_response(response: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();

    for element in extract_elements(response) {
        match element {
            Element::Tag { name, body } => {
                if THINKING_TAGS.contains(&name.as_str()) {
                    parsed.thinking.push(body);
                    continue;
                }
                parsed.found_action_attempt = true;
                if !ACTION_TAGS.contains(&name.as_str()) {
                    parsed.errors.push(format!("Unknown action tag: <{name}>"));
                    continue;
                }
                match parse_payload(&name, &body) {
                    Ok(action) => match action.validate() {
                        Ok(()) => parsed.actions.push(action),
                        Err(e) => parsed.errors.push(format!("[{name}] Validation error: {e}")),
                    },
                    Err(e) => parsed.errors.push(format!("[{name}] {e}")),
                }
            }
            Element::Unclosed { name } => {
                parsed.found_action_attempt = true;
                parsed
                    .errors
                    .push(format!("Malformed action: <{name}> has no closing tag"));
            }
        }
    }

    parsed
}

enum Element {
    Tag { name: String, body: String },
    Unclosed { name: String },
}

fn open_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Opening tags at line starts only, so inline markup inside prose or
    // code fences is less likely to be picked up.
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*<([A-Za-z_][A-Za-z0-9_]*)>").unwrap())
}

/// Scan for top-level tag pairs in document order. The `regex` crate has no
/// backreferences, so closing tags are matched by string search.
fn extract_elements(response: &str) -> Vec<Element> {
    let mut elements = Vec::new();
    let mut cursor = 0;

    while let Some(open) = open_tag_regex().find_at(response, cursor) {
        let name = open_tag_regex()
            .captures(&response[open.start()..])
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let close_marker = format!("</{name}>");
        match response[open.end()..].find(&close_marker) {
            Some(rel) => {
                let body_start = open.end();
                let body_end = body_start + rel;
                elements.push(Element::Tag {
                    name,
                    body: response[body_start..body_end].to_string(),
                });
                cursor = body_end + close_marker.len();
            }
            None => {
                elements.push(Element::Unclosed { name });
                cursor = open.end();
            }
        }
    }

    elements
}

/// Parse one element body into a typed action.
fn parse_payload(tag: &str, body: &str) -> Result<Action, String> {
    let normalized = normalize_dollar_escapes(body);
    let value: serde_json::Value = if normalized.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_yaml::from_str(normalized.trim_end()).map_err(|e| format!("Payload error: {e}"))?
    };
    // A comment-only body parses to null; treat it as an empty payload so
    // tags whose fields all have defaults still work.
    let value = if value.is_null() {
        serde_json::json!({})
    } else {
        value
    };

    match tag {
        "bash" => typed(value).map(Action::Bash),
        "finish" => typed(value).map(Action::Finish),
        "todo" => typed(value).map(Action::Todo),
        "report" => typed(value).map(Action::Report),
        "write_temp_script" => typed(value).map(Action::WriteTempScript),
        "task_create" => typed(value).map(Action::TaskCreate),
        "add_context" => typed(value).map(Action::AddContext),
        "launch_subagent" => typed(value).map(Action::LaunchSubagent),
        "file" => {
            let (sub, rest) = take_sub_action(value)?;
            match sub.as_str() {
                "read" => typed(rest).map(Action::ReadFile),
                "write" => typed(rest).map(Action::WriteFile),
                "edit" => typed(rest).map(Action::EditFile),
                "multi_edit" => typed(rest).map(Action::MultiEditFile),
                "metadata" => typed(rest).map(Action::FileMetadata),
                other => Err(format!("Unknown file action: '{other}'")),
            }
        }
        "search" => {
            let (sub, rest) = take_sub_action(value)?;
            match sub.as_str() {
                "grep" => typed(rest).map(Action::Grep),
                "glob" => typed(rest).map(Action::Glob),
                other => Err(format!("Unknown search action: '{other}'")),
            }
        }
        "scratchpad" => {
            let (sub, rest) = take_sub_action(value)?;
            match sub.as_str() {
                "add_note" => typed(rest).map(Action::AddNote),
                "view_all_notes" => Ok(Action::ViewAllNotes),
                other => Err(format!("Unknown scratchpad action: '{other}'")),
            }
        }
        _ => Err(format!("Unknown action tag: <{tag}>")),
    }
}

fn typed<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("Validation error: {e}"))
}

/// Pull the `action` discriminator out of a multi-action tag body and return
/// the remaining fields for the sub-payload.
fn take_sub_action(value: serde_json::Value) -> Result<(String, serde_json::Value), String> {
    let mut map = match value {
        serde_json::Value::Object(map) => map,
        other => {
            return Err(format!(
                "Payload must be a key-value block, got {}",
                value_kind(&other)
            ))
        }
    };
    let sub = map
        .remove("action")
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .ok_or_else(|| "Missing required 'action' field".to_string())?;
    Ok((sub, serde_json::Value::Object(map)))
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "a key-value block",
    }
}

/// Rewrite `\$` to `$` inside double-quoted flow scalars.
///
/// Models routinely escape `$` when writing shell commands in double-quoted
/// strings, which the payload grammar permits but a strict YAML parser
/// rejects. Block scalars and single-quoted strings must pass through
/// untouched, so this walks lines tracking block-scalar indentation and
/// quote state.
fn normalize_dollar_escapes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut block_indent: Option<usize> = None;
    let mut in_double = false;

    for line in body.split_inclusive('\n') {
        let stripped = line.trim_end_matches(['\n', '\r']);
        let newline = &line[stripped.len()..];
        let indent = stripped.len() - stripped.trim_start().len();

        if let Some(open_indent) = block_indent {
            if stripped.trim().is_empty() || indent > open_indent {
                out.push_str(line);
                continue;
            }
            block_indent = None;
        }

        let mut scanned = String::with_capacity(stripped.len());
        let mut chars = stripped.chars();
        let mut in_single = false;
        while let Some(c) = chars.next() {
            if in_single {
                if c == '\'' {
                    in_single = false;
                }
                scanned.push(c);
            } else if in_double {
                if c == '\\' {
                    match chars.next() {
                        Some('$') => scanned.push('$'),
                        Some(next) => {
                            scanned.push('\\');
                            scanned.push(next);
                        }
                        None => scanned.push('\\'),
                    }
                } else {
                    if c == '"' {
                        in_double = false;
                    }
                    scanned.push(c);
                }
            } else {
                match c {
                    '\'' => in_single = true,
                    '"' => in_double = true,
                    _ => {}
                }
                scanned.push(c);
            }
        }

        if !in_double {
            let trimmed = stripped.trim_end();
            if trimmed.ends_with('|') || trimmed.ends_with("|-") || trimmed.ends_with("|+") {
                block_indent = Some(indent);
            }
        }

        out.push_str(&scanned);
        out.push_str(newline);
    }

    out
}
