//! `{{producer.field}}` variable resolution.
//!
//! A narrow, single-pass text substitution: no expressions, no nesting, and
//! substituted text is never re-scanned. Producers are looked up through a
//! [`Scope`] (node outputs keyed by node name, global variables, the run
//! input, loop iteration state); reserved date/time tokens resolve against
//! the wall clock at substitution time.
//!
//! Unresolvable tokens are left verbatim and reported, never fatal.

use chrono::{DateTime, Local};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// What a producer name resolves to.
pub enum Producer<'a> {
    /// A node's `data` map (or the run input).
    Fields(&'a Map<String, Value>),
    /// A single value, e.g. a global variable.
    Value(&'a Value),
    /// A value built on demand, e.g. the current loop item.
    Owned(Value),
}

/// Lookup table for template producers.
pub trait Scope {
    fn producer(&self, name: &str) -> Option<Producer<'_>>;
}

/// A scope layering extra named values over a parent scope.
pub struct OverlayScope<'a> {
    parent: &'a dyn Scope,
    name: &'a str,
    value: Value,
}

impl<'a> OverlayScope<'a> {
    pub fn new(parent: &'a dyn Scope, name: &'a str, value: Value) -> Self {
        Self {
            parent,
            name,
            value,
        }
    }
}

impl Scope for OverlayScope<'_> {
    fn producer(&self, name: &str) -> Option<Producer<'_>> {
        if name == self.name {
            Some(Producer::Value(&self.value))
        } else {
            self.parent.producer(name)
        }
    }
}

// ---------------------------------------------------------------------------
// Reserved tokens
// ---------------------------------------------------------------------------

const RESERVED_TOKENS: [&str; 6] = [
    "current_date",
    "current_time",
    "current_timestamp",
    "当前日期",
    "当前时间",
    "当前时间戳",
];

pub fn is_reserved(token: &str) -> bool {
    RESERVED_TOKENS.contains(&token)
}

fn resolve_reserved(token: &str, now: &DateTime<Local>) -> Option<String> {
    match token {
        "current_date" | "当前日期" => Some(now.format("%Y-%m-%d").to_string()),
        "current_time" | "当前时间" => Some(now.format("%H:%M:%S").to_string()),
        "current_timestamp" | "当前时间戳" => Some(now.to_rfc3339()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Token scanning
// ---------------------------------------------------------------------------

/// A `{{...}}` token found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    /// The token as written, braces included.
    pub raw: String,
    pub producer: String,
    pub path: Vec<String>,
}

enum Piece<'t> {
    Text(&'t str),
    Token { raw: &'t str, inner: &'t str },
}

/// Split a template into literal text and tokens. `\{{` is a literal `{{`.
fn scan(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        if start > 0 && rest.as_bytes()[start - 1] == b'\\' {
            pieces.push(Piece::Text(&rest[..start - 1]));
            pieces.push(Piece::Text("{{"));
            rest = &rest[start + 2..];
            continue;
        }
        pieces.push(Piece::Text(&rest[..start]));
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            pieces.push(Piece::Text(&rest[start..]));
            rest = "";
            break;
        };
        let inner = &after[..end];
        if inner.contains("{{") {
            // `{{ a {{b}}`: the first opener is literal text.
            pieces.push(Piece::Text("{{"));
            rest = after;
            continue;
        }
        pieces.push(Piece::Token {
            raw: &rest[start..start + 2 + end + 2],
            inner,
        });
        rest = &after[end + 2..];
    }
    pieces.push(Piece::Text(rest));
    pieces.retain(|p| !matches!(p, Piece::Text("")));
    pieces
}

fn split_path(inner: &str) -> Option<(String, Vec<String>)> {
    let mut segments = inner.trim().split('.').map(str::trim);
    let producer = segments.next().filter(|p| !p.is_empty())?;
    let path: Vec<String> = segments.map(str::to_string).collect();
    if path.iter().any(String::is_empty) {
        return None;
    }
    Some((producer.to_string(), path))
}

/// Every well-formed token in `template`, escaped ones excluded.
pub fn references(template: &str) -> Vec<TemplateRef> {
    scan(template)
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Token { raw, inner } => split_path(inner).map(|(producer, path)| TemplateRef {
                raw: raw.to_string(),
                producer,
                path,
            }),
            Piece::Text(_) => None,
        })
        .collect()
}

/// Whether `template` contains at least one token.
pub fn has_tokens(template: &str) -> bool {
    scan(template)
        .iter()
        .any(|p| matches!(p, Piece::Token { .. }))
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// A resolved template plus the tokens that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    pub unresolved: Vec<String>,
}

/// Resolve every token in `template` against `scope` at the current time.
pub fn resolve(template: &str, scope: &dyn Scope) -> Resolution {
    resolve_at(template, scope, &Local::now())
}

/// Resolve with an explicit clock, for deterministic reserved tokens.
pub fn resolve_at(template: &str, scope: &dyn Scope, now: &DateTime<Local>) -> Resolution {
    let mut text = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    for piece in scan(template) {
        match piece {
            Piece::Text(t) => text.push_str(t),
            Piece::Token { raw, inner } => match lookup(inner, scope, now) {
                Some(value) => text.push_str(&render(&value)),
                None => {
                    tracing::warn!(token = raw, "unresolved template reference");
                    text.push_str(raw);
                    unresolved.push(raw.to_string());
                }
            },
        }
    }
    Resolution { text, unresolved }
}

/// Resolve to a typed value.
///
/// A template that is exactly one token (surrounding whitespace allowed)
/// yields the referenced JSON value itself; anything else yields the
/// resolved string.
pub fn resolve_value(template: &str, scope: &dyn Scope) -> (Value, Vec<String>) {
    let pieces = scan(template.trim());
    if let [Piece::Token { raw, inner }] = pieces.as_slice() {
        return match lookup(inner, scope, &Local::now()) {
            Some(Resolved::Value(value)) => (value, Vec::new()),
            Some(Resolved::Text(text)) => (Value::String(text), Vec::new()),
            None => {
                tracing::warn!(token = *raw, "unresolved template reference");
                (Value::String(raw.to_string()), vec![raw.to_string()])
            }
        };
    }
    let resolution = resolve(template, scope);
    (Value::String(resolution.text), resolution.unresolved)
}

enum Resolved {
    Text(String),
    Value(Value),
}

fn render(resolved: &Resolved) -> String {
    match resolved {
        Resolved::Text(text) => text.clone(),
        Resolved::Value(value) => humanize(value),
    }
}

fn lookup(inner: &str, scope: &dyn Scope, now: &DateTime<Local>) -> Option<Resolved> {
    let (producer, path) = split_path(inner)?;
    if path.is_empty() {
        if let Some(text) = resolve_reserved(&producer, now) {
            return Some(Resolved::Text(text));
        }
    }
    let value = match scope.producer(&producer)? {
        Producer::Fields(fields) => match path.split_first() {
            // A bare node reference renders its canonical `result` when present.
            None => fields
                .get("result")
                .cloned()
                .unwrap_or_else(|| Value::Object(fields.clone())),
            Some((first, rest)) => walk(fields.get(first.as_str())?, rest)?.clone(),
        },
        Producer::Value(value) => walk(value, &path)?.clone(),
        Producer::Owned(value) => walk(&value, &path)?.clone(),
    };
    Some(Resolved::Value(value))
}

/// Follow a dotted path; numeric segments index arrays.
fn walk<'v>(root: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment.as_str()),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Compact, prose-friendly rendering of a JSON value.
///
/// Scalars render bare, null renders empty, scalar arrays join with `, `,
/// top-level objects become `key: value` lines, and arrays of structured
/// values become `- item` lines.
pub fn humanize(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", inline(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) if !items.iter().all(is_scalar) => items
            .iter()
            .map(|item| format!("- {}", inline(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => inline(other),
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(inline)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(inline).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{k}: {}", inline(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
