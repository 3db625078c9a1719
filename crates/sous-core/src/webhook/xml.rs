//! Minimal XML rendering for webhook payloads registered with an
//! `application/xml` content type.
//!
//! The payloads are small JSON documents, so this writer only needs
//! elements and text: objects become nested elements with keys emitted in
//! sorted order (deterministic output), arrays repeat an `item` element,
//! and scalars become text content. Keys that are not valid XML names are
//! emitted as `<entry name="...">`.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::Value;

/// Render a JSON payload as an XML document rooted at `<payload>`.
pub fn render(value: &Value) -> String {
    let mut out = String::new();
    render_element(&mut out, "payload", value);
    out
}

fn render_element(out: &mut String, name: &str, value: &Value) {
    if valid_name(name) {
        let _ = write!(out, "<{name}>");
        render_children(out, value);
        let _ = write!(out, "</{name}>");
    } else {
        let _ = write!(out, "<entry name=\"{}\">", escape(name));
        render_children(out, value);
        out.push_str("</entry>");
    }
}

fn render_children(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => out.push_str(&escape(s)),
        Value::Array(items) => {
            for item in items {
                render_element(out, "item", item);
            }
        }
        Value::Object(map) => {
            // Sort keys so equal payloads render byte-equal.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            for (key, child) in sorted {
                render_element(out, key, child);
            }
        }
    }
}

/// A conservative XML name check: ASCII letters and underscore to start,
/// then letters, digits, hyphen, underscore, or dot.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
