//! Inline option suffix: `path[key: value, key2: value2]`.
//!
//! ```
//! use attachments_core::dsl::parse_dsl;
//!
//! let (path, options) = parse_dsl("report.pdf[pages: 1-4, images: true]");
//! assert_eq!(path, "report.pdf");
//! assert_eq!(options.get_i64("page_start"), Some(0));
//! assert_eq!(options.get_i64("page_end"), Some(4));
//! assert_eq!(options.get_bool("render_images"), Some(true));
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::options::ProcessOptions;

static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*-\s*(\d+)$").expect("valid regex"));

enum Alias {
    Single(&'static str),
    /// Page-style pair: 1-based input, 0-based start out.
    Pages(&'static str, &'static str),
}

fn alias(key: &str) -> Option<Alias> {
    let alias = match key {
        "pages" | "page" => Alias::Pages("page_start", "page_end"),
        "password" | "pw" => Alias::Single("password"),
        "dpi" => Alias::Single("images_dpi"),
        "images" | "render" => Alias::Single("render_images"),
        "sheet" => Alias::Single("sheet"),
        "rows" | "max_rows" => Alias::Single("max_rows"),
        "branch" | "ref" | "tag" => Alias::Single("ref"),
        "start" => Alias::Single("page_start"),
        "end" => Alias::Single("page_end"),
        _ => return None,
    };
    Some(alias)
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Range(i64, i64),
}

impl Literal {
    fn into_value(self) -> Value {
        match self {
            Literal::Str(s) => Value::String(s),
            Literal::Bool(b) => Value::Bool(b),
            Literal::Int(i) => Value::from(i),
            Literal::Float(f) => Value::from(f),
            Literal::Range(a, b) => Value::from(vec![a, b]),
        }
    }
}

fn parse_literal(raw: &str) -> Literal {
    let value = raw.trim();

    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        return Literal::Str(value[1..value.len() - 1].to_string());
    }

    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => return Literal::Bool(true),
        "false" | "no" | "off" | "0" => return Literal::Bool(false),
        _ => {}
    }

    let digits = value.strip_prefix('-').unwrap_or(value);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = value.parse::<i64>() {
            return Literal::Int(i);
        }
    }

    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>() {
            return Literal::Float(f);
        }
    }

    if let Some(caps) = RANGE.captures(value) {
        if let (Ok(a), Ok(b)) = (caps[1].parse(), caps[2].parse()) {
            return Literal::Range(a, b);
        }
    }

    Literal::Str(value.to_string())
}

fn expand(key: &str, literal: Literal, options: &mut ProcessOptions) {
    let key = key.to_lowercase().replace(['-', ' '], "_");
    match alias(&key) {
        Some(Alias::Pages(start, end)) => match literal {
            Literal::Range(a, b) => {
                options.insert(start, a - 1);
                options.insert(end, b);
            }
            Literal::Int(v) => {
                options.insert(start, v - 1);
                options.insert(end, v);
            }
            // `page: 1` parses as a boolean literal.
            Literal::Bool(true) => {
                options.insert(start, 0);
                options.insert(end, 1);
            }
            _ => {}
        },
        Some(Alias::Single(name)) => options.insert(name, literal.into_value()),
        None => options.insert(&key, literal.into_value()),
    }
}

/// Split on commas outside single or double quotes.
fn split_options(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match (quote, ch) {
            (None, '"' | '\'') => {
                quote = Some(ch);
                current.push(ch);
            }
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            (None, ',') => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Byte index of the `[` balancing the final `]`.
fn options_start(input: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, ch) in input.char_indices().rev() {
        match ch {
            ']' => depth += 1,
            '[' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split an input into its path and the options in a trailing `[...]` block.
///
/// Inputs without a well-formed trailing block come back trimmed with no options.
pub fn parse_dsl(input: &str) -> (String, ProcessOptions) {
    let input = input.trim();
    let mut options = ProcessOptions::new();

    if !input.contains('[') || !input.ends_with(']') {
        return (input.to_string(), options);
    }
    let Some(start) = options_start(input) else {
        return (input.to_string(), options);
    };

    let path = input[..start].trim().to_string();
    let body = input[start + 1..input.len() - 1].trim();

    for part in split_options(body) {
        let Some((key, value)) = part.trim().split_once(':') else {
            continue;
        };
        expand(key.trim(), parse_literal(value), &mut options);
    }

    (path, options)
}

/// Render `path` with `options` as an inline suffix; the inverse of [`parse_dsl`]
/// for already-expanded option names.
pub fn format_dsl(path: &str, options: &ProcessOptions) -> String {
    if options.is_empty() {
        return path.to_string();
    }
    let parts: Vec<String> = options
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::Bool(b) => b.to_string(),
                Value::String(s) if s.contains(',') || s.contains(':') => format!("\"{s}\""),
                Value::String(s) => s.clone(),
                Value::Array(pair) if pair.len() == 2 => format!("{}-{}", pair[0], pair[1]),
                other => other.to_string(),
            };
            format!("{key}: {rendered}")
        })
        .collect();
    format!("{path}[{}]", parts.join(", "))
}
