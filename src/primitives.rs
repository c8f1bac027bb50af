//! Scalar primitives shared by the normalizer, the resolver and the validator.
//!
//! Number, identifier and string parsing, `in`/`not_in` membership, the user
//! macro grammar (`{$NAME}`, `{$NAME:context}`), time units and upload
//! sniffing.

use regex::Regex;
use serde_json::{Number, Value};
use std::sync::LazyLock;

use crate::types::{InOption, Membership};

pub const MIN_INT32: i64 = -2_147_483_648;
pub const MAX_INT32: i64 = 2_147_483_647;

static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+$").unwrap());

static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$").unwrap()
});

static MACRO_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9_.]+$").unwrap());

// ─── Numbers ────────────────────────────────────────────────────────────────

/// Parses a 32-bit signed integer from a JSON integer or a decimal string.
///
/// Leading zeros and a leading minus are accepted in strings (`"-0005"` → -5).
/// Floats, booleans and out-of-range values are rejected.
pub fn parse_int32(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) if INT_RE.is_match(s) => s.parse::<i64>().ok()?,
        _ => return None,
    };
    (MIN_INT32..=MAX_INT32).contains(&n).then_some(n)
}

/// Parses a finite floating-point number from a JSON number or a decimal string.
pub fn parse_float(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if FLOAT_RE.is_match(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

/// Numeric view of a scalar used in `in` lists, ranges and `min`/`max`.
pub fn number_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if FLOAT_RE.is_match(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Parses an identifier into its canonical decimal string.
///
/// Accepts non-negative JSON integers and all-digit strings not exceeding
/// `max_id`. Leading zeros are stripped; the zero value stays `"0"`.
pub fn parse_id(value: &Value, max_id: u64) -> Option<String> {
    let digits = match value {
        Value::Number(n) => n.as_u64()?.to_string(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.clone(),
        _ => return None,
    };

    let trimmed = digits.trim_start_matches('0');
    let canonical = if trimmed.is_empty() { "0" } else { trimmed };

    // u64::MAX has 20 digits; anything longer is out of range.
    if canonical.len() > 20 {
        return None;
    }
    let n: u128 = canonical.parse().ok()?;
    (n <= max_id as u128).then(|| canonical.to_string())
}

/// JSON number for a decimal string; integral text stays integral.
pub fn number_from_text(text: &str) -> Option<Number> {
    if INT_RE.is_match(text)
        && let Ok(n) = text.parse::<i64>()
    {
        return Some(Number::from(n));
    }
    if FLOAT_RE.is_match(text) {
        return text.parse::<f64>().ok().and_then(Number::from_f64);
    }
    None
}

/// JSON number for a validated float, keeping integral inputs integral.
pub fn float_to_value(original: &Value, parsed: f64) -> Value {
    if let Value::Number(n) = original {
        return Value::Number(n.clone());
    }
    Number::from_f64(parsed)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ─── Membership ─────────────────────────────────────────────────────────────

fn in_range(value: f64, from: &Option<Number>, to: &Option<Number>) -> bool {
    let above = from
        .as_ref()
        .and_then(Number::as_f64)
        .is_none_or(|from| from <= value);
    let below = to
        .as_ref()
        .and_then(Number::as_f64)
        .is_none_or(|to| value <= to);
    above && below
}

/// Whether a number matches any scalar or range in `options`.
pub fn number_matches_any(value: f64, options: &[InOption]) -> bool {
    options.iter().any(|option| match option {
        InOption::Scalar(scalar) => number_as_f64(scalar) == Some(value),
        InOption::Range { from, to } => in_range(value, from, to),
    })
}

/// Whether a string equals any scalar in `options`. Ranges never match.
pub fn string_matches_any(value: &str, options: &[InOption]) -> bool {
    options.iter().any(|option| match option {
        InOption::Scalar(scalar) => scalar_text(scalar).as_deref() == Some(value),
        InOption::Range { .. } => false,
    })
}

/// Text form of a scalar as used in string comparisons and messages.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Error text for a failed numeric `in`/`not_in` check.
pub fn numeric_membership_message(membership: &Membership) -> String {
    let mut scalars = Vec::new();
    let mut ranges = Vec::new();
    for option in membership.options() {
        match option {
            InOption::Scalar(_) => scalars.push(format!("\"{}\"", option)),
            InOption::Range { .. } => ranges.push(option.to_string()),
        }
    }

    let mut parts = Vec::new();
    match scalars.len() {
        0 => {}
        1 => parts.push(scalars.remove(0)),
        _ => parts.push(format!("one of {}", scalars.join(", "))),
    }
    match ranges.len() {
        0 => {}
        1 => parts.push(format!("within range {}", ranges[0])),
        _ => parts.push(format!("within ranges {}", ranges.join(", "))),
    }

    match membership {
        Membership::In(_) => format!("This value must be {}.", parts.join(" or ")),
        Membership::NotIn(_) => format!("This value cannot be {}.", parts.join(" or ")),
    }
}

/// Error text for a failed string `in`/`not_in` check.
pub fn string_membership_message(membership: &Membership) -> String {
    let options = membership.options();
    let values = options
        .iter()
        .map(|option| format!("\"{}\"", option))
        .collect::<Vec<_>>()
        .join(", ");
    let one_of = if options.len() == 1 { "" } else { "one of " };

    match membership {
        Membership::In(_) => format!("This value must be {}{}.", one_of, values),
        Membership::NotIn(_) => format!("This value cannot be {}{}.", one_of, values),
    }
}

/// Empty in the "field left blank" sense.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

// ─── User macros ────────────────────────────────────────────────────────────

/// A parsed user macro reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserMacro {
    pub name: String,
    pub context: Option<MacroContext>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroContext {
    pub regex: bool,
    pub value: String,
}

impl UserMacro {
    /// Canonical text: quoted, trimmed context. Equal macros have equal text.
    pub fn canonical(&self) -> String {
        match &self.context {
            None => format!("{{${}}}", self.name),
            Some(ctx) => format!(
                "{{${}:{}\"{}\"}}",
                self.name,
                if ctx.regex { "regex:" } else { "" },
                ctx.value.replace('"', "\\\"")
            ),
        }
    }
}

/// Parses a whole string as a user macro reference.
///
/// Grammar: `{$NAME}` or `{$NAME:context}` where NAME is `[A-Z0-9_.]+` and
/// context is either quoted (`"..."` with `\"` escapes) or unquoted up to the
/// closing brace. Unquoted context is trimmed; `regex:` may prefix either form.
pub fn parse_user_macro(input: &str) -> Option<UserMacro> {
    let body = input.strip_prefix("{$")?.strip_suffix('}')?;

    let (name, context) = match body.find(':') {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    if !MACRO_NAME_RE.is_match(name) {
        return None;
    }

    let context = match context {
        None => None,
        Some(raw) => Some(parse_macro_context(raw)?),
    };

    Some(UserMacro {
        name: name.to_string(),
        context,
    })
}

fn parse_macro_context(raw: &str) -> Option<MacroContext> {
    let mut rest = raw.trim_start();
    let regex = match rest.strip_prefix("regex:") {
        Some(stripped) => {
            rest = stripped.trim_start();
            true
        }
        None => false,
    };

    let value = if let Some(quoted) = rest.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = quoted.chars();
        loop {
            match chars.next()? {
                '\\' => match chars.next()? {
                    '"' => value.push('"'),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                },
                '"' => break,
                c => value.push(c),
            }
        }
        if !chars.as_str().trim().is_empty() {
            return None;
        }
        value
    } else {
        if rest.contains('}') {
            return None;
        }
        rest.trim_end().to_string()
    };

    Some(MacroContext { regex, value })
}

/// The macro-canonical form of `value` when it is a user macro, else itself.
pub fn canonical_macro_or_self(value: &str) -> String {
    match parse_user_macro(value) {
        Some(user_macro) => user_macro.canonical(),
        None => value.to_string(),
    }
}

// ─── Time units ─────────────────────────────────────────────────────────────

/// Parses a time-unit string (`30`, `30s`, `5m`, `1h`, `2d`, `1w`) into seconds.
pub fn parse_time_unit(input: &str) -> Result<u64, String> {
    if input.is_empty() {
        return Err("a time unit is expected".to_string());
    }

    let (num_str, multiplier) = match input.char_indices().next_back() {
        Some((pos, c)) if c.is_ascii_alphabetic() => {
            let multiplier = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                'w' => 604_800,
                _ => return Err(format!("unknown time unit '{}'", c)),
            };
            (&input[..pos], multiplier)
        }
        _ => (input, 1),
    };

    if num_str.is_empty() || !num_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err("a time unit is expected".to_string());
    }

    let n: u64 = num_str
        .parse()
        .map_err(|_| "value is too large".to_string())?;
    n.checked_mul(multiplier)
        .ok_or_else(|| "value is too large".to_string())
}

// ─── Uploads ────────────────────────────────────────────────────────────────

/// Whether `content` starts with the signature of a common raster image format.
pub fn looks_like_image(content: &[u8]) -> bool {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPEG: &[u8] = b"\xff\xd8\xff";

    content.starts_with(PNG)
        || content.starts_with(JPEG)
        || content.starts_with(b"GIF87a")
        || content.starts_with(b"GIF89a")
        || (content.len() > 14 && content.starts_with(b"BM"))
        || (content.len() >= 12 && &content[..4] == b"RIFF" && &content[8..12] == b"WEBP")
}

/// Byte count rendered with binary prefixes, e.g. `2097152` → `2 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rounded, UNITS[unit])
}
