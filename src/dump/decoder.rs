// ABOUTME: Literal decoding for INSERT and DELETE statements found in dumps
// ABOUTME: Turns SQL literal lists into typed JSON values zipped with their column names

use super::classifier::{unquote_identifier, QualifiedName, IDENT};
use super::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

static INSERT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*insert\s+into\s+(?P<table>{id}(?:\s*\.\s*{id})?)\s*\((?P<columns>[^)]*)\)\s*values\s*\((?P<values>.*)\)(?:\s+on\s+conflict\s+do\s+nothing)?\s*;?\s*$",
        id = IDENT
    ))
    .expect("insert regex is valid")
});

static DELETE_ALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*delete\s+from\s+(?:only\s+)?(?P<table>{id}(?:\s*\.\s*{id})?)\s*;?\s*$",
        id = IDENT
    ))
    .expect("delete regex is valid")
});

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("number regex is valid")
});

/// A decoded single-row insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRecord {
    pub table: String,
    pub record: Record,
}

/// An unconditional delete of every row in a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAll {
    pub table: String,
}

/// Columns and raw value tokens of a single-row insert, counts already checked
pub(crate) struct RawInsert {
    pub target: QualifiedName,
    pub columns: Vec<String>,
    pub values: Vec<String>,
}

/// Split a literal list on commas that are not nested in parentheses or quotes
///
/// Tokens are trimmed. An empty list yields no tokens.
///
/// # Examples
///
/// ```
/// # use dump_migrator::dump::decoder::split_top_level;
/// let tokens = split_top_level("'a,b', now(), (1, 2), 'it''s'");
/// assert_eq!(tokens, vec!["'a,b'", "now()", "(1, 2)", "'it''s'"]);
/// ```
pub fn split_top_level(list: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth: i32 = 0;

    for c in list.chars() {
        match quote {
            Some(q) => {
                // A doubled quote closes and immediately reopens the string
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    tokens.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }

    if !current.trim().is_empty() || !tokens.is_empty() {
        tokens.push(current.trim().to_string());
    }
    tokens
}

/// True when parentheses outside quotes never close more than they open
fn is_balanced(list: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut depth: i32 = 0;

    for c in list.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            },
        }
    }
    depth == 0
}

/// Drop a trailing `::type` cast that sits outside quotes and parentheses
fn strip_type_cast(token: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut depth: i32 = 0;
    let mut previous_colon = false;

    for (idx, c) in token.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                previous_colon = false;
            }
            None => {
                match c {
                    '\'' | '"' => quote = Some(c),
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    ':' if previous_colon && depth == 0 => {
                        return token[..idx - 1].trim_end();
                    }
                    _ => {}
                }
                previous_colon = c == ':' && !previous_colon;
            }
        }
    }
    token
}

/// Contents of a single-quoted SQL string with `''` unescaped
fn unquote_string_literal(token: &str) -> Option<String> {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        Some(token[1..token.len() - 1].replace("''", "'"))
    } else {
        None
    }
}

fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

fn parse_number(token: &str) -> Option<Number> {
    let is_integer = !token.contains(['.', 'e', 'E']);
    if is_integer {
        if let Ok(n) = token.parse::<i64>() {
            return Some(Number::from(n));
        }
        if let Ok(n) = token.trim_start_matches('+').parse::<u64>() {
            return Some(Number::from(n));
        }
    }
    let float = token.parse::<f64>().ok().filter(|f| f.is_finite())?;
    // Numerics wider than f64 stay as literal text for the destination to cast
    if decimal_digits(token)? != decimal_digits(&format!("{:e}", float))? {
        return None;
    }
    Number::from_f64(float)
}

/// Normalized `(negative, significant digits, decimal point position)` of a
/// numeric literal, so `25.50`, `2.55e1` and `+0025.5` compare equal
fn decimal_digits(text: &str) -> Option<(bool, String, i64)> {
    let (negative, unsigned) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let digits = format!("{}{}", whole, fraction);
    let leading = digits.len() - digits.trim_start_matches('0').len();
    let significant = digits.trim_matches('0').to_string();
    if significant.is_empty() {
        return Some((false, String::new(), 0));
    }
    let point = whole.len() as i64 + exponent - leading as i64;
    Some((negative, significant, point))
}

/// Decode one SQL literal token into a JSON value
///
/// Priority: `NULL`, booleans, quoted strings (parsed as JSON when they look
/// like an object or array), numeric literals, and finally the raw token text
/// for anything else such as `now()` or `DEFAULT`. A `::type` cast suffix is
/// removed first. A numeric literal that a double cannot hold exactly keeps
/// its original text as a string.
///
/// # Examples
///
/// ```
/// # use dump_migrator::dump::decoder::decode_value;
/// # use serde_json::json;
/// assert_eq!(decode_value("NULL"), json!(null));
/// assert_eq!(decode_value("'O''Brien'"), json!("O'Brien"));
/// assert_eq!(decode_value("'{\"a\": 1}'::jsonb"), json!({"a": 1}));
/// assert_eq!(decode_value("42"), json!(42));
/// assert_eq!(decode_value("now()"), json!("now()"));
/// ```
pub fn decode_value(token: &str) -> Value {
    let token = strip_type_cast(token.trim());

    if token.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if token.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if token.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if let Some(text) = unquote_string_literal(token) {
        if looks_structured(&text) {
            if let Ok(structured) = serde_json::from_str::<Value>(&text) {
                return structured;
            }
        }
        return Value::String(text);
    }

    if NUMBER_RE.is_match(token) {
        if let Some(number) = parse_number(token) {
            return Value::Number(number);
        }
    }

    Value::String(token.to_string())
}

/// Match the single-row insert shape and align columns with raw value tokens
pub(crate) fn split_insert(statement: &str) -> Option<RawInsert> {
    let caps = INSERT_RE.captures(statement)?;
    let target = QualifiedName::parse(caps.name("table")?.as_str())?;

    let columns: Vec<String> = split_top_level(caps.name("columns")?.as_str())
        .iter()
        .map(|column| unquote_identifier(column))
        .collect();

    let raw_values = caps.name("values")?.as_str();
    if !is_balanced(raw_values) {
        return None;
    }
    let values = split_top_level(raw_values);

    if columns.is_empty() || columns.len() != values.len() {
        tracing::debug!(
            "Column/value count mismatch for '{}': {} columns, {} values",
            target.name,
            columns.len(),
            values.len()
        );
        return None;
    }

    Some(RawInsert {
        target,
        columns,
        values,
    })
}

/// Decode `INSERT INTO <table> (<cols>) VALUES (<vals>)` into a record
///
/// Returns `None` when the statement is not a single-row insert of that shape
/// or when the number of values differs from the number of columns.
pub fn parse_insert_to_record(statement: &str) -> Option<InsertRecord> {
    let raw = split_insert(statement)?;

    let record: Record = raw
        .columns
        .into_iter()
        .zip(raw.values.iter().map(|token| decode_value(token)))
        .collect();

    Some(InsertRecord {
        table: raw.target.name,
        record,
    })
}

/// Recognize `DELETE FROM <table>` with no filter clause
pub fn parse_delete_all(statement: &str) -> Option<DeleteAll> {
    let caps = DELETE_ALL_RE.captures(statement)?;
    let target = QualifiedName::parse(caps.name("table")?.as_str())?;
    Some(DeleteAll { table: target.name })
}
