/// Request payload validation against the entity catalogue
///
/// Turns a client JSON object (input field names, loosely typed values) into a map of
/// normalized column values, collecting every problem instead of stopping at the first.

use crate::schema::types::{EntityKind, FieldKind, FieldSpec, Record, ID_COLUMN};
use chrono::{NaiveDate, NaiveTime};
use serde_json::{Number, Value};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const MIN_PASSWORD_LEN: usize = 8;

const PASSWORD_INPUT: &str = "password";
const CONFIRM_PASSWORD_INPUT: &str = "confirm_password";

/// Normalized result of a successful validation
#[derive(Debug, Clone, Default)]
pub struct Validated {
    /// Column values ready for storage; `Null` clears an optional column on update
    pub columns: Record,
    /// Plain-text password supplied for a researcher, still to be hashed
    pub password: Option<String>,
}

/// Validate a payload for `kind`.
///
/// `existing` is `None` when creating (every required field must be present) and the
/// stored record when updating (only supplied fields are checked, cross-field rules run
/// against the merged record).
pub fn validate(kind: EntityKind, payload: &Value, existing: Option<&Record>) -> Result<Validated, Vec<String>> {
    let Some(object) = payload.as_object() else {
        return Err(vec!["Request body must be a JSON object".to_string()]);
    };

    let mut errors = Vec::new();
    let mut validated = Validated::default();

    for key in object.keys() {
        let known = key == ID_COLUMN
            || kind.fields().iter().any(|spec| spec.input == key)
            || (kind == EntityKind::Researcher && (key == PASSWORD_INPUT || key == CONFIRM_PASSWORD_INPUT));
        if !known {
            errors.push(format!("Unknown field: {}", key));
        }
    }

    for spec in kind.fields() {
        let raw = object.get(spec.input);
        let blank = raw.map(is_blank).unwrap_or(true);

        if blank {
            let must_be_present = existing.is_none() || raw.is_some();
            if spec.required && must_be_present {
                errors.push(format!("Missing or empty required field: {}", spec.input));
            } else if existing.is_some() && raw.is_some() {
                validated.columns.insert(spec.column.to_string(), Value::Null);
            }
            continue;
        }

        if let Some(value) = raw {
            match normalize(spec, value) {
                Ok(normalized) => {
                    validated.columns.insert(spec.column.to_string(), normalized);
                }
                Err(message) => errors.push(message),
            }
        }
    }

    if kind == EntityKind::Researcher {
        let password = object.get(PASSWORD_INPUT).and_then(Value::as_str).unwrap_or("");
        if !password.is_empty() {
            let confirm = object.get(CONFIRM_PASSWORD_INPUT).and_then(Value::as_str);
            errors.extend(validate_password(password, confirm));
            validated.password = Some(password.to_string());
        }
    }

    if errors.is_empty() {
        let mut merged = existing.cloned().unwrap_or_default();
        for (column, value) in &validated.columns {
            merged.insert(column.clone(), value.clone());
        }
        if let Err(message) = check_date_range(kind, &merged) {
            errors.push(message);
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}

/// Password policy shared by researcher creation and the password change endpoint
pub fn validate_password(password: &str, confirm: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!("Password must be at least {} characters long", MIN_PASSWORD_LEN));
    }
    if confirm != Some(password) {
        errors.push("Passwords do not match".to_string());
    }
    errors
}

/// End dates must not precede begin dates
pub fn check_date_range(kind: EntityKind, record: &Record) -> Result<(), String> {
    let Some((begin_column, end_column)) = kind.date_range() else {
        return Ok(());
    };
    let parse = |column: &str| {
        record
            .get(column)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
    };
    match (parse(begin_column), parse(end_column)) {
        (Some(begin), Some(end)) if end < begin => Err(format!(
            "{} must not be before {}",
            end_column.to_lowercase(),
            begin_column.to_lowercase()
        )),
        _ => Ok(()),
    }
}

/// Parse a query-string filter into the typed value stored for that column.
/// Returns `None` when the text cannot possibly match the column's type.
pub fn parse_filter_value(kind: FieldKind, raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match kind {
        FieldKind::Integer | FieldKind::PositiveInteger => raw.parse::<i64>().ok().map(Value::from),
        FieldKind::Real { .. } => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldKind::Boolean => parse_bool(raw).map(Value::Bool),
        _ => Some(Value::String(raw.to_string())),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn normalize(spec: &FieldSpec, value: &Value) -> Result<Value, String> {
    let name = spec.input;
    let text = || as_text(value).ok_or_else(|| format!("{} must be a string", name));

    match spec.kind {
        FieldKind::Text => text().map(Value::String),
        FieldKind::LongText { max } => {
            let text = text()?;
            if text.chars().count() > max {
                Err(format!("{} exceeds maximum length of {} characters", name, max))
            } else {
                Ok(Value::String(text))
            }
        }
        FieldKind::Integer | FieldKind::PositiveInteger => {
            let number = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| format!("{} must be a valid integer", name))?;
            if spec.kind == FieldKind::PositiveInteger && number <= 0 {
                return Err(format!("{} must be a positive integer", name));
            }
            Ok(Value::from(number))
        }
        FieldKind::Real { min } => {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|n| n.is_finite())
            .ok_or_else(|| format!("{} must be a valid number", name))?;
            if let Some(min) = min {
                if number < min {
                    return Err(if min == 0.0 {
                        format!("{} must be a non-negative number", name)
                    } else {
                        format!("{} must be at least {}", name, min)
                    });
                }
            }
            Number::from_f64(number)
                .map(Value::Number)
                .ok_or_else(|| format!("{} must be a valid number", name))
        }
        FieldKind::Date => {
            let text = text()?;
            NaiveDate::parse_from_str(&text, DATE_FORMAT)
                .map(|date| Value::String(date.format(DATE_FORMAT).to_string()))
                .map_err(|_| format!("Invalid date format for {}. Use YYYY-MM-DD", name))
        }
        FieldKind::Time => {
            let text = text()?;
            NaiveTime::parse_from_str(&text, TIME_FORMAT)
                .map(|time| Value::String(time.format(TIME_FORMAT).to_string()))
                .map_err(|_| format!("Invalid time format for {}. Use HH:MM", name))
        }
        FieldKind::Email => {
            let text = text()?;
            if is_email(&text) {
                Ok(Value::String(text))
            } else {
                Err(format!("Invalid email format for {}", name))
            }
        }
        FieldKind::Phone => {
            let text = text()?;
            if text.len() >= 7 && text.chars().all(|c| c.is_ascii_digit()) {
                Ok(Value::String(text))
            } else {
                Err(format!("Invalid phone number for {}. Must be digits only and at least 7 digits", name))
            }
        }
        FieldKind::Url => {
            let text = text()?;
            if is_url(&text) {
                Ok(Value::String(text))
            } else {
                Err(format!("Invalid URL for {}. Must start with http:// or https://", name))
            }
        }
        FieldKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => parse_bool(s.trim())
                .map(Value::Bool)
                .ok_or_else(|| format!("{} must be true or false", name)),
            _ => Err(format!("{} must be true or false", name)),
        },
    }
}

fn is_email(text: &str) -> bool {
    if text.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

fn is_url(text: &str) -> bool {
    let rest = text
        .strip_prefix("https://")
        .or_else(|| text.strip_prefix("http://"));
    let Some(rest) = rest else {
        return false;
    };
    if text.chars().any(char::is_whitespace) {
        return false;
    }
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    host.contains('.') && host.split('.').all(|part| !part.is_empty())
}
