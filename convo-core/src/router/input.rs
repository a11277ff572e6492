//! Input validation for data-collection steps.
//!
//! A rejected input is not an error: the handler re-prompts the same state
//! with the message carried in `Err`.

use crate::session::SessionData;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Date constraint relative to today or to another collected field.
#[derive(Debug, Clone, Copy)]
pub enum DateRule {
    /// Today or earlier.
    Past,
    /// Today or later.
    Future,
    /// Strictly after the date stored under the field.
    After(&'static str),
    /// At least this many years ago (date of birth).
    AgeAtLeast(u32),
}

#[derive(Debug, Clone, Copy)]
pub enum InputKind {
    Text { min: usize, max: usize },
    Number { min: u64, max: u64 },
    Date(DateRule),
    Email,
    Phone,
    YesNo,
    /// Pick by number ("1".."n") or by label.
    Options(&'static [&'static str]),
    /// Comma-separated ages; the count must equal the number stored under the field.
    AgeList { count_field: &'static str },
    /// Uppercased input must match the pattern.
    Pattern {
        regex: &'static LazyLock<Regex>,
        hint: &'static str,
    },
}

const DATE_FORMAT: &str = "%d/%m/%Y";

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").unwrap());
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?\d{9,15}$").unwrap());

/// Vehicle registration plate.
pub static REGISTRATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9 ]{3,9}$").unwrap());

/// National ID or passport number.
pub static ID_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{6,12}$").unwrap());

pub static POLICY_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,4}-?\d{4,10}$").unwrap());

impl InputKind {
    /// Validate `raw` (trimmed, original case) and convert it to the stored value.
    pub fn parse(&self, raw: &str, data: &SessionData) -> Result<Value, String> {
        let raw = raw.trim();
        match *self {
            InputKind::Text { min, max } => {
                let len = raw.chars().count();
                if len < min {
                    Err(format!("Please enter at least {min} characters."))
                } else if len > max {
                    Err(format!("Please keep it under {max} characters."))
                } else {
                    Ok(Value::String(raw.to_string()))
                }
            }
            InputKind::Number { min, max } => {
                let n = parse_amount(raw).ok_or("Please enter a number, e.g. 1500000.")?;
                if n < min || n > max {
                    Err(format!("Please enter a number between {min} and {max}."))
                } else {
                    Ok(Value::from(n))
                }
            }
            InputKind::Date(rule) => parse_date(raw, rule, data),
            InputKind::Email => {
                let lowered = raw.to_lowercase();
                if EMAIL_PATTERN.is_match(&lowered) {
                    Ok(Value::String(lowered))
                } else {
                    Err("That doesn't look like a valid email address.".into())
                }
            }
            InputKind::Phone => {
                let compact: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
                if PHONE_PATTERN.is_match(&compact) {
                    Ok(Value::String(compact))
                } else {
                    Err("Please enter a valid phone number, e.g. +254712345678.".into())
                }
            }
            InputKind::YesNo => match raw.to_lowercase().as_str() {
                "yes" | "y" | "1" => Ok(Value::Bool(true)),
                "no" | "n" | "2" => Ok(Value::Bool(false)),
                _ => Err("Please reply yes or no.".into()),
            },
            InputKind::Options(options) => pick_option(raw, options)
                .map(|label| Value::String(label.to_string()))
                .ok_or_else(|| format!("Please reply with a number from 1 to {}.", options.len())),
            InputKind::AgeList { count_field } => parse_ages(raw, count_field, data),
            InputKind::Pattern { regex, hint } => {
                let upper = raw.to_uppercase();
                if regex.is_match(&upper) {
                    Ok(Value::String(upper))
                } else {
                    Err(hint.to_string())
                }
            }
        }
    }
}

/// Parse a whole amount, accepting thousands separators.
pub fn parse_amount(raw: &str) -> Option<u64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != ' ').collect();
    cleaned.parse().ok()
}

/// Resolve a menu reply to one of `options`.
pub fn pick_option(raw: &str, options: &[&'static str]) -> Option<&'static str> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| options.get(i)).copied();
    }
    options.iter().copied().find(|o| o.eq_ignore_ascii_case(raw))
}

fn parse_date(raw: &str, rule: DateRule, data: &SessionData) -> Result<Value, String> {
    let date = NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| "Please enter the date as DD/MM/YYYY.".to_string())?;
    let today = Utc::now().date_naive();

    match rule {
        DateRule::Past if date > today => return Err("That date is in the future.".into()),
        DateRule::Future if date < today => return Err("That date has already passed.".into()),
        DateRule::After(field) => {
            let earlier = data
                .get(field)
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            if earlier.is_some_and(|earlier| date <= earlier) {
                return Err("That date must be after the previous one.".into());
            }
        }
        DateRule::AgeAtLeast(years) => {
            let mut age = today.year() - date.year();
            if (today.month(), today.day()) < (date.month(), date.day()) {
                age -= 1;
            }
            if date > today || age < years as i32 {
                return Err(format!("You must be at least {years} years old."));
            }
        }
        _ => {}
    }
    Ok(Value::String(date.format("%Y-%m-%d").to_string()))
}

fn parse_ages(raw: &str, count_field: &str, data: &SessionData) -> Result<Value, String> {
    let ages: Vec<u64> = raw
        .split(',')
        .map(|part| part.trim().parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| "Please list ages as numbers separated by commas, e.g. 34, 8, 5.".to_string())?;

    if ages.iter().any(|age| *age > 100) {
        return Err("Ages must be between 0 and 100.".into());
    }
    if let Some(expected) = data.get(count_field).and_then(Value::as_u64) {
        if ages.len() as u64 != expected {
            return Err(format!("Please enter exactly {expected} ages."));
        }
    }
    Ok(Value::from(ages))
}
