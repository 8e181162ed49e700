//! Monetary amounts in base currency units.
//!
//! Brokers write amounts as "USD 2.5M", "750K", "1,838,274" or "3.2 million".
//! Every amount that crosses the extraction boundary is normalized here, so
//! the rest of the crate only ever sees plain base-unit values.

use std::fmt;
use std::str::FromStr;

use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Metadata, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Scale words and suffixes, matched case-insensitively against the word
/// that directly follows the number.
const SCALE_TOKENS: &[(&str, f64)] = &[
    ("k", 1e3),
    ("tsd", 1e3),
    ("thousand", 1e3),
    ("thousands", 1e3),
    ("m", 1e6),
    ("mm", 1e6),
    ("mn", 1e6),
    ("mio", 1e6),
    ("mill", 1e6),
    ("million", 1e6),
    ("millions", 1e6),
    ("b", 1e9),
    ("bn", 1e9),
    ("billion", 1e9),
    ("billions", 1e9),
];

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Digit-group separators other than ',' and '.', as in "1 000 000",
/// "1'000'000" or with a (narrow) no-break space.
const GROUP_SEPARATORS: &[char] = &[' ', '\'', '’', '\u{00A0}', '\u{202F}'];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmountError {
    #[error("no numeric value found in '{0}'")]
    NoNumber(String),

    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),

    #[error("amount must not be negative, got {0}")]
    Negative(f64),

    #[error("unrecognized unit '{unit}' in '{input}'")]
    UnknownUnit { input: String, unit: String },
}

/// A non-negative amount, always expressed in base currency units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct MonetaryAmount(f64);

impl MonetaryAmount {
    pub const ZERO: MonetaryAmount = MonetaryAmount(0.0);

    pub fn new(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::InvalidNumber(value.to_string()));
        }
        if value < 0.0 {
            return Err(AmountError::Negative(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for MonetaryAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_amount(s)
    }
}

/// Parses a textual amount and multiplies out any scale token.
///
/// A number with no scale token is taken as already being in base units.
pub fn normalize_amount(input: &str) -> Result<MonetaryAmount, AmountError> {
    let trimmed = input.trim();
    let start = trimmed
        .find(|c: char| c.is_ascii_digit() || c == '.')
        .ok_or_else(|| AmountError::NoNumber(input.to_string()))?;

    let (prefix, rest) = trimmed.split_at(start);
    let negative = prefix.contains('-');
    check_prefix(prefix, input)?;

    let (number, suffix) = rest.split_at(number_len(rest));
    let number: String = number.chars().filter(|c| !GROUP_SEPARATORS.contains(c)).collect();

    let value = parse_number(&number)?;
    let scale = parse_scale(suffix, input)?;

    let mut scaled = value * scale;
    if scale > 1.0 {
        // 1.1 * 1e6 is not exactly 1_100_000 in binary floating point
        scaled = (scaled * 100.0).round() / 100.0;
    }
    if negative && scaled != 0.0 {
        return Err(AmountError::Negative(-scaled));
    }

    MonetaryAmount::new(scaled)
}

fn check_prefix(prefix: &str, input: &str) -> Result<(), AmountError> {
    let cleaned: String = prefix
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    if cleaned.is_empty() || is_currency_code(&cleaned) {
        Ok(())
    } else {
        Err(AmountError::UnknownUnit {
            input: input.to_string(),
            unit: cleaned,
        })
    }
}

/// Byte length of the leading number in `rest`. A group separator only
/// counts when it sits between a digit and a group of exactly three digits.
fn number_len(rest: &str) -> usize {
    let chars: Vec<(usize, char)> = rest.char_indices().collect();
    let mut end = 0;

    for (i, &(pos, c)) in chars.iter().enumerate() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            end = pos + c.len_utf8();
        } else if GROUP_SEPARATORS.contains(&c)
            && i > 0
            && chars[i - 1].1.is_ascii_digit()
            && starts_digit_group(&chars[i + 1..])
        {
            continue;
        } else {
            break;
        }
    }
    end
}

fn starts_digit_group(chars: &[(usize, char)]) -> bool {
    chars.len() >= 3
        && chars[..3].iter().all(|(_, c)| c.is_ascii_digit())
        && chars.get(3).map_or(true, |(_, c)| !c.is_ascii_digit())
}

/// Joins "1,234,567" style groups; `None` unless every group after the
/// first has exactly three digits.
fn join_groups(raw: &str, separator: char) -> Option<String> {
    let groups: Vec<&str> = raw.split(separator).collect();
    let first_ok = !groups[0].is_empty() && groups[0].len() <= 3;
    (first_ok && groups[1..].iter().all(|g| g.len() == 3)).then(|| groups.concat())
}

fn parse_number(raw: &str) -> Result<f64, AmountError> {
    let invalid = || AmountError::InvalidNumber(raw.to_string());

    let digits = match (raw.rfind('.'), raw.rfind(',')) {
        (None, None) => raw.to_string(),
        // "1.234.567,89"
        (Some(dot), Some(comma)) if comma > dot => {
            let (int, frac) = raw.split_at(comma);
            format!("{}.{}", join_groups(int, '.').ok_or_else(invalid)?, &frac[1..])
        }
        // "1,598,499.50"
        (Some(dot), Some(_)) => {
            let (int, frac) = raw.split_at(dot);
            format!("{}{}", join_groups(int, ',').ok_or_else(invalid)?, frac)
        }
        (Some(_), None) => {
            if raw.matches('.').count() == 1 {
                raw.to_string()
            } else {
                join_groups(raw, '.').ok_or_else(invalid)?
            }
        }
        (None, Some(_)) => match join_groups(raw, ',') {
            Some(joined) => joined,
            // decimal comma, e.g. "2,5"
            None if raw.matches(',').count() == 1 => raw.replace(',', "."),
            None => return Err(invalid()),
        },
    };

    digits.parse::<f64>().map_err(|_| invalid())
}

fn parse_scale(suffix: &str, input: &str) -> Result<f64, AmountError> {
    let mut words = suffix
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|w| !w.is_empty());

    let Some(first) = words.next() else {
        return Ok(1.0);
    };

    let lowered = first.to_ascii_lowercase();
    let scale = SCALE_TOKENS
        .iter()
        .find(|(token, _)| *token == lowered)
        .map(|(_, scale)| *scale);

    let (scale, trailing) = match scale {
        Some(scale) => (scale, words.next()),
        None => (1.0, Some(first)),
    };

    match trailing {
        None => Ok(scale),
        Some(word) if is_currency_code(word) || word.chars().all(|c| CURRENCY_SYMBOLS.contains(&c)) => {
            Ok(scale)
        }
        Some(word) => Err(AmountError::UnknownUnit {
            input: input.to_string(),
            unit: word.to_string(),
        }),
    }
}

/// Three-letter ISO 4217 style code in any case, e.g. "USD" or "nok".
fn is_currency_code(word: &str) -> bool {
    word.len() == 3 && word.chars().all(|c| c.is_ascii_alphabetic())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountInput {
    Number(f64),
    Text(String),
}

impl Serialize for MonetaryAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for MonetaryAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match AmountInput::deserialize(deserializer)? {
            AmountInput::Number(value) => MonetaryAmount::new(value),
            AmountInput::Text(text) => normalize_amount(&text),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// Deserializes an optional amount, treating blank and "n/a" style
/// placeholders as absent rather than malformed.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<MonetaryAmount>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<AmountInput>::deserialize(deserializer)? {
        None => Ok(None),
        Some(AmountInput::Number(value)) => MonetaryAmount::new(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(AmountInput::Text(text)) => {
            let placeholder = text.trim().to_ascii_lowercase();
            if matches!(placeholder.as_str(), "" | "n/a" | "na" | "none" | "null" | "-") {
                return Ok(None);
            }
            normalize_amount(&text)
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}

impl JsonSchema for MonetaryAmount {
    fn schema_name() -> String {
        "MonetaryAmount".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::Number.into()),
            metadata: Some(Box::new(Metadata {
                description: Some(
                    "Amount in base currency units. Multiply out any scale written in the \
                     document: '2.5M' is 2500000, '750K' is 750000, '1.2 billion' is 1200000000."
                        .to_string(),
                ),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}
