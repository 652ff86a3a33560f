//! Forgiving deserializers for form-entered figures.
//!
//! Incremental form entry produces nulls, empty strings and half-typed
//! numbers. These helpers turn anything that is not a readable number into
//! zero (or `None`) instead of failing the whole payload.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientAmount {
    Amount(Decimal),
    Other(serde::de::IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientFlag {
    Flag(bool),
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// Reads a decimal amount; null, missing or unreadable values become zero.
pub fn amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientAmount::deserialize(deserializer)? {
        LenientAmount::Amount(value) => value,
        LenientAmount::Other(_) => Decimal::ZERO,
    })
}

/// Reads an optional decimal amount; unreadable values become `None`.
pub fn optional_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientAmount::deserialize(deserializer)? {
        LenientAmount::Amount(value) => Some(value),
        LenientAmount::Other(_) => None,
    })
}

/// Reads a boolean flag; accepts `"true"`/`"false"` strings, anything else
/// is `false`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientFlag::deserialize(deserializer)? {
        LenientFlag::Flag(value) => value,
        LenientFlag::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        LenientFlag::Other(_) => false,
    })
}

/// Reads an optional boolean flag; unreadable values become `None`.
pub fn optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientFlag::deserialize(deserializer)? {
        LenientFlag::Flag(value) => Some(value),
        LenientFlag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        LenientFlag::Other(_) => None,
    })
}

/// Ceiling for any single figure entering a calculation: £1,000,000,000,000,000.
///
/// Sums and rate multiplications of clamped figures stay far inside
/// `Decimal`'s range, so the calculators never overflow.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Clamps a coerced amount to `0..=MAX_AMOUNT`.
pub fn non_negative(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, MAX_AMOUNT)
}

/// Clamps a coerced amount to `-MAX_AMOUNT..=MAX_AMOUNT`, keeping its sign.
pub fn bounded(value: Decimal) -> Decimal {
    value.clamp(-MAX_AMOUNT, MAX_AMOUNT)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "amount")]
        value: Decimal,
        #[serde(default, deserialize_with = "optional_amount")]
        maybe: Option<Decimal>,
        #[serde(default, deserialize_with = "flag")]
        enabled: bool,
    }

    fn probe(json: &str) -> Probe {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn reads_numbers_and_numeric_strings() {
        assert_eq!(probe(r#"{"value": 12.5}"#).value, dec!(12.5));
        assert_eq!(probe(r#"{"value": "1250.40"}"#).value, dec!(1250.40));
    }

    #[test]
    fn missing_null_and_garbage_become_zero() {
        assert_eq!(probe("{}").value, Decimal::ZERO);
        assert_eq!(probe(r#"{"value": null}"#).value, Decimal::ZERO);
        assert_eq!(probe(r#"{"value": "12a"}"#).value, Decimal::ZERO);
        assert_eq!(probe(r#"{"value": [1, 2]}"#).value, Decimal::ZERO);
    }

    #[test]
    fn optional_amount_keeps_absence() {
        assert_eq!(probe("{}").maybe, None);
        assert_eq!(probe(r#"{"maybe": "x"}"#).maybe, None);
        assert_eq!(probe(r#"{"maybe": 3}"#).maybe, Some(dec!(3)));
    }

    #[test]
    fn flags_accept_strings() {
        assert!(probe(r#"{"enabled": true}"#).enabled);
        assert!(probe(r#"{"enabled": "TRUE"}"#).enabled);
        assert!(!probe(r#"{"enabled": "yes please"}"#).enabled);
        assert!(!probe(r#"{"enabled": 1}"#).enabled);
    }

    #[test]
    fn non_negative_clamps() {
        assert_eq!(non_negative(dec!(-5)), Decimal::ZERO);
        assert_eq!(non_negative(dec!(5)), dec!(5));
    }

    #[test]
    fn max_amount_is_one_quadrillion() {
        assert_eq!(MAX_AMOUNT, dec!(1000000000000000));
    }

    #[test]
    fn oversized_amounts_clamp_to_the_ceiling() {
        assert_eq!(non_negative(Decimal::MAX), MAX_AMOUNT);
        assert_eq!(bounded(Decimal::MIN), -MAX_AMOUNT);
        assert_eq!(bounded(dec!(-12.5)), dec!(-12.5));

        let huge = probe(r#"{"value": "79228162514264337593543950335"}"#).value;
        assert_eq!(non_negative(huge), MAX_AMOUNT);
    }
}
