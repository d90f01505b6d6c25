//! Price recalculation and amount formatting
//!
//! `corrected = prior - ((prior / (100 + rate)) * 100)`
//!
//! With a gross price this yields the VAT share contained in it (121,00 at
//! 21% gives 21,00), not the net price. The downstream field is still called
//! the corrected total.

use crate::error::OverlayError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Digits with optional thousands/decimal separators
    static ref AMOUNT_PATTERN: Regex = Regex::new(r"\d(?:[\d.,]*\d)?").unwrap();
}

/// Absorbs binary representation error before rounding (e.g. 1.005)
const ROUNDING_NUDGE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRecalculation {
    pub prior_gross_value: f64,
    pub vat_rate: f64,
    pub corrected_value: f64,
}

impl PriceRecalculation {
    pub fn compute(prior_gross_value: f64, vat_rate: f64) -> Result<Self, OverlayError> {
        Ok(Self {
            prior_gross_value,
            vat_rate,
            corrected_value: recalculate(prior_gross_value, vat_rate)?,
        })
    }
}

/// Apply the correction formula, rounded to cents half away from zero
pub fn recalculate(prior_value: f64, vat_rate: f64) -> Result<f64, OverlayError> {
    if !(vat_rate > 0.0 && vat_rate < 100.0) {
        return Err(OverlayError::InvalidRate(vat_rate));
    }
    if !prior_value.is_finite() || prior_value <= 0.0 {
        return Err(OverlayError::InvalidValue(prior_value));
    }
    let corrected = prior_value - ((prior_value / (100.0 + vat_rate)) * 100.0);
    Ok(round_cents(corrected))
}

/// Round to 2 decimals, halves away from zero
pub fn round_cents(value: f64) -> f64 {
    let nudged = value + ROUNDING_NUDGE.copysign(value);
    (nudged * 100.0).round() / 100.0
}

/// Decimal separator of a displayed number, if it has a fractional part.
///
/// The last `.` or `,` counts as the decimal separator when one or two
/// digits follow it; every other separator groups thousands.
fn decimal_separator(number: &str) -> Option<char> {
    let (idx, sep) = number.char_indices().rfind(|(_, c)| *c == '.' || *c == ',')?;
    let tail = &number[idx + 1..];
    if (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit()) {
        Some(sep)
    } else {
        None
    }
}

/// Read an amount like `1.540,00`, `121.00`, `€ 121,00` or `1,540`
pub fn parse_amount(text: &str) -> Result<f64, OverlayError> {
    let number = AMOUNT_PATTERN
        .find(text)
        .ok_or_else(|| OverlayError::UnparsableAmount(text.to_string()))?
        .as_str();

    let normalized: String = match decimal_separator(number) {
        Some(sep) => {
            let (int_part, frac_part) = number
                .rsplit_once(sep)
                .ok_or_else(|| OverlayError::UnparsableAmount(text.to_string()))?;
            let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", int_digits, frac_part)
        }
        None => number.chars().filter(char::is_ascii_digit).collect(),
    };

    normalized
        .parse::<f64>()
        .map_err(|_| OverlayError::UnparsableAmount(text.to_string()))
}

/// Format with two decimals, using the decimal separator found in `like`
/// (`.` when it has none) and no thousands grouping
pub fn format_amount(value: f64, like: &str) -> String {
    let sep = AMOUNT_PATTERN
        .find(like)
        .and_then(|m| decimal_separator(m.as_str()))
        .unwrap_or('.');
    let formatted = format!("{:.2}", round_cents(value));
    if sep == '.' {
        formatted
    } else {
        formatted.replace('.', &sep.to_string())
    }
}

/// Replace the number inside `matched` with `value`, keeping any prefix or
/// suffix text ("TOTAL: 121,00" becomes "TOTAL: 21,00")
pub fn rewrite_amount(matched: &str, value: f64) -> Result<String, OverlayError> {
    let span = AMOUNT_PATTERN
        .find(matched)
        .ok_or_else(|| OverlayError::UnparsableAmount(matched.to_string()))?;
    Ok(format!(
        "{}{}{}",
        &matched[..span.start()],
        format_amount(value, span.as_str()),
        &matched[span.end()..]
    ))
}
