//! Price discovery for automatic VAT removal
//!
//! Finds European-format amounts (`1.540,00`, `1540,00`, `121,00`) line by
//! line and drops the ones that are most likely not prices: tiny values,
//! huge values, and small values sitting next to a percent sign or a
//! discount keyword.

use crate::document::InvoiceDocument;
use crate::recalc::parse_amount;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

lazy_static! {
    static ref PRICE_PATTERN: Regex = Regex::new(r"\d{1,3}(?:\.\d{3})+,\d{2}|\d+,\d{2}").unwrap();
}

pub const MIN_PRICE: f64 = 10.0;
pub const MAX_PRICE: f64 = 100_000.0;

/// Values below this get the percentage and discount checks
const SMALL_PRICE: f64 = 100.0;

/// Chars of context inspected on each side of a match
const CONTEXT_CHARS: usize = 30;

/// Max distance from the end of a small value to a `%` sign
const PERCENT_DISTANCE: usize = 20;

const DISCOUNT_WORDS: &[&str] = &["rabatt", "discount", "reduktion", "reduction"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCandidate {
    /// The amount as printed
    pub text: String,
    pub value: f64,
    /// Page of the first occurrence
    pub page_index: usize,
}

/// Prices in one line of text, in reading order
pub fn scan_line(line: &str) -> Vec<(String, f64)> {
    let mut found = Vec::new();

    for m in PRICE_PATTERN.find_iter(line) {
        if line[m.end()..].starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let Ok(value) = parse_amount(m.as_str()) else {
            continue;
        };
        if !(MIN_PRICE..=MAX_PRICE).contains(&value) {
            continue;
        }
        if value < SMALL_PRICE && looks_like_percentage(line, m.start(), m.end()) {
            debug!(price = m.as_str(), "skipping percentage or discount value");
            continue;
        }
        found.push((m.as_str().to_string(), value));
    }

    found
}

fn looks_like_percentage(line: &str, start: usize, end: usize) -> bool {
    let after: String = line[end..].chars().take(CONTEXT_CHARS).collect();
    let before: String = {
        let chars: Vec<char> = line[..start].chars().collect();
        chars[chars.len().saturating_sub(CONTEXT_CHARS)..].iter().collect()
    };

    let percent_close = after
        .chars()
        .position(|c| c == '%')
        .is_some_and(|distance| distance < PERCENT_DISTANCE);
    let percent_in_context = before.contains('%') || after.contains('%');
    let context = format!("{} {}", before, after).to_lowercase();
    let discount = DISCOUNT_WORDS.iter().any(|w| context.contains(w));

    percent_close || percent_in_context || discount
}

/// Every distinct price in the document, first occurrence order
pub fn scan_prices(doc: &InvoiceDocument) -> Vec<PriceCandidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for page_index in 0..doc.page_count() {
        let Ok(page) = doc.page_text(page_index) else {
            continue;
        };
        for line in &page.lines {
            for (text, value) in scan_line(&line.text) {
                if seen.insert(text.clone()) {
                    candidates.push(PriceCandidate {
                        text,
                        value,
                        page_index,
                    });
                }
            }
        }
    }

    debug!(count = candidates.len(), "prices found");
    candidates
}
