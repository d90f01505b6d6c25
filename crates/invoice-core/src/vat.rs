//! VAT rate detection
//!
//! Looks for a percentage written next to a VAT label, in either order
//! ("8,10 % VAT", "MwSt: 19%"). A `VAT` label wins over the local-language
//! labels; otherwise the earliest match in the text is used.

use crate::document::InvoiceDocument;
use crate::recalc::parse_amount;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

const LABELS: &str = r"VAT|MwSt\.?|Mehrwertsteuer|USt\.?|GST|TVA|IVA|BTW|MVA|Moms|ALV|DPH|PTU";

lazy_static! {
    /// "19 % MwSt", "8,10% VAT"
    static ref RATE_BEFORE_LABEL: Regex = Regex::new(&format!(
        r"(?i)(\d+(?:[.,]\d+)?)\s*%[ \t]*({LABELS})\b"
    ))
    .unwrap();

    /// "VAT: 19%", "MwSt. (7 %)", "USt-Satz 19%"
    static ref LABEL_BEFORE_RATE: Regex = Regex::new(&format!(
        r"(?i)\b({LABELS})(?:\s*-?\s*(?:rate|satz))?[\s:(]*(\d+(?:[.,]\d+)?)\s*%"
    ))
    .unwrap();
}

/// Outcome of scanning a document for its VAT rate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VatDetection {
    pub rate_percent: Option<f64>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    /// Label the rate was found next to, as written
    pub marker: Option<String>,
}

impl VatDetection {
    pub fn is_detected(&self) -> bool {
        self.rate_percent.is_some()
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    position: usize,
    rate: f64,
    marker: String,
}

/// Detect the VAT rate in extracted page text
pub fn detect_vat(text: &str) -> VatDetection {
    let mut candidates: Vec<Candidate> = Vec::new();

    for caps in RATE_BEFORE_LABEL.captures_iter(text) {
        if let (Some(whole), Some(rate), Some(label)) = (caps.get(0), caps.get(1), caps.get(2)) {
            candidates.push(Candidate {
                position: whole.start(),
                rate: parse_rate(rate.as_str()),
                marker: label.as_str().to_string(),
            });
        }
    }
    for caps in LABEL_BEFORE_RATE.captures_iter(text) {
        if let (Some(whole), Some(label), Some(rate)) = (caps.get(0), caps.get(1), caps.get(2)) {
            candidates.push(Candidate {
                position: whole.start(),
                rate: parse_rate(rate.as_str()),
                marker: label.as_str().to_string(),
            });
        }
    }

    candidates.retain(|c| c.rate > 0.0 && c.rate < 100.0);
    candidates.sort_by_key(|c| (!c.marker.eq_ignore_ascii_case("vat"), c.position));

    let Some(best) = candidates.into_iter().next() else {
        debug!("no VAT marker found");
        return VatDetection::default();
    };

    let country = infer_country(&best.marker, best.rate);
    debug!(rate = best.rate, marker = %best.marker, country = ?country.map(|c| c.0), "VAT detected");

    VatDetection {
        rate_percent: Some(best.rate),
        country_code: country.map(|(code, _)| code.to_string()),
        country_name: country.map(|(_, name)| name.to_string()),
        marker: Some(best.marker),
    }
}

/// Detect the VAT rate across all pages of a document
pub fn detect_vat_in_document(doc: &InvoiceDocument) -> VatDetection {
    detect_vat(&doc.full_text())
}

/// VAT amount printed after its rate, as in "(8,10 % VAT: 240,31)"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatAmount {
    /// The amount as printed
    pub text: String,
    pub value: f64,
    pub page_index: usize,
}

/// Regex source matching `rate` as it may be printed: `21`, `21,0`, `8.1`, `8,10`
fn rate_fragment(rate: f64) -> String {
    let formatted = format!("{}", rate);
    match formatted.split_once('.') {
        Some((int, frac)) => format!(r"{}[.,]{}0*", int, frac),
        None => format!(r"{}(?:[.,]0+)?", formatted),
    }
}

/// "21 % VAT", "(8,10% MwSt": the rate followed by a VAT label
pub fn vat_label_pattern(rate: f64) -> Option<Regex> {
    Regex::new(&format!(
        r"(?i)(?:^|[^\d.,]){}\s*%[^\n]*?\b(?:{LABELS})",
        rate_fragment(rate)
    ))
    .ok()
}

fn vat_amount_pattern(rate: f64) -> Option<Regex> {
    Regex::new(&format!(
        r"(?i)\(\s*{}\s*%\s*(?:{LABELS})[:\s]*(\d[\d.,]*\d)",
        rate_fragment(rate)
    ))
    .ok()
}

/// First VAT amount printed in the document for `rate`
pub fn detect_vat_amount(doc: &InvoiceDocument, rate: f64) -> Option<VatAmount> {
    let pattern = vat_amount_pattern(rate)?;
    (0..doc.page_count()).find_map(|page_index| {
        let text = doc.page_text(page_index).ok()?.text();
        let amount = pattern.captures(&text)?.get(1)?.as_str().to_string();
        let value = parse_amount(&amount).ok()?;
        debug!(amount = %amount, page = page_index, "VAT amount found");
        Some(VatAmount {
            text: amount,
            value,
            page_index,
        })
    })
}

fn parse_rate(raw: &str) -> f64 {
    raw.replace(',', ".").parse().unwrap_or(f64::NAN)
}

/// (label, rates, country code, country name); first matching row wins,
/// an empty rate list matches any rate
const COUNTRY_TABLE: &[(&str, &[f64], &str, &str)] = &[
    ("mwst", &[19.0, 7.0], "DE", "Germany"),
    ("mwst", &[20.0, 10.0, 13.0], "AT", "Austria"),
    ("mwst", &[8.1, 7.7, 2.6, 2.5, 3.8, 3.7], "CH", "Switzerland"),
    ("mehrwertsteuer", &[19.0, 7.0], "DE", "Germany"),
    ("mehrwertsteuer", &[20.0, 10.0, 13.0], "AT", "Austria"),
    ("mehrwertsteuer", &[8.1, 7.7, 2.6], "CH", "Switzerland"),
    ("ust", &[19.0, 7.0], "DE", "Germany"),
    ("ust", &[20.0, 10.0, 13.0], "AT", "Austria"),
    ("tva", &[20.0, 10.0, 5.5, 2.1], "FR", "France"),
    ("tva", &[21.0, 12.0, 6.0], "BE", "Belgium"),
    ("tva", &[17.0, 16.0, 14.0, 8.0, 3.0], "LU", "Luxembourg"),
    ("tva", &[8.1, 7.7, 2.6], "CH", "Switzerland"),
    ("iva", &[22.0, 10.0, 5.0, 4.0], "IT", "Italy"),
    ("iva", &[21.0], "ES", "Spain"),
    ("iva", &[23.0, 13.0, 6.0], "PT", "Portugal"),
    ("btw", &[21.0, 9.0], "NL", "Netherlands"),
    ("btw", &[12.0, 6.0], "BE", "Belgium"),
    ("mva", &[], "NO", "Norway"),
    ("moms", &[25.0, 12.0, 6.0], "SE", "Sweden"),
    ("moms", &[], "DK", "Denmark"),
    ("alv", &[], "FI", "Finland"),
    ("dph", &[21.0, 12.0], "CZ", "Czech Republic"),
    ("dph", &[], "SK", "Slovakia"),
    ("ptu", &[], "PL", "Poland"),
    ("gst", &[9.0, 8.0], "SG", "Singapore"),
    ("gst", &[10.0], "AU", "Australia"),
    ("gst", &[15.0], "NZ", "New Zealand"),
    ("gst", &[5.0], "CA", "Canada"),
    ("vat", &[20.0, 5.0], "GB", "United Kingdom"),
    ("vat", &[23.0, 13.5, 9.0], "IE", "Ireland"),
    ("vat", &[8.1, 7.7, 2.6], "CH", "Switzerland"),
];

/// Map a label and rate to a country. Returns `None` when the pair is not
/// distinctive.
fn infer_country(marker: &str, rate: f64) -> Option<(&'static str, &'static str)> {
    let label = marker.trim_end_matches('.').to_lowercase();
    COUNTRY_TABLE
        .iter()
        .find(|(l, rates, _, _)| {
            *l == label && (rates.is_empty() || rates.iter().any(|r| (r - rate).abs() < 1e-6))
        })
        .map(|(_, _, code, name)| (*code, *name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rate_fragment_accepts_printed_forms() {
        let label = vat_label_pattern(8.1).unwrap();
        assert!(label.is_match("(8,10 % VAT: 240,31)"));
        assert!(label.is_match("8.1% MwSt"));
        assert!(!label.is_match("18,1 % VAT"));

        let label = vat_label_pattern(21.0).unwrap();
        assert!(label.is_match("zzgl. 21,0 % VAT"));
        assert!(!label.is_match("121 % VAT"));
        assert!(!label.is_match("VAT 21%"));
    }

    #[test]
    fn test_detect_vat_amount() {
        use crate::testing::{build_pdf, TestText};

        let pdf = build_pdf(&[
            vec![TestText::new(72.0, 700.0, 10.0, "Total 1.210,00")],
            vec![TestText::new(72.0, 700.0, 10.0, "(21 % VAT: 210,00)")],
        ]);
        let doc = InvoiceDocument::load(&pdf).unwrap();
        assert_eq!(
            detect_vat_amount(&doc, 21.0),
            Some(VatAmount {
                text: "210,00".into(),
                value: 210.0,
                page_index: 1
            })
        );
        assert_eq!(detect_vat_amount(&doc, 19.0), None);
    }

    #[test]
    fn test_label_then_rate() {
        let d = detect_vat("Subtotal 100,00\nVAT: 19%\nTotal 119,00");
        assert_eq!(d.rate_percent, Some(19.0));
        assert_eq!(d.marker.as_deref(), Some("VAT"));
    }

    #[test]
    fn test_rate_then_label_with_comma_decimal() {
        let d = detect_vat("zzgl. 8,10 % MwSt");
        assert_eq!(d.rate_percent, Some(8.1));
        assert_eq!(d.country_code.as_deref(), Some("CH"));
        assert_eq!(d.country_name.as_deref(), Some("Switzerland"));
    }

    #[test]
    fn test_case_insensitive() {
        let d = detect_vat("mwst. 7%");
        assert_eq!(d.rate_percent, Some(7.0));
        assert_eq!(d.country_code.as_deref(), Some("DE"));
    }

    #[test]
    fn test_vat_label_takes_priority() {
        let d = detect_vat("MwSt 19%\n...\nVAT 20%");
        assert_eq!(d.rate_percent, Some(20.0));
        assert_eq!(d.country_code.as_deref(), Some("GB"));
    }

    #[test]
    fn test_earliest_match_otherwise() {
        let d = detect_vat("TVA 20 %\nIVA 22 %");
        assert_eq!(d.rate_percent, Some(20.0));
        assert_eq!(d.country_code.as_deref(), Some("FR"));
    }

    #[test]
    fn test_out_of_range_rates_are_ignored() {
        assert!(!detect_vat("VAT 0%").is_detected());
        assert!(!detect_vat("VAT 100%").is_detected());
        assert_eq!(detect_vat("VAT 150% VAT 21%").rate_percent, Some(21.0));
    }

    #[test]
    fn test_percent_sign_required() {
        assert!(!detect_vat("VAT number 12345678").is_detected());
        assert!(!detect_vat("Invoice total 121,00").is_detected());
    }

    #[test]
    fn test_country_inference() {
        assert_eq!(detect_vat("IVA 21%").country_code.as_deref(), Some("ES"));
        assert_eq!(detect_vat("BTW 21%").country_code.as_deref(), Some("NL"));
        assert_eq!(detect_vat("USt-Satz 19%").country_code.as_deref(), Some("DE"));
        assert_eq!(detect_vat("GST (10%)").country_code.as_deref(), Some("AU"));
        let unknown = detect_vat("VAT 17%");
        assert_eq!(unknown.rate_percent, Some(17.0));
        assert_eq!(unknown.country_code, None);
    }

    #[test]
    fn test_label_inside_word_is_not_a_marker() {
        assert!(!detect_vat("Private 19%").is_detected());
    }
}
