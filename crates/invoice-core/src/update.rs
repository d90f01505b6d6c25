//! Update specifications: what to find and what to draw instead

use serde::{Deserialize, Serialize};

/// Rule name for price fields recalculated from the VAT rate
pub const RULE_RECALCULATE_PRICE: &str = "recalculate_price";

/// Rule name for amounts that are covered and left blank
pub const RULE_COVER_AMOUNT: &str = "cover_amount";

#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    /// Draw this text as given
    Literal(String),
    /// Parse the matched amount and draw the recalculated value. Without an
    /// explicit rate, the rate detected in the document is used.
    RecalculatePrice { vat_rate: Option<f64> },
    /// Cover the matched amount and draw nothing over it
    CoverAmount,
}

/// One substitution request. Specs are applied in the order supplied.
///
/// JSON form, with `search`/`replace` accepted as aliases:
///
/// ```json
/// {"search_text": "Netto", "replacement_text": "Gesamt", "font_size": 9}
/// {"search_text": "121,00", "rule": "recalculate_price", "vat_rate": 21}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUpdateSpec", into = "RawUpdateSpec")]
pub struct UpdateSpec {
    pub search_text: String,
    pub replacement: Replacement,
    pub font_size: Option<f64>,
    pub font_family: Option<String>,
    pub color: Option<String>,
    /// Restrict to one 0-based page
    pub page: Option<usize>,
    /// Shift of the text anchor in points (x right, y down)
    pub offset: Option<(f64, f64)>,
}

impl UpdateSpec {
    pub fn literal(search_text: impl Into<String>, replacement_text: impl Into<String>) -> Self {
        Self::new(search_text, Replacement::Literal(replacement_text.into()))
    }

    /// Recalculate the price found at `search_text`
    pub fn price(search_text: impl Into<String>) -> Self {
        Self::new(search_text, Replacement::RecalculatePrice { vat_rate: None })
    }

    /// Blank out the amount found at `search_text`
    pub fn cover_amount(search_text: impl Into<String>) -> Self {
        Self::new(search_text, Replacement::CoverAmount)
    }

    fn new(search_text: impl Into<String>, replacement: Replacement) -> Self {
        Self {
            search_text: search_text.into(),
            replacement,
            font_size: None,
            font_family: None,
            color: None,
            page: None,
            offset: None,
        }
    }

    /// Fix the VAT rate of a price spec instead of using the detected one
    pub fn with_vat_rate(mut self, rate: f64) -> Self {
        if let Replacement::RecalculatePrice { vat_rate } = &mut self.replacement {
            *vat_rate = Some(rate);
        }
        self
    }

    pub fn with_font_size(mut self, size: f64) -> Self {
        self.font_size = Some(size);
        self
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = Some(family.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_offset(mut self, dx: f64, dy: f64) -> Self {
        self.offset = Some((dx, dy));
        self
    }

    pub fn is_price(&self) -> bool {
        matches!(self.replacement, Replacement::RecalculatePrice { .. })
    }

    /// Amounts only match whole numbers, so `21,00` never hits inside `121,00`
    pub fn matches_amount(&self) -> bool {
        matches!(
            self.replacement,
            Replacement::RecalculatePrice { .. } | Replacement::CoverAmount
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawUpdateSpec {
    #[serde(alias = "search")]
    search_text: String,
    #[serde(alias = "replace", default, skip_serializing_if = "Option::is_none")]
    replacement_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vat_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<(f64, f64)>,
}

impl TryFrom<RawUpdateSpec> for UpdateSpec {
    type Error = String;

    fn try_from(raw: RawUpdateSpec) -> Result<Self, Self::Error> {
        let replacement = match (raw.rule.as_deref(), raw.replacement_text) {
            (Some(RULE_RECALCULATE_PRICE), _) => Replacement::RecalculatePrice {
                vat_rate: raw.vat_rate,
            },
            (Some(RULE_COVER_AMOUNT), _) => Replacement::CoverAmount,
            (Some(other), _) => return Err(format!("unknown rule '{}'", other)),
            (None, Some(text)) => Replacement::Literal(text),
            (None, None) => {
                return Err(format!(
                    "update for '{}' needs replacement_text or rule",
                    raw.search_text
                ))
            }
        };
        Ok(UpdateSpec {
            search_text: raw.search_text,
            replacement,
            font_size: raw.font_size,
            font_family: raw.font_family,
            color: raw.color,
            page: raw.page,
            offset: raw.offset,
        })
    }
}

impl From<UpdateSpec> for RawUpdateSpec {
    fn from(spec: UpdateSpec) -> Self {
        let (replacement_text, rule, vat_rate) = match spec.replacement {
            Replacement::Literal(text) => (Some(text), None, None),
            Replacement::RecalculatePrice { vat_rate } => {
                (None, Some(RULE_RECALCULATE_PRICE.to_string()), vat_rate)
            }
            Replacement::CoverAmount => (None, Some(RULE_COVER_AMOUNT.to_string()), None),
        };
        RawUpdateSpec {
            search_text: spec.search_text,
            replacement_text,
            rule,
            vat_rate,
            font_size: spec.font_size,
            font_family: spec.font_family,
            color: spec.color,
            page: spec.page,
            offset: spec.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_literal_with_aliases() {
        let json = r#"{"search": "Netto", "replace": "Gesamt", "font_size": 9, "offset": [0, -1.5]}"#;
        let spec: UpdateSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec,
            UpdateSpec::literal("Netto", "Gesamt")
                .with_font_size(9.0)
                .with_offset(0.0, -1.5)
        );
    }

    #[test]
    fn test_deserialize_price_rule() {
        let json = r#"{"search_text": "121,00", "rule": "recalculate_price", "vat_rate": 21}"#;
        let spec: UpdateSpec = serde_json::from_str(json).unwrap();
        assert!(spec.is_price());
        assert_eq!(
            spec.replacement,
            Replacement::RecalculatePrice {
                vat_rate: Some(21.0)
            }
        );
    }

    #[test]
    fn test_cover_amount_rule() {
        let spec: UpdateSpec =
            serde_json::from_str(r#"{"search_text": "210,00", "rule": "cover_amount"}"#).unwrap();
        assert_eq!(spec, UpdateSpec::cover_amount("210,00"));
        assert!(spec.matches_amount());
        assert!(!spec.is_price());
        assert!(!UpdateSpec::literal("a", "b").matches_amount());
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            serde_json::json!({"search_text": "210,00", "rule": "cover_amount"})
        );
    }

    #[test]
    fn test_deserialize_rejects_incomplete_spec() {
        let missing = serde_json::from_str::<UpdateSpec>(r#"{"search_text": "x"}"#);
        assert!(missing.is_err());
        let unknown = serde_json::from_str::<UpdateSpec>(r#"{"search_text": "x", "rule": "magic"}"#);
        assert!(unknown.unwrap_err().to_string().contains("unknown rule"));
    }

    #[test]
    fn test_serialize_uses_canonical_names() {
        let spec = UpdateSpec::price("1.540,00").with_vat_rate(19.0).on_page(1);
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "search_text": "1.540,00",
                "rule": "recalculate_price",
                "vat_rate": 19.0,
                "page": 1
            })
        );
    }

    #[test]
    fn test_with_vat_rate_ignored_for_literal() {
        let spec = UpdateSpec::literal("a", "b").with_vat_rate(19.0);
        assert_eq!(spec.replacement, Replacement::Literal("b".to_string()));
    }
}
