//! Automatic VAT removal: detect the rate, find the prices, rewrite them
//!
//! The printed VAT amount, and small amounts next to the VAT label, are
//! covered without a new value: the correction formula has no meaning for
//! them.

use crate::config::OverlayConfig;
use crate::document::InvoiceDocument;
use crate::error::OverlayError;
use crate::geometry::Rect;
use crate::orchestrator::{update_loaded, RunReport, UpdateOutcome};
use crate::overlay::CoverStyle;
use crate::prices::{scan_line, scan_prices, PriceCandidate};
use crate::recalc::recalculate;
use crate::update::UpdateSpec;
use crate::vat::{detect_vat_amount, detect_vat_in_document, vat_label_pattern, VatAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Amounts below this sitting next to the VAT label are taken for the VAT amount
pub const VAT_AMOUNT_LIMIT: f64 = 500.0;

/// Reach around a VAT label, in points (horizontal, vertical)
const LABEL_REACH: (f64, f64) = (100.0, 30.0);

const AMOUNT_TOLERANCE: f64 = 0.01;

/// What an automatic run found and changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub detected_vat: f64,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    /// Largest price found in the document
    pub prior_total: f64,
    /// `prior_total` run through the correction formula
    pub corrected_total: f64,
    /// Matches redrawn with a recalculated value
    pub prices_updated: usize,
    /// VAT amount printed on the invoice, if found
    pub vat_amount: Option<f64>,
    /// Matches covered without a new value
    pub amounts_covered: usize,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub summary: ProcessSummary,
    pub bytes: Vec<u8>,
    pub report: RunReport,
}

/// Detect VAT, recalculate every price found, and return the updated PDF
pub fn process_invoice(
    source: &[u8],
    cover_style: CoverStyle,
    config: &OverlayConfig,
) -> Result<ProcessOutcome, OverlayError> {
    let doc = InvoiceDocument::load(source)?;

    let vat = detect_vat_in_document(&doc);
    let rate = vat.rate_percent.ok_or(OverlayError::VatNotDetected)?;

    let prices = scan_prices(&doc);
    let prior_total = prices
        .iter()
        .map(|p| p.value)
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
        .ok_or(OverlayError::NoPricesFound)?;
    let corrected_total = recalculate(prior_total, rate)?;
    info!(
        rate,
        prices = prices.len(),
        prior_total,
        corrected_total,
        "prices detected"
    );

    let vat_amount = detect_vat_amount(&doc, rate);
    let cover_only = vat_amount_texts(&doc, rate, &prices, vat_amount.as_ref());
    let specs: Vec<_> = prices
        .iter()
        .map(|p| {
            if cover_only.contains(&p.text) {
                UpdateSpec::cover_amount(p.text.clone())
            } else {
                UpdateSpec::price(p.text.clone()).with_vat_rate(rate)
            }
        })
        .collect();

    let country_code = vat.country_code.clone();
    let country_name = vat.country_name.clone();
    let config = config.clone().with_cover_style(cover_style);
    let UpdateOutcome { bytes, report } = update_loaded(source, doc, vat, &specs, &config)?;

    let prices_updated = report.recalculations().count();
    let summary = ProcessSummary {
        detected_vat: rate,
        country_code,
        country_name,
        prior_total,
        corrected_total,
        prices_updated,
        vat_amount: vat_amount.map(|a| a.value),
        amounts_covered: report.applied_count().saturating_sub(prices_updated),
    };
    Ok(ProcessOutcome {
        summary,
        bytes,
        report,
    })
}

/// Price texts to cover without drawing a new value
fn vat_amount_texts(
    doc: &InvoiceDocument,
    rate: f64,
    prices: &[PriceCandidate],
    vat_amount: Option<&VatAmount>,
) -> HashSet<String> {
    let mut texts: HashSet<String> = prices
        .iter()
        .filter(|p| vat_amount.is_some_and(|a| (p.value - a.value).abs() < AMOUNT_TOLERANCE))
        .map(|p| p.text.clone())
        .collect();

    let Some(label) = vat_label_pattern(rate) else {
        return texts;
    };
    for page_index in 0..doc.page_count() {
        let Ok(page) = doc.page_text(page_index) else {
            continue;
        };
        let labels: Vec<Rect> = page
            .lines
            .iter()
            .filter(|l| label.is_match(&l.text))
            .map(|l| l.bbox)
            .collect();
        if labels.is_empty() {
            continue;
        }
        for line in &page.lines {
            let (dx, dy) = LABEL_REACH;
            let reach = Rect::new(
                line.bbox.x0 - dx,
                line.bbox.y0 - dy,
                line.bbox.x1 + dx,
                line.bbox.y1 + dy,
            );
            if !labels.iter().any(|l| l.intersects(&reach)) {
                continue;
            }
            for (text, value) in scan_line(&line.text) {
                if value < VAT_AMOUNT_LIMIT {
                    debug!(amount = %text, "amount next to the VAT label");
                    texts.insert(text);
                }
            }
        }
    }
    texts
}
