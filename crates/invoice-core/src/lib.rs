//! Text overlay engine for PDF invoices
//!
//! Finds text on a page, covers it with a filled rectangle and draws new
//! text on top. Prices can be recalculated from the VAT rate printed on the
//! invoice instead of being replaced literally.
//!
//! Two entry points:
//! - `update_invoice` / `update_invoice_file`: apply an explicit list of `UpdateSpec`s
//! - `process_invoice`: detect the VAT rate, find every price and rewrite it

pub mod cmap;
pub mod config;
pub mod document;
pub mod encoding;
pub mod error;
pub mod fonts;
pub mod geometry;
pub mod locator;
pub mod orchestrator;
pub mod overlay;
pub mod prices;
pub mod processor;
pub mod recalc;
pub mod text_layer;
pub mod update;
pub mod vat;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{load_update_specs, OverlayConfig, DEFAULT_OUTPUT_SUFFIX};
pub use document::InvoiceDocument;
pub use error::OverlayError;
pub use geometry::Rect;
pub use locator::{locate, locate_all, MatchMode, TextMatch};
pub use orchestrator::{
    output_path, update_invoice, update_invoice_file, RunReport, SpecOutcome, SpecStatus,
    UpdateOutcome,
};
pub use overlay::{
    cover_and_overlay, draw_page_overlays, CoverStyle, OverlayStyle, PlannedOverlay, TextStyle,
};
pub use processor::{process_invoice, ProcessOutcome, ProcessSummary};
pub use recalc::{recalculate, PriceRecalculation};
pub use text_layer::{PageText, TextLine};
pub use update::{Replacement, UpdateSpec};
pub use vat::{detect_vat, detect_vat_amount, VatAmount, VatDetection};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize, OverlayError> {
    Ok(InvoiceDocument::load(bytes)?.page_count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        let pdf = testing::build_pdf(&[vec![], vec![]]);
        assert_eq!(get_page_count(&pdf).unwrap(), 2);
    }

    #[test]
    fn test_page_count_rejects_garbage() {
        assert!(matches!(
            get_page_count(b"not a pdf"),
            Err(OverlayError::LoadError(_))
        ));
    }
}
