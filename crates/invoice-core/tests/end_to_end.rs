//! End-to-end runs against files on disk

use invoice_core::testing::{build_pdf, sample_invoice, TestText};
use invoice_core::{
    locate, update_invoice_file, InvoiceDocument, OverlayConfig, OverlayError, SpecStatus,
    UpdateSpec, DEFAULT_OUTPUT_SUFFIX,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

// ============================================================
// Price recalculation
// ============================================================

#[test]
fn recalculated_total_is_drawn_over_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("invoice.pdf");
    std::fs::write(&input, sample_invoice()).unwrap();

    let report = update_invoice_file(
        &input,
        &[UpdateSpec::price("121,00")],
        DEFAULT_OUTPUT_SUFFIX,
        &OverlayConfig::default(),
    )
    .unwrap();

    let output = dir.path().join("invoice_updated.pdf");
    assert_eq!(report.output_path.as_deref(), Some(output.as_path()));
    assert_eq!(report.vat.rate_percent, Some(21.0));
    assert_eq!(report.applied_count(), 1);

    let recalculations: Vec<_> = report.recalculations().collect();
    assert_eq!(recalculations.len(), 1);
    assert_eq!(recalculations[0].prior_gross_value, 121.0);
    assert_eq!(recalculations[0].corrected_value, 21.0);

    let updated = InvoiceDocument::open(&output).unwrap();
    let lines = &updated.page_text(0).unwrap().lines;
    let overlay = lines
        .iter()
        .find(|line| line.text == "21,00")
        .expect("overlay text line");
    // drawn where the matched amount starts
    assert!((overlay.bbox.x0 - 137.79).abs() < 0.5);
}

#[test]
fn source_file_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("invoice.pdf");
    let original = sample_invoice();
    std::fs::write(&input, &original).unwrap();

    update_invoice_file(
        &input,
        &[UpdateSpec::literal("Rechnung", "Invoice")],
        DEFAULT_OUTPUT_SUFFIX,
        &OverlayConfig::default(),
    )
    .unwrap();

    assert_eq!(std::fs::read(&input).unwrap(), original);
    assert!(dir.path().join("invoice_updated.pdf").exists());
}

// ============================================================
// Run reporting
// ============================================================

#[test]
fn specs_that_do_not_match_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("invoice.pdf");
    std::fs::write(&input, sample_invoice()).unwrap();

    let report = update_invoice_file(
        &input,
        &[
            UpdateSpec::literal("Gutschrift", "Credit"),
            UpdateSpec::literal("VAT", "MwSt"),
        ],
        "_fixed",
        &OverlayConfig::default(),
    )
    .unwrap();

    assert_eq!(report.specs[0].status, SpecStatus::NoMatch);
    assert_eq!(report.specs[1].status, SpecStatus::Applied);
    assert_eq!(report.skipped_count(), 1);
    assert!(dir.path().join("invoice_fixed.pdf").exists());
}

#[test]
fn multi_page_specs_can_be_restricted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("two_pages.pdf");
    let page = vec![TestText::new(72.0, 700.0, 10.0, "Seite")];
    std::fs::write(&input, build_pdf(&[page.clone(), page])).unwrap();

    let report = update_invoice_file(
        &input,
        &[UpdateSpec::literal("Seite", "Page").on_page(1)],
        DEFAULT_OUTPUT_SUFFIX,
        &OverlayConfig::default(),
    )
    .unwrap();
    assert_eq!(report.specs[0].applied, 1);

    let updated = InvoiceDocument::open(&dir.path().join("two_pages_updated.pdf")).unwrap();
    assert!(locate(&updated, 0, "Page").unwrap().is_empty());
    assert_eq!(locate(&updated, 1, "Page").unwrap().len(), 1);
}

#[test]
fn missing_input_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = update_invoice_file(
        &dir.path().join("missing.pdf"),
        &[UpdateSpec::literal("a", "b")],
        DEFAULT_OUTPUT_SUFFIX,
        &OverlayConfig::default(),
    );
    assert!(matches!(result, Err(OverlayError::LoadError(_))));
}

// ============================================================
// Overlays never feed later searches
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn replacement_text_is_not_matched_again(word in "[A-Z][a-z]{3,8}") {
        let pdf = build_pdf(&[vec![TestText::new(72.0, 700.0, 10.0, "Alpha")]]);
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("chain.pdf");
        std::fs::write(&input, pdf).unwrap();

        let report = update_invoice_file(
            &input,
            &[
                UpdateSpec::literal("Alpha", word.clone()),
                UpdateSpec::literal(word.clone(), "Omega"),
            ],
            DEFAULT_OUTPUT_SUFFIX,
            &OverlayConfig::default(),
        )
        .unwrap();

        prop_assert_eq!(report.specs[0].applied, 1);
        if !"Alpha".contains(word.as_str()) {
            prop_assert_eq!(report.specs[1].applied, 0);
        }
    }
}
