use assert_cmd::Command;
use invoice_core::testing::{build_pdf, sample_invoice, TestText};
use invoice_core::{locate, InvoiceDocument};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn invoice_cmd() -> Command {
    Command::cargo_bin("invoice").unwrap()
}

fn write_sample(temp: &TempDir) -> std::path::PathBuf {
    let input = temp.path().join("invoice.pdf");
    fs::write(&input, sample_invoice()).unwrap();
    input
}

#[test]
fn test_update_with_spec_file() {
    let temp = TempDir::new().unwrap();
    let input = write_sample(&temp);
    let specs = temp.path().join("specs.json");
    fs::write(
        &specs,
        r#"[
            {"search_text": "121,00", "rule": "recalculate_price"},
            {"search": "Gutschrift", "replace": "Credit"}
        ]"#,
    )
    .unwrap();

    invoice_cmd()
        .args(["update", input.to_str().unwrap(), "--specs", specs.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied  '121,00'"))
        .stdout(predicate::str::contains("121.00 @ 21% -> 21.00"))
        .stdout(predicate::str::contains("no match 'Gutschrift'"));

    let output = temp.path().join("invoice_updated.pdf");
    let doc = InvoiceDocument::open(&output).unwrap();
    assert_eq!(locate(&doc, 0, "21,00").unwrap().len(), 2);
    assert_eq!(fs::read(&input).unwrap(), sample_invoice());
}

#[test]
fn test_update_custom_suffix() {
    let temp = TempDir::new().unwrap();
    let input = write_sample(&temp);
    let specs = temp.path().join("specs.json");
    fs::write(&specs, r#"{"updates": [{"search": "VAT", "replace": "MwSt"}]}"#).unwrap();

    invoice_cmd()
        .args([
            "update",
            input.to_str().unwrap(),
            "--specs",
            specs.to_str().unwrap(),
            "--suffix",
            "_de",
        ])
        .assert()
        .success();

    assert!(temp.path().join("invoice_de.pdf").exists());
}

#[test]
fn test_update_rejects_empty_suffix() {
    let temp = TempDir::new().unwrap();
    let input = write_sample(&temp);
    let specs = temp.path().join("specs.json");
    fs::write(&specs, r#"[{"search": "VAT", "replace": "MwSt"}]"#).unwrap();

    invoice_cmd()
        .args([
            "update",
            input.to_str().unwrap(),
            "--specs",
            specs.to_str().unwrap(),
            "--suffix",
            "",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("suffix"));
}

#[test]
fn test_auto_recalculates_prices() {
    let temp = TempDir::new().unwrap();
    let input = write_sample(&temp);

    invoice_cmd()
        .args(["auto", input.to_str().unwrap(), "--style", "download"])
        .assert()
        .success()
        .stdout(predicate::str::contains("VAT rate:        21%"))
        .stdout(predicate::str::contains("Corrected total: 21.00"))
        .stdout(predicate::str::contains("Prices updated:  1"))
        .stdout(predicate::str::contains("VAT amount").not());

    assert!(temp.path().join("invoice_updated.pdf").exists());
}

#[test]
fn test_auto_reports_covered_vat_amount() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("summary.pdf");
    fs::write(
        &input,
        build_pdf(&[vec![
            TestText::new(72.0, 720.0, 10.0, "(21 % VAT: 210,00)"),
            TestText::new(72.0, 700.0, 10.0, "Total 1.210,00"),
        ]]),
    )
    .unwrap();

    invoice_cmd()
        .args(["auto", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("VAT amount:      210.00 (covered)"))
        .stdout(predicate::str::contains("Prices updated:  1"));
}

#[test]
fn test_auto_without_vat_fails() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("plain.pdf");
    fs::write(
        &input,
        build_pdf(&[vec![TestText::new(72.0, 700.0, 10.0, "Total 121,00")]]),
    )
    .unwrap();

    invoice_cmd()
        .args(["auto", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No VAT rate"));

    assert!(!temp.path().join("plain_updated.pdf").exists());
}

#[test]
fn test_detect_prints_json() {
    let temp = TempDir::new().unwrap();
    let input = write_sample(&temp);

    invoice_cmd()
        .args(["detect", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rate_percent\": 21.0"))
        .stdout(predicate::str::contains("\"text\": \"121,00\""));
}

#[test]
fn test_missing_input_fails() {
    invoice_cmd()
        .args(["detect", "/nonexistent/invoice.pdf"])
        .assert()
        .failure();
}
