//! HTTP endpoint tests using axum-test

use std::time::Duration;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use invoice_core::testing::{build_pdf, sample_invoice, TestText};
use invoice_core::{locate, InvoiceDocument};
use pretty_assertions::assert_eq;

use crate::api::ProcessResponse;
use crate::{app, upload_limit_bytes};
use crate::state::{AppState, DEFAULT_DOWNLOAD_TTL};

const TEST_UPLOAD_LIMIT: usize = 1024 * 1024;

fn create_test_server(state: AppState) -> TestServer {
    TestServer::new(app(state, TEST_UPLOAD_LIMIT)).unwrap()
}

fn pdf_form(bytes: Vec<u8>, file_name: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes)
            .file_name(file_name)
            .mime_type("application/pdf"),
    )
}

#[tokio::test]
async fn test_health_returns_200() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));
    let response = server.get("/health").await;
    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "invoice-server");
}

#[tokio::test]
async fn test_process_then_download() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));

    let response = server
        .post("/api/process")
        .multipart(pdf_form(sample_invoice(), "rechnung.pdf").add_text("style", "download"))
        .await;
    response.assert_status_ok();

    let body = response.json::<ProcessResponse>();
    assert_eq!(body.status, "success");
    assert_eq!(body.detected_vat, Some(21.0));
    assert_eq!(body.prior_total_value, Some(121.0));
    assert_eq!(body.corrected_total_value, Some(21.0));
    assert_eq!(body.prices_updated, Some(1));
    assert_eq!(
        body.download_url,
        format!("/api/download/{}", body.download_token)
    );

    let download = server.get(&body.download_url).await;
    download.assert_status_ok();
    assert_eq!(
        download.header("content-disposition"),
        "attachment; filename=\"rechnung_updated.pdf\""
    );
    let doc = InvoiceDocument::load(download.as_bytes()).unwrap();
    let overlays = locate(&doc, 0, "21,00").unwrap();
    assert_eq!(overlays.len(), 2);
}

#[tokio::test]
async fn test_process_writes_output_copy() {
    let dir = tempfile::tempdir().unwrap();
    let server = create_test_server(AppState::new(
        DEFAULT_DOWNLOAD_TTL,
        Some(dir.path().to_path_buf()),
    ));

    server
        .post("/api/process")
        .multipart(pdf_form(sample_invoice(), "march.pdf"))
        .await
        .assert_status_ok();

    assert!(dir.path().join("march_updated.pdf").exists());
}

#[tokio::test]
async fn test_process_rejects_missing_file() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));
    let response = server
        .post("/api/process")
        .multipart(MultipartForm::new().add_text("style", "download"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "INVALID_UPLOAD");
}

#[tokio::test]
async fn test_process_rejects_non_pdf() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));
    let response = server
        .post("/api/process")
        .multipart(pdf_form(b"plain text".to_vec(), "notes.pdf"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<serde_json::Value>()["code"], "INVALID_PDF");
}

#[tokio::test]
async fn test_process_rejects_other_extensions() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));
    let response = server
        .post("/api/process")
        .multipart(pdf_form(sample_invoice(), "invoice.txt"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["code"], "INVALID_UPLOAD");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Only PDF files are supported"));
}

#[test]
fn test_upload_limit_saturates() {
    assert_eq!(upload_limit_bytes(20), 20 * 1024 * 1024);
    assert_eq!(upload_limit_bytes(usize::MAX), usize::MAX);
}

#[tokio::test]
async fn test_process_without_vat_is_unprocessable() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));
    let pdf = build_pdf(&[vec![TestText::new(72.0, 700.0, 10.0, "Total 121,00")]]);
    let response = server
        .post("/api/process")
        .multipart(pdf_form(pdf, "plain.pdf"))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<serde_json::Value>()["code"],
        "VAT_NOT_DETECTED"
    );
}

#[tokio::test]
async fn test_process_without_prices_is_unprocessable() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));
    let pdf = build_pdf(&[vec![TestText::new(72.0, 700.0, 10.0, "VAT 20%")]]);
    let response = server
        .post("/api/process")
        .multipart(pdf_form(pdf, "empty.pdf"))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<serde_json::Value>()["code"],
        "NO_PRICES_FOUND"
    );
}

#[tokio::test]
async fn test_download_unknown_token() {
    let server = create_test_server(AppState::new(DEFAULT_DOWNLOAD_TTL, None));
    let response = server.get("/api/download/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_expired_token() {
    let server = create_test_server(AppState::new(Duration::ZERO, None));
    let body = server
        .post("/api/process")
        .multipart(pdf_form(sample_invoice(), "old.pdf"))
        .await
        .json::<ProcessResponse>();

    let response = server.get(&body.download_url).await;
    response.assert_status(StatusCode::GONE);
    // reported once, then gone for good
    server
        .get(&body.download_url)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
