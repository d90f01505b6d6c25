//! API handlers for the invoice server
//!
//! - `GET /health`
//! - `POST /api/process`: upload an invoice, get the VAT summary and a download link
//! - `GET /api/download/:token`: fetch the updated PDF

use std::path::Path as FsPath;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use invoice_core::{output_path, process_invoice, CoverStyle, DEFAULT_OUTPUT_SUFFIX};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::state::{AppState, DownloadLookup};

/// File name used when the upload carries none
const DEFAULT_UPLOAD_NAME: &str = "invoice.pdf";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "invoice-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Process response
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub status: String,
    pub detected_vat: Option<f64>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub prior_total_value: Option<f64>,
    pub corrected_total_value: Option<f64>,
    pub prices_updated: Option<usize>,
    /// Printed VAT amount, covered without a new value
    #[serde(default)]
    pub vat_amount: Option<f64>,
    pub download_url: String,
    pub download_token: String,
}

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
    style: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ServerError> {
    let mut file = None;
    let mut style = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidUpload(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_UPLOAD_NAME)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::InvalidUpload(e.to_string()))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("style") => {
                style = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ServerError::InvalidUpload(e.to_string()))?,
                );
            }
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ServerError::InvalidUpload("missing 'file' field".into()))?;
    if !has_pdf_extension(&file_name) {
        return Err(ServerError::InvalidUpload(
            "Only PDF files are supported".into(),
        ));
    }
    if bytes.is_empty() {
        return Err(ServerError::InvalidUpload("uploaded file is empty".into()));
    }
    Ok(Upload {
        file_name,
        bytes,
        style,
    })
}

fn has_pdf_extension(file_name: &str) -> bool {
    FsPath::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// `<stem>_updated.<ext>` for an uploaded file name, without any directory part
fn download_name(upload_name: &str) -> String {
    let base = FsPath::new(upload_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());
    output_path(FsPath::new(&base), DEFAULT_OUTPUT_SUFFIX)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "invoice_updated.pdf".to_string())
}

/// Handler: POST /api/process
pub async fn handle_process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ServerError> {
    let upload = read_upload(multipart).await?;
    let cover_style = CoverStyle::from_request_style(upload.style.as_deref());
    info!(
        file = %upload.file_name,
        size = upload.bytes.len(),
        style = ?cover_style,
        "process request"
    );

    let config = state.overlay.clone();
    let bytes = upload.bytes;
    let outcome =
        tokio::task::spawn_blocking(move || process_invoice(&bytes, cover_style, &config))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))??;

    let file_name = download_name(&upload.file_name);
    if let Some(dir) = &state.output_dir {
        let target = dir.join(&file_name);
        if let Err(e) = tokio::fs::write(&target, &outcome.bytes).await {
            warn!(path = %target.display(), error = %e, "could not write output copy");
        }
    }

    let token = state.downloads.insert(file_name, outcome.bytes).await;
    let summary = outcome.summary;
    info!(
        vat = summary.detected_vat,
        prices_updated = summary.prices_updated,
        token = %token,
        "invoice processed"
    );

    Ok(Json(ProcessResponse {
        status: "success".to_string(),
        detected_vat: Some(summary.detected_vat),
        country_code: summary.country_code,
        country_name: summary.country_name,
        prior_total_value: Some(summary.prior_total),
        corrected_total_value: Some(summary.corrected_total),
        prices_updated: Some(summary.prices_updated),
        vat_amount: summary.vat_amount,
        download_url: format!("/api/download/{}", token),
        download_token: token,
    }))
}

/// Handler: GET /api/download/:token
pub async fn handle_download(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<(StatusCode, [(String, String); 2], Vec<u8>), ServerError> {
    match state.downloads.get(&token).await {
        DownloadLookup::Ready(download) => Ok((
            StatusCode::OK,
            [
                ("Content-Type".to_string(), "application/pdf".to_string()),
                (
                    "Content-Disposition".to_string(),
                    format!("attachment; filename=\"{}\"", download.file_name),
                ),
            ],
            download.bytes,
        )),
        DownloadLookup::Expired => Err(ServerError::DownloadExpired(token)),
        DownloadLookup::Missing => Err(ServerError::DownloadNotFound(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_download_name() {
        assert_eq!(download_name("rechnung.pdf"), "rechnung_updated.pdf");
        assert_eq!(download_name("../../etc/passwd.pdf"), "passwd_updated.pdf");
        assert_eq!(download_name("scan"), "scan_updated");
    }

    #[test]
    fn test_has_pdf_extension() {
        assert!(has_pdf_extension("rechnung.pdf"));
        assert!(has_pdf_extension("SCAN.PDF"));
        assert!(!has_pdf_extension("notes.txt"));
        assert!(!has_pdf_extension("pdf"));
        assert!(!has_pdf_extension("invoice.pdf.exe"));
    }

    proptest! {
        #[test]
        fn download_name_stays_in_place(name in "[a-z./]{1,24}") {
            let name = download_name(&name);
            prop_assert!(!name.contains('/'));
            prop_assert!(name.contains(DEFAULT_OUTPUT_SUFFIX));
        }
    }
}
