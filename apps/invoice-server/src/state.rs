//! Application state for the invoice server
//!
//! Processed documents are kept in memory until they are downloaded or
//! their time-to-live runs out.

use invoice_core::OverlayConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Default lifetime of a download link
pub const DEFAULT_DOWNLOAD_TTL: Duration = Duration::from_secs(60 * 60);

/// An updated document waiting to be fetched
#[derive(Debug, Clone)]
pub struct StoredDownload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub expires_at: Instant,
}

/// Lookup result for a download token
#[derive(Debug)]
pub enum DownloadLookup {
    Ready(StoredDownload),
    Expired,
    Missing,
}

#[derive(Clone)]
pub struct DownloadStore {
    entries: Arc<RwLock<HashMap<String, StoredDownload>>>,
    ttl: Duration,
}

impl DownloadStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Store a document and return its token
    pub async fn insert(&self, file_name: String, bytes: Vec<u8>) -> String {
        let token = Uuid::new_v4().to_string();
        let expires_at = Instant::now() + self.ttl;

        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, d| d.expires_at > now);
        entries.insert(
            token.clone(),
            StoredDownload {
                file_name,
                bytes,
                expires_at,
            },
        );
        debug!(token = %token, stored = entries.len(), "download stored");
        token
    }

    /// Look up a token. An expired entry is reported once and dropped.
    pub async fn get(&self, token: &str) -> DownloadLookup {
        let mut entries = self.entries.write().await;
        match entries.get(token) {
            Some(d) if d.expires_at <= Instant::now() => {
                entries.remove(token);
                debug!(token = %token, "expired download dropped");
                DownloadLookup::Expired
            }
            Some(d) => DownloadLookup::Ready(d.clone()),
            None => DownloadLookup::Missing,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub downloads: DownloadStore,
    pub overlay: OverlayConfig,
    /// Also write every updated document here when set
    pub output_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(download_ttl: Duration, output_dir: Option<PathBuf>) -> Self {
        Self {
            downloads: DownloadStore::new(download_ttl),
            overlay: OverlayConfig::default(),
            output_dir,
        }
    }
}
