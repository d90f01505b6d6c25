use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    #[error("Failed to load PDF: {0}")]
    LoadError(String),

    #[error("Page index {index} out of range (document has {page_count} pages)")]
    PageIndexOutOfRange { index: usize, page_count: usize },

    #[error("Search text must not be empty")]
    EmptySearch,

    #[error("VAT rate {0} is outside the open interval (0, 100)")]
    InvalidRate(f64),

    #[error("Value {0} must be a positive amount")]
    InvalidValue(f64),

    #[error("Cannot read an amount from '{0}'")]
    UnparsableAmount(String),

    #[error("No VAT rate could be detected in the document")]
    VatNotDetected,

    #[error("No prices found in the document")]
    NoPricesFound,

    #[error("Failed to save PDF: {0}")]
    SaveError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}

impl OverlayError {
    /// Load and save failures abort a whole run; everything else is scoped
    /// to a single update or match.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OverlayError::LoadError(_) | OverlayError::SaveError(_))
    }
}

impl From<lopdf::Error> for OverlayError {
    fn from(err: lopdf::Error) -> Self {
        OverlayError::OperationError(err.to_string())
    }
}
