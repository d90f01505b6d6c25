//! Find text on a page and report where it is drawn

use crate::document::InvoiceDocument;
use crate::error::OverlayError;
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

/// One occurrence of the search text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMatch {
    pub page_index: usize,
    /// Union of the glyph boxes, top-left origin, y down
    pub bbox: Rect,
    pub matched: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchMode {
    /// Any exact occurrence
    #[default]
    Substring,
    /// Occurrence not embedded in a longer number, so "21,00" does not hit
    /// inside "121,00"
    WholeNumber,
}

/// Every occurrence of `search` on the page, top-to-bottom then
/// left-to-right. Matching is exact and case-sensitive within a line.
pub fn locate(
    doc: &InvoiceDocument,
    page_index: usize,
    search: &str,
) -> Result<Vec<TextMatch>, OverlayError> {
    locate_with(doc, page_index, search, MatchMode::Substring)
}

pub fn locate_with(
    doc: &InvoiceDocument,
    page_index: usize,
    search: &str,
    mode: MatchMode,
) -> Result<Vec<TextMatch>, OverlayError> {
    if search.is_empty() {
        return Err(OverlayError::EmptySearch);
    }
    let page = doc.page_text(page_index)?;
    let search_len = search.chars().count();
    let mut matches = Vec::new();

    for line in &page.lines {
        let chars: Vec<char> = line.text.chars().collect();
        for (byte_idx, _) in line.text.match_indices(search) {
            let start = line.text[..byte_idx].chars().count();
            if mode == MatchMode::WholeNumber && !is_whole_number(&chars, start, search_len) {
                continue;
            }
            if let Some(bbox) = line.span_bbox(start, search_len) {
                matches.push(TextMatch {
                    page_index,
                    bbox,
                    matched: search.to_string(),
                });
            }
        }
    }

    // lines are already ordered; this also orders hits within a line
    matches.sort_by(|a, b| {
        let ya = (a.bbox.y0 * 2.0).round() as i64;
        let yb = (b.bbox.y0 * 2.0).round() as i64;
        ya.cmp(&yb).then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });
    Ok(matches)
}

/// Matches across all pages, in page order
pub fn locate_all(doc: &InvoiceDocument, search: &str) -> Result<Vec<TextMatch>, OverlayError> {
    locate_all_with(doc, search, MatchMode::Substring)
}

pub fn locate_all_with(
    doc: &InvoiceDocument,
    search: &str,
    mode: MatchMode,
) -> Result<Vec<TextMatch>, OverlayError> {
    let mut all = Vec::new();
    for page_index in 0..doc.page_count() {
        all.extend(locate_with(doc, page_index, search, mode)?);
    }
    Ok(all)
}

fn is_whole_number(chars: &[char], start: usize, len: usize) -> bool {
    let is_sep = |c: char| c == '.' || c == ',';
    let at = |i: usize| chars.get(i).copied();

    let before_ok = match start.checked_sub(1).and_then(at) {
        None => true,
        Some(c) if c.is_ascii_digit() => false,
        Some(c) if is_sep(c) => !start
            .checked_sub(2)
            .and_then(at)
            .is_some_and(|p| p.is_ascii_digit()),
        Some(_) => true,
    };
    let end = start + len;
    let after_ok = match at(end) {
        None => true,
        Some(c) if c.is_ascii_digit() => false,
        Some(c) if is_sep(c) => !at(end + 1).is_some_and(|n| n.is_ascii_digit()),
        Some(_) => true,
    };
    before_ok && after_ok
}
