//! Loaded invoice document
//!
//! Wraps `lopdf::Document` with 0-indexed page access, MediaBox lookup and a
//! per-page text layer that is extracted once, the first time it is asked
//! for. The text layer therefore reflects the document as it was loaded:
//! overlays drawn later in the same run are never searched.

use crate::error::OverlayError;
use crate::geometry::PageBox;
use crate::text_layer::{self, PageText};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::cell::OnceCell;
use std::collections::HashSet;
use std::path::Path;

/// Parent chains deeper than this are treated as broken
const MAX_INHERITANCE_DEPTH: usize = 32;

pub struct InvoiceDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    text_layers: Vec<OnceCell<PageText>>,
    /// Pages whose original content has been wrapped in `q ... Q`
    isolated: HashSet<ObjectId>,
}

impl InvoiceDocument {
    /// Parse a PDF from memory
    pub fn load(bytes: &[u8]) -> Result<Self, OverlayError> {
        let doc = Document::load_mem(bytes).map_err(|e| OverlayError::LoadError(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    /// Read and parse a PDF file
    pub fn open(path: &Path) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path)
            .map_err(|e| OverlayError::LoadError(format!("{}: {}", path.display(), e)))?;
        Self::load(&bytes)
    }

    pub fn from_document(doc: Document) -> Self {
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let text_layers = page_ids.iter().map(|_| OnceCell::new()).collect();
        Self {
            doc,
            page_ids,
            text_layers,
            isolated: HashSet::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Object id of the page at 0-based `index`
    pub fn page_id(&self, index: usize) -> Result<ObjectId, OverlayError> {
        self.page_ids
            .get(index)
            .copied()
            .ok_or(OverlayError::PageIndexOutOfRange {
                index,
                page_count: self.page_ids.len(),
            })
    }

    /// The page's MediaBox, inherited from the page tree when absent.
    /// Falls back to US Letter.
    pub fn page_box(&self, index: usize) -> Result<PageBox, OverlayError> {
        let page_id = self.page_id(index)?;
        let media_box = inherited_attribute(&self.doc, page_id, b"MediaBox")
            .and_then(|obj| resolve(&self.doc, obj).as_array().ok())
            .and_then(|arr| {
                let values: Vec<f64> = arr
                    .iter()
                    .filter_map(|v| number(resolve(&self.doc, v)))
                    .collect();
                match values.as_slice() {
                    [x0, y0, x1, y1] => Some(PageBox {
                        x0: x0.min(*x1),
                        y0: y0.min(*y1),
                        x1: x0.max(*x1),
                        y1: y0.max(*y1),
                    }),
                    _ => None,
                }
            });
        Ok(media_box.unwrap_or_default())
    }

    /// Positioned text of a page, extracted on first use
    pub fn page_text(&self, index: usize) -> Result<&PageText, OverlayError> {
        let page_id = self.page_id(index)?;
        let page_box = self.page_box(index)?;
        let cell = &self.text_layers[index];
        Ok(cell.get_or_init(|| text_layer::extract_page(&self.doc, page_id, index, page_box)))
    }

    /// Text of every page, pages separated by a blank line
    pub fn full_text(&self) -> String {
        (0..self.page_count())
            .filter_map(|i| self.page_text(i).ok())
            .map(|page| page.text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn inner(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Marks a page as isolated; returns false when it already was
    pub(crate) fn mark_isolated(&mut self, page_id: ObjectId) -> bool {
        self.isolated.insert(page_id)
    }

    /// Serialize the current state of the document
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, OverlayError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| OverlayError::SaveError(e.to_string()))?;
        Ok(buffer)
    }
}

/// Follow references until a direct object is reached
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Look up a dictionary entry and resolve it
pub(crate) fn dict_get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().map(|obj| resolve(doc, obj))
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Page attribute, walking up `/Parent` for inheritable keys
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}
