//! Cover-and-overlay editing
//!
//! Paints a filled rectangle over a located box and draws the replacement
//! text on top. Both go into a content stream appended to the page, after
//! the original content has been wrapped in `q ... Q` so the overlay starts
//! from the default coordinate system. The original glyphs stay in the
//! content stream underneath the cover.

use crate::document::{dict_get, inherited_attribute, resolve, InvoiceDocument};
use crate::encoding::encode_win_ansi;
use crate::error::OverlayError;
use crate::fonts::StandardFont;
use crate::geometry::Rect;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Margin added around a match before it is covered
pub const COVER_PADDING: f64 = 2.0;

/// Background painted over the original text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverStyle {
    /// Plain white, for documents meant to be downloaded as final
    OpaqueWhite,
    /// Pale yellow, so edited values stand out on review
    #[default]
    HighlightYellow,
}

impl CoverStyle {
    pub fn fill_rgb(&self) -> (f64, f64, f64) {
        match self {
            CoverStyle::OpaqueWhite => (1.0, 1.0, 1.0),
            CoverStyle::HighlightYellow => (1.0, 1.0, 0.85),
        }
    }

    /// The upload form sends `style=download` for a clean white cover
    pub fn from_request_style(style: Option<&str>) -> Self {
        match style.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("download") => CoverStyle::OpaqueWhite,
            _ => CoverStyle::HighlightYellow,
        }
    }
}

/// Font and colour of the replacement text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_size: f64,
    /// Short name (`helv`, `tiro`, `cour`), CSS family or font name
    pub font_family: String,
    /// Hex colour, `#RRGGBB` or `#RGB`
    pub color: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 8.0,
            font_family: "helv".to_string(),
            color: "#000000".to_string(),
        }
    }
}

impl TextStyle {
    pub fn standard_font(&self) -> StandardFont {
        StandardFont::from_family(&self.font_family)
    }

    pub fn rgb(&self) -> (f64, f64, f64) {
        parse_hex_color(&self.color)
    }
}

/// Everything `cover_and_overlay` needs besides the box and the text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub cover: CoverStyle,
    pub text: TextStyle,
    pub padding: f64,
    /// Shift of the text anchor, in page space (x right, y down)
    pub offset: (f64, f64),
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            cover: CoverStyle::default(),
            text: TextStyle::default(),
            padding: COVER_PADDING,
            offset: (0.0, 0.0),
        }
    }
}

/// Parse hex color string (e.g., "#FF0000", "F00") to RGB in 0..1.
/// Anything unreadable is black.
pub fn parse_hex_color(color: &str) -> (f64, f64, f64) {
    let hex = color.trim().trim_start_matches('#');
    let channel = |s: &str| u8::from_str_radix(s, 16).map(|v| f64::from(v) / 255.0);
    let parsed = match hex.len() {
        6 if hex.is_ascii() => (
            channel(&hex[0..2]),
            channel(&hex[2..4]),
            channel(&hex[4..6]),
        ),
        3 if hex.is_ascii() => (
            channel(&hex[0..1].repeat(2)),
            channel(&hex[1..2].repeat(2)),
            channel(&hex[2..3].repeat(2)),
        ),
        _ => return (0.0, 0.0, 0.0),
    };
    match parsed {
        (Ok(r), Ok(g), Ok(b)) => (r, g, b),
        _ => (0.0, 0.0, 0.0),
    }
}

/// One cover, and the text to draw over it, waiting to be painted
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOverlay {
    pub bbox: Rect,
    /// Empty for a cover without text
    pub text: String,
    pub style: OverlayStyle,
}

/// Cover `bbox` on a page and draw `replacement_text` over it.
///
/// The text baseline is anchored at the bottom-left corner of `bbox`,
/// shifted by `style.offset`. Repeating the same call paints the same
/// result again.
pub fn cover_and_overlay(
    doc: &mut InvoiceDocument,
    page_index: usize,
    bbox: &Rect,
    replacement_text: &str,
    style: &OverlayStyle,
) -> Result<(), OverlayError> {
    let overlay = PlannedOverlay {
        bbox: *bbox,
        text: replacement_text.to_string(),
        style: style.clone(),
    };
    draw_page_overlays(doc, page_index, std::slice::from_ref(&overlay))
}

/// Paint several overlays on one page in a single appended stream.
///
/// Every cover is painted before any text, so the padded cover of one match
/// never lands on the text drawn for a neighbouring one.
pub fn draw_page_overlays(
    doc: &mut InvoiceDocument,
    page_index: usize,
    overlays: &[PlannedOverlay],
) -> Result<(), OverlayError> {
    if overlays.is_empty() {
        return Ok(());
    }
    let page_id = doc.page_id(page_index)?;
    let page_box = doc.page_box(page_index)?;

    if doc.mark_isolated(page_id) {
        isolate_page_content(doc.inner_mut(), page_id)?;
    }

    let mut operations = Vec::new();
    for overlay in overlays {
        let (x, y, w, h) = page_box.rect_to_pdf(&overlay.bbox.expand(overlay.style.padding));
        let (fr, fg, fb) = overlay.style.cover.fill_rgb();
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![real(fr), real(fg), real(fb)]),
            Operation::new("re", vec![real(x), real(y), real(w), real(h)]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    for overlay in overlays.iter().filter(|o| !o.text.is_empty()) {
        let text_style = &overlay.style.text;
        let font_resource =
            ensure_font_resource(doc.inner_mut(), page_id, text_style.standard_font())?;
        let (dx, dy) = overlay.style.offset;
        let (ax, ay) = page_box.page_to_pdf(overlay.bbox.x0 + dx, overlay.bbox.y1 + dy);
        let (tr, tg, tb) = text_style.rgb();
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("rg", vec![real(tr), real(tg), real(tb)]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(font_resource.into_bytes()),
                    real(text_style.font_size),
                ],
            ),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), real(ax), real(ay)],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(
                    encode_win_ansi(&overlay.text),
                    StringFormat::Hexadecimal,
                )],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    let mut bytes = b"\n".to_vec();
    bytes.extend(Content { operations }.encode()?);
    append_content(doc.inner_mut(), page_id, bytes)?;

    for overlay in overlays {
        debug!(
            page = page_index,
            x0 = overlay.bbox.x0,
            y0 = overlay.bbox.y0,
            text = %overlay.text,
            "covered and overlaid"
        );
    }
    Ok(())
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

/// Current `/Contents` of a page as a list of stream references
fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, OverlayError> {
    let page = doc.get_object(page_id)?.as_dict()?;
    let contents = match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    };
    Ok(contents)
}

fn set_page_contents(
    doc: &mut Document,
    page_id: ObjectId,
    contents: Vec<Object>,
) -> Result<(), OverlayError> {
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Wrap the existing page content in `q ... Q`
fn isolate_page_content(doc: &mut Document, page_id: ObjectId) -> Result<(), OverlayError> {
    let existing = page_contents(doc, page_id)?;
    if existing.is_empty() {
        return Ok(());
    }
    let open = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let close = doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open));
    contents.extend(existing);
    contents.push(Object::Reference(close));
    set_page_contents(doc, page_id, contents)
}

fn append_content(doc: &mut Document, page_id: ObjectId, bytes: Vec<u8>) -> Result<(), OverlayError> {
    let mut contents = page_contents(doc, page_id)?;
    let stream_id = doc.add_object(Stream::new(dictionary! {}, bytes));
    contents.push(Object::Reference(stream_id));
    set_page_contents(doc, page_id, contents)
}

/// Register a standard font on the page and return its resource name.
///
/// The page gets its own copy of the (possibly inherited or shared)
/// resource dictionary, so other pages are not affected.
fn ensure_font_resource(
    doc: &mut Document,
    page_id: ObjectId,
    font: StandardFont,
) -> Result<String, OverlayError> {
    let name = font.resource_name();

    let mut resources: Dictionary = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|r| resolve(doc, r).as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut fonts: Dictionary = dict_get(doc, &resources, b"Font")
        .and_then(|f| f.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    if fonts.has(name.as_bytes()) {
        if !page_has_own_resources(doc, page_id) {
            resources.set("Font", Object::Dictionary(fonts));
            doc.get_object_mut(page_id)?
                .as_dict_mut()?
                .set("Resources", Object::Dictionary(resources));
        }
        return Ok(name.to_string());
    }

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_name(),
        "Encoding" => "WinAnsiEncoding",
    });
    fonts.set(name, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(resources));

    Ok(name.to_string())
}

fn page_has_own_resources(doc: &Document, page_id: ObjectId) -> bool {
    doc.get_object(page_id)
        .and_then(|p| p.as_dict())
        .map(|d| matches!(d.get(b"Resources"), Ok(Object::Dictionary(_))))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::locate;
    use crate::testing::{build_pdf, TestText};
    use crate::text_layer::PageText;

    fn number(obj: &Object) -> f64 {
        match obj {
            Object::Integer(i) => *i as f64,
            Object::Real(r) => f64::from(*r),
            _ => f64::NAN,
        }
    }

    fn page_operations(doc: &InvoiceDocument) -> Vec<Operation> {
        let page_id = doc.page_id(0).unwrap();
        let content = doc.inner().get_page_content(page_id).unwrap();
        Content::decode(&content).unwrap().operations
    }

    fn invoice() -> InvoiceDocument {
        let pdf = build_pdf(&[vec![TestText::new(100.0, 700.0, 10.0, "TOTAL: 121,00")]]);
        InvoiceDocument::load(&pdf).unwrap()
    }

    #[test]
    fn test_cover_style_colors() {
        assert_eq!(CoverStyle::OpaqueWhite.fill_rgb(), (1.0, 1.0, 1.0));
        assert_eq!(CoverStyle::HighlightYellow.fill_rgb(), (1.0, 1.0, 0.85));
        assert_eq!(
            CoverStyle::from_request_style(Some("download")),
            CoverStyle::OpaqueWhite
        );
        assert_eq!(
            CoverStyle::from_request_style(Some("preview")),
            CoverStyle::HighlightYellow
        );
        assert_eq!(CoverStyle::from_request_style(None), CoverStyle::HighlightYellow);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), (1.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("00ff00"), (0.0, 1.0, 0.0));
        assert_eq!(parse_hex_color("#fff"), (1.0, 1.0, 1.0));
        assert_eq!(parse_hex_color("not a color"), (0.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("#GG0000"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_cover_rect_has_padding() {
        let mut doc = invoice();
        let bbox = Rect::new(100.0, 80.0, 150.0, 92.0);
        cover_and_overlay(&mut doc, 0, &bbox, "21,00", &OverlayStyle::default()).unwrap();

        let ops = page_operations(&doc);
        let re = ops.iter().find(|op| op.operator == "re").unwrap();
        let values: Vec<f64> = re.operands.iter().map(number).collect();
        // expanded box (98, 78)-(152, 94) flipped against 792
        assert_eq!(values, vec![98.0, 698.0, 54.0, 16.0]);
    }

    #[test]
    fn test_overlay_text_anchor_and_font() {
        let mut doc = invoice();
        let bbox = Rect::new(100.0, 80.0, 150.0, 92.0);
        let style = OverlayStyle {
            offset: (1.0, -2.0),
            ..OverlayStyle::default()
        };
        cover_and_overlay(&mut doc, 0, &bbox, "21,00", &style).unwrap();

        let ops = page_operations(&doc);
        let tm = ops.iter().find(|op| op.operator == "Tm" && number(&op.operands[4]) == 101.0);
        let tm = tm.expect("overlay text matrix");
        assert_eq!(number(&tm.operands[5]), 792.0 - 90.0);

        let tf = ops
            .iter()
            .find(|op| op.operator == "Tf" && op.operands[0].as_name().ok() == Some(b"OvHelv".as_slice()))
            .expect("overlay font");
        assert_eq!(number(&tf.operands[1]), 8.0);
    }

    #[test]
    fn test_original_content_is_isolated() {
        let mut doc = invoice();
        let bbox = Rect::new(100.0, 80.0, 150.0, 92.0);
        cover_and_overlay(&mut doc, 0, &bbox, "x", &OverlayStyle::default()).unwrap();

        let ops = page_operations(&doc);
        assert_eq!(ops.first().map(|o| o.operator.as_str()), Some("q"));
        let depth = ops.iter().fold(0i32, |depth, op| match op.operator.as_str() {
            "q" => depth + 1,
            "Q" => depth - 1,
            _ => depth,
        });
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_font_registered_once() {
        let mut doc = invoice();
        let bbox = Rect::new(100.0, 80.0, 150.0, 92.0);
        let style = OverlayStyle::default();
        cover_and_overlay(&mut doc, 0, &bbox, "21,00", &style).unwrap();
        cover_and_overlay(&mut doc, 0, &bbox, "21,00", &style).unwrap();

        let page_id = doc.page_id(0).unwrap();
        let page = doc.inner().get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(b"OvHelv"));
        assert_eq!(fonts.len(), 2);

        let q_wraps = page_operations(&doc)
            .iter()
            .take_while(|op| op.operator == "q")
            .count();
        assert_eq!(q_wraps, 1);
    }

    #[test]
    fn test_overlay_text_is_extractable_after_save() {
        let mut doc = invoice();
        let m = locate(&doc, 0, "121,00").unwrap().remove(0);
        cover_and_overlay(&mut doc, 0, &m.bbox, "21,00", &OverlayStyle::default()).unwrap();
        let saved = doc.save_to_bytes().unwrap();

        let reloaded = InvoiceDocument::load(&saved).unwrap();
        let page: &PageText = reloaded.page_text(0).unwrap();
        let texts: Vec<&str> = page.lines.iter().map(|l| l.text.as_str()).collect();
        // the covered original is still in the text layer
        assert!(texts.contains(&"TOTAL: 121,00"));
        assert!(texts.contains(&"21,00"));

        let hits = locate(&reloaded, 0, "21,00").unwrap();
        assert!(hits.iter().any(|h| (h.bbox.x0 - m.bbox.x0).abs() < 0.01 && h.bbox.y0 > m.bbox.y0));
    }

    #[test]
    fn test_empty_replacement_only_covers() {
        let mut doc = invoice();
        let bbox = Rect::new(100.0, 80.0, 150.0, 92.0);
        cover_and_overlay(&mut doc, 0, &bbox, "", &OverlayStyle::default()).unwrap();
        let ops = page_operations(&doc);
        assert_eq!(ops.iter().filter(|op| op.operator == "Tj").count(), 1);
        assert_eq!(ops.iter().filter(|op| op.operator == "re").count(), 1);
    }

    #[test]
    fn test_batch_paints_covers_before_text() {
        let mut doc = invoice();
        let style = OverlayStyle::default();
        let overlays = vec![
            PlannedOverlay {
                bbox: Rect::new(100.0, 80.0, 130.0, 90.0),
                text: "21,00".into(),
                style: style.clone(),
            },
            PlannedOverlay {
                bbox: Rect::new(100.0, 92.0, 130.0, 102.0),
                text: String::new(),
                style: style.clone(),
            },
            PlannedOverlay {
                bbox: Rect::new(100.0, 104.0, 130.0, 114.0),
                text: "42,00".into(),
                style,
            },
        ];
        draw_page_overlays(&mut doc, 0, &overlays).unwrap();

        let ops = page_operations(&doc);
        let operators: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        let first_overlay_font = ops
            .iter()
            .position(|op| op.operator == "Tf" && op.operands[0].as_name().ok() == Some(b"OvHelv".as_slice()))
            .unwrap();
        let last_cover = operators.iter().rposition(|op| *op == "re").unwrap();
        assert!(last_cover < first_overlay_font);
        assert_eq!(operators.iter().filter(|op| **op == "re").count(), 3);
        // the original run plus two overlays
        assert_eq!(operators.iter().filter(|op| **op == "Tj").count(), 3);
    }

    #[test]
    fn test_empty_batch_leaves_page_alone() {
        let mut doc = invoice();
        let before = page_operations(&doc);
        draw_page_overlays(&mut doc, 0, &[]).unwrap();
        assert_eq!(page_operations(&doc).len(), before.len());
    }

    #[test]
    fn test_page_out_of_range() {
        let mut doc = invoice();
        let bbox = Rect::new(0.0, 0.0, 1.0, 1.0);
        let err = cover_and_overlay(&mut doc, 5, &bbox, "x", &OverlayStyle::default());
        assert_eq!(
            err,
            Err(OverlayError::PageIndexOutOfRange {
                index: 5,
                page_count: 1
            })
        );
    }
}
