//! Positioned text extraction
//!
//! Interprets a page's content streams (and the Form XObjects they paint)
//! far enough to know where every glyph lands: graphics state, text state,
//! text and line matrices, font widths and the code-to-Unicode mapping.
//!
//! Glyphs are gathered into lines in the order they are painted. A glyph
//! continues the current line when it sits on the same baseline and does not
//! jump back to the left, so text painted over existing text (such as a
//! replacement value) forms its own line instead of interleaving with what
//! it covers.

use crate::cmap::ToUnicodeMap;
use crate::document::{dict_get, inherited_attribute, number, resolve};
use crate::encoding::{glyph_name_to_char, win_ansi_to_char};
use crate::fonts::StandardFont;
use crate::geometry::{Matrix, PageBox, Rect};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Nested Form XObjects beyond this depth are not entered
const MAX_FORM_DEPTH: usize = 8;

/// Baseline tolerance for continuing a line, as a fraction of font size
const BASELINE_TOLERANCE: f64 = 0.5;

/// Horizontal gap that reads as a word break, as a fraction of font size
const SPACE_GAP: f64 = 0.25;

/// Leftward overlap still accepted as the same line (kerning)
const BACKTRACK_TOLERANCE: f64 = 0.3;

/// One line of text with a box per character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// Box of each char of `text`, in order
    pub char_boxes: Vec<Rect>,
    pub bbox: Rect,
    /// Baseline y in top-left page space
    pub baseline: f64,
    pub font_size: f64,
}

impl TextLine {
    /// Union of the boxes of chars `start..start + len`
    pub fn span_bbox(&self, start: usize, len: usize) -> Option<Rect> {
        let boxes = self.char_boxes.get(start..start + len)?;
        let (first, rest) = boxes.split_first()?;
        Some(rest.iter().fold(*first, |acc, b| acc.union(b)))
    }
}

/// Text layer of one page, lines ordered top-to-bottom then left-to-right
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_index: usize,
    pub lines: Vec<TextLine>,
}

impl PageText {
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Extract the text layer of a page. Unreadable content yields an empty
/// layer rather than an error.
pub(crate) fn extract_page(
    doc: &Document,
    page_id: ObjectId,
    page_index: usize,
    page_box: PageBox,
) -> PageText {
    let content = match doc.get_page_content(page_id) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(page = page_index, error = %e, "page content unreadable");
            return PageText {
                page_index,
                lines: Vec::new(),
            };
        }
    };
    let operations = match Content::decode(&content) {
        Ok(content) => content.operations,
        Err(e) => {
            warn!(page = page_index, error = %e, "page content stream malformed");
            return PageText {
                page_index,
                lines: Vec::new(),
            };
        }
    };

    let resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|r| resolve(doc, r).as_dict().ok());

    let mut interpreter = Interpreter::new(doc, page_box);
    interpreter.run(&operations, resources, 0);
    let lines = build_lines(&interpreter.glyphs);
    debug!(
        page = page_index,
        glyphs = interpreter.glyphs.len(),
        lines = lines.len(),
        "extracted text layer"
    );

    PageText { page_index, lines }
}

/// A painted glyph in top-left page space
#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    bbox: Rect,
    baseline: f64,
    size: f64,
}

#[derive(Debug, Clone)]
enum FontKind {
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        encoding: Box<[Option<char>; 256]>,
    },
    Composite {
        widths: HashMap<u32, f64>,
        default_width: f64,
        code_length: usize,
    },
}

#[derive(Debug, Clone)]
struct FontInfo {
    kind: FontKind,
    standard: Option<StandardFont>,
    missing_width: f64,
    to_unicode: Option<ToUnicodeMap>,
    ascent: f64,
    descent: f64,
}

impl FontInfo {
    fn load(doc: &Document, font: &Dictionary) -> FontInfo {
        let subtype = dict_get(doc, font, b"Subtype")
            .and_then(|o| o.as_name().ok())
            .unwrap_or(&b"Type1"[..]);
        let base_name = dict_get(doc, font, b"BaseFont")
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_default();
        let standard = StandardFont::from_base_name(&base_name);

        let to_unicode = dict_get(doc, font, b"ToUnicode")
            .and_then(|o| o.as_stream().ok())
            .map(|s| {
                let data = s.decompressed_content().unwrap_or_else(|_| s.content.clone());
                ToUnicodeMap::parse(&data)
            })
            .filter(|m| !m.is_empty());

        let (kind, descriptor) = if subtype == b"Type0" {
            let descendant = dict_get(doc, font, b"DescendantFonts")
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .and_then(|o| resolve(doc, o).as_dict().ok());
            let default_width = descendant
                .and_then(|d| dict_get(doc, d, b"DW"))
                .and_then(number)
                .unwrap_or(1000.0);
            let widths = descendant
                .and_then(|d| dict_get(doc, d, b"W"))
                .and_then(|o| o.as_array().ok())
                .map(|arr| parse_cid_widths(doc, arr))
                .unwrap_or_default();
            let code_length = match to_unicode.as_ref().map(|m| m.code_lengths()) {
                Some([1]) => 1,
                _ => 2,
            };
            let descriptor = descendant
                .and_then(|d| dict_get(doc, d, b"FontDescriptor"))
                .and_then(|o| o.as_dict().ok());
            (
                FontKind::Composite {
                    widths,
                    default_width,
                    code_length,
                },
                descriptor,
            )
        } else {
            let first_char = dict_get(doc, font, b"FirstChar")
                .and_then(number)
                .unwrap_or(0.0) as u32;
            let widths = dict_get(doc, font, b"Widths")
                .and_then(|o| o.as_array().ok())
                .map(|arr| {
                    arr.iter()
                        .map(|w| number(resolve(doc, w)).unwrap_or(0.0))
                        .collect()
                })
                .unwrap_or_default();
            let descriptor = dict_get(doc, font, b"FontDescriptor").and_then(|o| o.as_dict().ok());
            (
                FontKind::Simple {
                    first_char,
                    widths,
                    encoding: simple_encoding(doc, font),
                },
                descriptor,
            )
        };

        let metric = |key: &[u8]| descriptor.and_then(|d| dict_get(doc, d, key)).and_then(number);
        let fallback = standard.unwrap_or(StandardFont::Helvetica);
        let ascent = metric(b"Ascent")
            .filter(|a| *a > 0.0)
            .unwrap_or_else(|| fallback.ascent());
        let descent = metric(b"Descent")
            .filter(|d| *d != 0.0)
            .map(|d| -d.abs())
            .unwrap_or_else(|| fallback.descent());
        let missing_width = metric(b"MissingWidth").unwrap_or(0.0);

        FontInfo {
            kind,
            standard,
            missing_width,
            to_unicode,
            ascent,
            descent,
        }
    }

    fn code_length(&self) -> usize {
        match &self.kind {
            FontKind::Simple { .. } => 1,
            FontKind::Composite { code_length, .. } => *code_length,
        }
    }

    fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.lookup(code)) {
            return text;
        }
        match &self.kind {
            FontKind::Simple { encoding, .. } => encoding
                .get(code as usize)
                .copied()
                .flatten()
                .map(String::from)
                .unwrap_or_default(),
            FontKind::Composite { .. } => char::from_u32(code)
                .filter(|c| !c.is_control())
                .map(String::from)
                .unwrap_or_default(),
        }
    }

    /// Glyph width in thousandths of an em
    fn width(&self, code: u32, decoded: &str) -> f64 {
        match &self.kind {
            FontKind::Simple {
                first_char, widths, ..
            } => {
                if let Some(w) = code
                    .checked_sub(*first_char)
                    .and_then(|i| widths.get(i as usize))
                {
                    return *w;
                }
                if !widths.is_empty() && self.missing_width > 0.0 {
                    return self.missing_width;
                }
                let font = self.standard.unwrap_or(StandardFont::Helvetica);
                decoded
                    .chars()
                    .next()
                    .map(|c| font.glyph_width(c))
                    .unwrap_or(self.missing_width)
            }
            FontKind::Composite {
                widths,
                default_width,
                ..
            } => widths.get(&code).copied().unwrap_or(*default_width),
        }
    }
}

/// Base WinAnsi table overlaid with `/Differences`
fn simple_encoding(doc: &Document, font: &Dictionary) -> Box<[Option<char>; 256]> {
    let mut table = Box::new([None; 256]);
    for (code, slot) in table.iter_mut().enumerate() {
        *slot = win_ansi_to_char(code as u8);
    }

    let differences = dict_get(doc, font, b"Encoding")
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| dict_get(doc, d, b"Differences"))
        .and_then(|o| o.as_array().ok());

    if let Some(differences) = differences {
        let mut code = 0usize;
        for item in differences {
            match resolve(doc, item) {
                Object::Integer(start) => code = (*start).max(0) as usize,
                Object::Name(name) => {
                    if code < 256 {
                        let name = String::from_utf8_lossy(name);
                        table[code] = glyph_name_to_char(&name);
                    }
                    code += 1;
                }
                _ => {}
            }
        }
    }

    table
}

/// `/W` array: `c [w1 w2 ...]` or `c_first c_last w`
fn parse_cid_widths(doc: &Document, arr: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < arr.len() {
        let Some(first) = number(resolve(doc, &arr[i])) else {
            break;
        };
        let first = first as u32;
        match arr.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    let Some(cid) = u32::try_from(offset).ok().and_then(|o| first.checked_add(o)) else {
                        break;
                    };
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(cid, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (
                    number(last),
                    arr.get(i + 2).and_then(|o| number(resolve(doc, o))),
                ) else {
                    break;
                };
                for cid in first..=(last as u32).min(first.saturating_add(0xFFFF)) {
                    widths.insert(cid, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
    font: Option<Rc<FontInfo>>,
    font_size: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: None,
            font_size: 0.0,
        }
    }
}

struct Interpreter<'a> {
    doc: &'a Document,
    page_box: PageBox,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    fonts: HashMap<ObjectId, Rc<FontInfo>>,
    glyphs: Vec<Glyph>,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document, page_box: PageBox) -> Self {
        Self {
            doc,
            page_box,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            fonts: HashMap::new(),
            glyphs: Vec::new(),
        }
    }

    fn run(&mut self, operations: &[Operation], resources: Option<&'a Dictionary>, depth: usize) {
        for op in operations {
            let operands = &op.operands;
            let num = |i: usize| operands.get(i).and_then(number).unwrap_or(0.0);

            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    let m = Matrix::new(num(0), num(1), num(2), num(3), num(4), num(5));
                    self.state.ctm = m.multiply(&self.state.ctm);
                }
                "BT" => {
                    self.text_matrix = Matrix::IDENTITY;
                    self.line_matrix = Matrix::IDENTITY;
                }
                "Tf" => {
                    self.state.font = operands
                        .first()
                        .and_then(|o| o.as_name().ok())
                        .and_then(|name| self.font(resources, name));
                    self.state.font_size = num(1);
                }
                "Tc" => self.state.char_spacing = num(0),
                "Tw" => self.state.word_spacing = num(0),
                "Tz" => self.state.horizontal_scale = num(0) / 100.0,
                "TL" => self.state.leading = num(0),
                "Ts" => self.state.rise = num(0),
                "Td" => self.move_line(num(0), num(1)),
                "TD" => {
                    self.state.leading = -num(1);
                    self.move_line(num(0), num(1));
                }
                "Tm" => {
                    let m = Matrix::new(num(0), num(1), num(2), num(3), num(4), num(5));
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes);
                    }
                }
                "\"" => {
                    self.state.word_spacing = num(0);
                    self.state.char_spacing = num(1);
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show(bytes);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes),
                                other => {
                                    if let Some(adjust) = number(other) {
                                        let tx = -adjust / 1000.0
                                            * self.state.font_size
                                            * self.state.horizontal_scale;
                                        self.text_matrix =
                                            Matrix::translate(tx, 0.0).multiply(&self.text_matrix);
                                    }
                                }
                            }
                        }
                    }
                }
                "Do" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        self.paint_form(resources, name, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.state.leading);
    }

    fn font(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) -> Option<Rc<FontInfo>> {
        let fonts = dict_get(self.doc, resources?, b"Font")?.as_dict().ok()?;
        let entry = fonts.get(name).ok()?;
        let id = entry.as_reference().ok();
        if let Some(cached) = id.and_then(|id| self.fonts.get(&id)) {
            return Some(Rc::clone(cached));
        }
        let dict = resolve(self.doc, entry).as_dict().ok()?;
        let info = Rc::new(FontInfo::load(self.doc, dict));
        if let Some(id) = id {
            self.fonts.insert(id, Rc::clone(&info));
        }
        Some(info)
    }

    fn paint_form(&mut self, resources: Option<&'a Dictionary>, name: &[u8], depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            debug!(depth, "form nesting limit reached");
            return;
        }
        let Some(stream) = resources
            .and_then(|r| dict_get(self.doc, r, b"XObject"))
            .and_then(|o| o.as_dict().ok())
            .and_then(|x| dict_get(self.doc, x, name))
            .and_then(|o| o.as_stream().ok())
        else {
            return;
        };
        let is_form = dict_get(self.doc, &stream.dict, b"Subtype")
            .and_then(|o| o.as_name().ok())
            .is_some_and(|s| s == b"Form");
        if !is_form {
            return;
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let Ok(content) = Content::decode(&data) else {
            warn!("form xobject content malformed");
            return;
        };

        let form_matrix = dict_get(self.doc, &stream.dict, b"Matrix")
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| {
                let v: Vec<f64> = arr.iter().filter_map(number).collect();
                match v.as_slice() {
                    [a, b, c, d, e, f] => Some(Matrix::new(*a, *b, *c, *d, *e, *f)),
                    _ => None,
                }
            })
            .unwrap_or(Matrix::IDENTITY);
        let form_resources = dict_get(self.doc, &stream.dict, b"Resources")
            .and_then(|o| o.as_dict().ok())
            .or(resources);

        self.stack.push(self.state.clone());
        let saved_depth = self.stack.len();
        let (saved_tm, saved_tlm) = (self.text_matrix, self.line_matrix);
        self.state.ctm = form_matrix.multiply(&self.state.ctm);

        self.run(&content.operations, form_resources, depth + 1);

        // unbalanced q inside the form must not leak out
        self.stack.truncate(saved_depth);
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
        self.text_matrix = saved_tm;
        self.line_matrix = saved_tlm;
    }

    fn show(&mut self, bytes: &[u8]) {
        let Some(font) = self.state.font.clone() else {
            return;
        };
        let size = self.state.font_size;
        let th = self.state.horizontal_scale;
        let code_length = font.code_length();

        for chunk in bytes.chunks(code_length) {
            let code = chunk.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
            let text = font.decode(code);
            let w0 = font.width(code, &text) / 1000.0;

            let trm = Matrix::new(size * th, 0.0, 0.0, size, 0.0, self.state.rise)
                .multiply(&self.text_matrix)
                .multiply(&self.state.ctm);

            if !text.is_empty() {
                self.push_glyph(&font, &trm, w0, text);
            }

            let word_spacing = if code_length == 1 && code == 32 {
                self.state.word_spacing
            } else {
                0.0
            };
            let tx = (w0 * size + self.state.char_spacing + word_spacing) * th;
            self.text_matrix = Matrix::translate(tx, 0.0).multiply(&self.text_matrix);
        }
    }

    fn push_glyph(&mut self, font: &FontInfo, trm: &Matrix, w0: f64, text: String) {
        let ascent = font.ascent / 1000.0;
        let descent = font.descent / 1000.0;
        let corners: Vec<(f64, f64)> = [(0.0, descent), (w0, descent), (0.0, ascent), (w0, ascent)]
            .iter()
            .map(|&(x, y)| {
                let (px, py) = trm.transform_point(x, y);
                self.page_box.pdf_to_page(px, py)
            })
            .collect();
        let Some(bbox) = Rect::bounding(&corners) else {
            return;
        };
        let (_, baseline) = {
            let (px, py) = trm.transform_point(0.0, 0.0);
            self.page_box.pdf_to_page(px, py)
        };
        let size = (trm.c * trm.c + trm.d * trm.d).sqrt();

        self.glyphs.push(Glyph {
            text,
            bbox,
            baseline,
            size,
        });
    }
}

/// Group painted glyphs into lines and order them on the page
fn build_lines(glyphs: &[Glyph]) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut current: Option<TextLine> = None;

    for glyph in glyphs {
        let continues = current.as_ref().is_some_and(|line| {
            let tolerance = line.font_size.max(glyph.size);
            let last = line.char_boxes.last().map_or(line.bbox.x1, |b| b.x1);
            (glyph.baseline - line.baseline).abs() <= BASELINE_TOLERANCE * tolerance
                && glyph.bbox.x0 >= last - BACKTRACK_TOLERANCE * tolerance
        });

        if !continues {
            if let Some(done) = current.take() {
                lines.push(done);
            }
            current = Some(TextLine {
                text: String::new(),
                char_boxes: Vec::new(),
                bbox: glyph.bbox,
                baseline: glyph.baseline,
                font_size: glyph.size,
            });
        }

        let Some(line) = current.as_mut() else {
            continue;
        };

        if let Some(prev) = line.char_boxes.last().copied() {
            let gap = glyph.bbox.x0 - prev.x1;
            let has_space = line.text.ends_with(char::is_whitespace)
                || glyph.text.starts_with(char::is_whitespace);
            if gap > SPACE_GAP * line.font_size.max(glyph.size) && !has_space {
                line.text.push(' ');
                line.char_boxes.push(Rect::new(
                    prev.x1,
                    prev.y0.min(glyph.bbox.y0),
                    glyph.bbox.x0,
                    prev.y1.max(glyph.bbox.y1),
                ));
            }
        }

        for ch in glyph.text.chars() {
            line.text.push(ch);
            line.char_boxes.push(glyph.bbox);
        }
        line.bbox = line.bbox.union(&glyph.bbox);
        line.font_size = line.font_size.max(glyph.size);
    }

    if let Some(done) = current {
        lines.push(done);
    }

    lines.retain(|l| !l.text.trim().is_empty());
    lines.sort_by(|a, b| {
        let key_a = (a.bbox.y0 * 2.0).round() as i64;
        let key_b = (b.bbox.y0 * 2.0).round() as i64;
        key_a.cmp(&key_b).then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });
    lines
}
