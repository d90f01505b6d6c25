//! In-memory PDF builder for tests
//!
//! Pages are US Letter with a single `/F1` Helvetica font (WinAnsi, no
//! `/Widths`, so the standard metrics apply).

use crate::encoding::encode_win_ansi;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

/// One text run, positioned by its baseline origin in PDF user space
#[derive(Debug, Clone)]
pub struct TestText {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub text: String,
}

impl TestText {
    pub fn new(x: f64, y: f64, size: f64, text: &str) -> Self {
        Self {
            x,
            y,
            size,
            text: text.to_string(),
        }
    }
}

/// Build a PDF with one page per entry
pub fn build_pdf(pages: &[Vec<TestText>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for runs in pages {
        let mut operations = Vec::new();
        for run in runs {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Real(run.size as f32)]),
                Operation::new(
                    "Tm",
                    vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        Object::Real(run.x as f32),
                        Object::Real(run.y as f32),
                    ],
                ),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        encode_win_ansi(&run.text),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap_or_default(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    // writing to a Vec cannot fail
    let _ = doc.save_to(&mut buffer);
    buffer
}

/// A one-page invoice with a 21% VAT line and a 121,00 total
pub fn sample_invoice() -> Vec<u8> {
    build_pdf(&[vec![
        TestText::new(100.0, 740.0, 14.0, "Rechnung 2024-017"),
        TestText::new(100.0, 720.0, 10.0, "VAT 21%"),
        TestText::new(100.0, 700.0, 10.0, "TOTAL: 121,00"),
    ]])
}
