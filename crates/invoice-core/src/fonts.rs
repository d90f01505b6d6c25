//! Standard 14 font selection and metrics
//!
//! Overlay text is always drawn with one of the PDF standard fonts so no font
//! program has to be embedded. The same metrics serve as a fallback when a
//! page font carries no `/Widths` array of its own.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Helvetica,
    Times,
    Courier,
}

impl StandardFont {
    /// The `/BaseFont` name written into the font dictionary
    pub fn base_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    /// Resource name used when the font is registered on a page
    pub fn resource_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "OvHelv",
            StandardFont::HelveticaBold => "OvHeBo",
            StandardFont::HelveticaOblique => "OvHeIt",
            StandardFont::HelveticaBoldOblique => "OvHeBi",
            StandardFont::TimesRoman => "OvTiRo",
            StandardFont::TimesBold => "OvTiBo",
            StandardFont::TimesItalic => "OvTiIt",
            StandardFont::TimesBoldItalic => "OvTiBi",
            StandardFont::Courier => "OvCour",
            StandardFont::CourierBold => "OvCoBo",
            StandardFont::CourierOblique => "OvCoIt",
            StandardFont::CourierBoldOblique => "OvCoBi",
        }
    }

    /// Recognize a `/BaseFont` name, ignoring a subset tag like `ABCDEF+`
    pub fn from_base_name(name: &str) -> Option<StandardFont> {
        let name = match name.split_once('+') {
            Some((tag, rest)) if tag.len() == 6 => rest,
            _ => name,
        };
        let font = match name {
            "Helvetica" | "Arial" | "ArialMT" => StandardFont::Helvetica,
            "Helvetica-Bold" | "Arial-BoldMT" | "Arial,Bold" => StandardFont::HelveticaBold,
            "Helvetica-Oblique" | "Arial-ItalicMT" | "Arial,Italic" => {
                StandardFont::HelveticaOblique
            }
            "Helvetica-BoldOblique" | "Arial-BoldItalicMT" => StandardFont::HelveticaBoldOblique,
            "Times-Roman" | "TimesNewRoman" | "TimesNewRomanPSMT" => StandardFont::TimesRoman,
            "Times-Bold" | "TimesNewRoman,Bold" | "TimesNewRomanPS-BoldMT" => {
                StandardFont::TimesBold
            }
            "Times-Italic" | "TimesNewRoman,Italic" | "TimesNewRomanPS-ItalicMT" => {
                StandardFont::TimesItalic
            }
            "Times-BoldItalic" | "TimesNewRomanPS-BoldItalicMT" => StandardFont::TimesBoldItalic,
            "Courier" | "CourierNew" | "CourierNewPSMT" => StandardFont::Courier,
            "Courier-Bold" | "CourierNew,Bold" => StandardFont::CourierBold,
            "Courier-Oblique" | "CourierNew,Italic" => StandardFont::CourierOblique,
            "Courier-BoldOblique" => StandardFont::CourierBoldOblique,
            _ => return None,
        };
        Some(font)
    }

    /// Map a family name to a standard font.
    ///
    /// Accepts the short names invoice configs use (`helv`, `hebo`, `tiro`,
    /// `cour`, ...), CSS generic families and common font names. Unknown
    /// names fall back to Helvetica.
    pub fn from_family(name: &str) -> StandardFont {
        let lower = name.trim().to_lowercase();

        match lower.as_str() {
            "helv" => return StandardFont::Helvetica,
            "hebo" => return StandardFont::HelveticaBold,
            "heit" => return StandardFont::HelveticaOblique,
            "hebi" => return StandardFont::HelveticaBoldOblique,
            "tiro" => return StandardFont::TimesRoman,
            "tibo" => return StandardFont::TimesBold,
            "tiit" => return StandardFont::TimesItalic,
            "tibi" => return StandardFont::TimesBoldItalic,
            "cour" => return StandardFont::Courier,
            "cobo" => return StandardFont::CourierBold,
            "coit" => return StandardFont::CourierOblique,
            "cobi" => return StandardFont::CourierBoldOblique,
            "serif" => return StandardFont::TimesRoman,
            "sans-serif" | "cursive" | "fantasy" => return StandardFont::Helvetica,
            "monospace" => return StandardFont::Courier,
            _ => {}
        }

        let family = if lower.contains("times")
            || lower.contains("georgia")
            || lower.contains("garamond")
        {
            Family::Times
        } else if lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas")
            || lower.contains("monaco")
        {
            Family::Courier
        } else {
            Family::Helvetica
        };

        let bold = lower.contains("bold");
        let italic = lower.contains("italic") || lower.contains("oblique");
        Self::styled(family, bold, italic)
    }

    fn styled(family: Family, bold: bool, italic: bool) -> StandardFont {
        match (family, bold, italic) {
            (Family::Helvetica, false, false) => StandardFont::Helvetica,
            (Family::Helvetica, true, false) => StandardFont::HelveticaBold,
            (Family::Helvetica, false, true) => StandardFont::HelveticaOblique,
            (Family::Helvetica, true, true) => StandardFont::HelveticaBoldOblique,
            (Family::Times, false, false) => StandardFont::TimesRoman,
            (Family::Times, true, false) => StandardFont::TimesBold,
            (Family::Times, false, true) => StandardFont::TimesItalic,
            (Family::Times, true, true) => StandardFont::TimesBoldItalic,
            (Family::Courier, false, false) => StandardFont::Courier,
            (Family::Courier, true, false) => StandardFont::CourierBold,
            (Family::Courier, false, true) => StandardFont::CourierOblique,
            (Family::Courier, true, true) => StandardFont::CourierBoldOblique,
        }
    }

    fn family(&self) -> Family {
        match self {
            StandardFont::Helvetica
            | StandardFont::HelveticaBold
            | StandardFont::HelveticaOblique
            | StandardFont::HelveticaBoldOblique => Family::Helvetica,
            StandardFont::TimesRoman
            | StandardFont::TimesBold
            | StandardFont::TimesItalic
            | StandardFont::TimesBoldItalic => Family::Times,
            _ => Family::Courier,
        }
    }

    fn is_bold(&self) -> bool {
        matches!(
            self,
            StandardFont::HelveticaBold
                | StandardFont::HelveticaBoldOblique
                | StandardFont::TimesBold
                | StandardFont::TimesBoldItalic
                | StandardFont::CourierBold
                | StandardFont::CourierBoldOblique
        )
    }

    /// Advance width of `ch` in thousandths of an em
    pub fn glyph_width(&self, ch: char) -> f64 {
        let table = match (self.family(), self.is_bold()) {
            (Family::Courier, _) => return 600.0,
            (Family::Helvetica, false) => &HELVETICA_WIDTHS,
            (Family::Helvetica, true) => &HELVETICA_BOLD_WIDTHS,
            // Times bold and italic cuts are measured with the roman widths
            (Family::Times, _) => &TIMES_ROMAN_WIDTHS,
        };
        let code = ch as u32;
        if (32..=126).contains(&code) {
            return f64::from(table[(code - 32) as usize]);
        }
        match self.family() {
            Family::Times => 500.0,
            _ => 556.0,
        }
    }

    /// Width of `text` in points at `size`
    pub fn text_width(&self, text: &str, size: f64) -> f64 {
        text.chars().map(|c| self.glyph_width(c)).sum::<f64>() * size / 1000.0
    }

    /// Ascender in thousandths of an em
    pub fn ascent(&self) -> f64 {
        match self.family() {
            Family::Helvetica => 718.0,
            Family::Times => 683.0,
            Family::Courier => 629.0,
        }
    }

    /// Descender in thousandths of an em (negative)
    pub fn descent(&self) -> f64 {
        match self.family() {
            Family::Helvetica => -207.0,
            Family::Times => -217.0,
            Family::Courier => -157.0,
        }
    }
}

/// Helvetica widths for ASCII 32..=126
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a..m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n..z
    334, 260, 334, 584, // {..~
];

/// Helvetica-Bold widths for ASCII 32..=126
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    333, 333, 584, 584, 584, 611, 975, // :..@
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    333, 278, 333, 584, 556, 333, // [..`
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // a..m
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // n..z
    389, 280, 389, 584, // {..~
];

/// Times-Roman widths for ASCII 32..=126
const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, // ' '../
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, // 0..9
    278, 278, 564, 564, 564, 444, 921, // :..@
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, // A..M
    722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, // N..Z
    333, 278, 333, 469, 500, 333, // [..`
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, // a..m
    500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, // n..z
    480, 200, 480, 541, // {..~
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_short_names() {
        assert_eq!(StandardFont::from_family("helv"), StandardFont::Helvetica);
        assert_eq!(StandardFont::from_family("tiro"), StandardFont::TimesRoman);
        assert_eq!(StandardFont::from_family("cour"), StandardFont::Courier);
        assert_eq!(StandardFont::from_family("hebo"), StandardFont::HelveticaBold);
    }

    #[test]
    fn test_family_css_generic_names() {
        assert_eq!(StandardFont::from_family("serif"), StandardFont::TimesRoman);
        assert_eq!(StandardFont::from_family("sans-serif"), StandardFont::Helvetica);
        assert_eq!(StandardFont::from_family("monospace"), StandardFont::Courier);
        assert_eq!(StandardFont::from_family("cursive"), StandardFont::Helvetica);
    }

    #[test]
    fn test_family_named_variants() {
        assert_eq!(
            StandardFont::from_family("Times-BoldItalic"),
            StandardFont::TimesBoldItalic
        );
        assert_eq!(
            StandardFont::from_family("Arial-BoldMT"),
            StandardFont::HelveticaBold
        );
        assert_eq!(
            StandardFont::from_family("Consolas Oblique"),
            StandardFont::CourierOblique
        );
        assert_eq!(StandardFont::from_family("g_d0_f1"), StandardFont::Helvetica);
        assert_eq!(StandardFont::from_family(""), StandardFont::Helvetica);
    }

    #[test]
    fn test_base_name_strips_subset_tag() {
        assert_eq!(
            StandardFont::from_base_name("BCDEEE+ArialMT"),
            Some(StandardFont::Helvetica)
        );
        assert_eq!(
            StandardFont::from_base_name("Times-Bold"),
            Some(StandardFont::TimesBold)
        );
        assert_eq!(StandardFont::from_base_name("SomeCustomFont"), None);
    }

    #[test]
    fn test_base_name_round_trip() {
        for font in [
            StandardFont::Helvetica,
            StandardFont::TimesItalic,
            StandardFont::CourierBoldOblique,
        ] {
            assert_eq!(StandardFont::from_base_name(font.base_name()), Some(font));
        }
    }

    #[test]
    fn test_glyph_widths() {
        assert_eq!(StandardFont::Helvetica.glyph_width('0'), 556.0);
        assert_eq!(StandardFont::Helvetica.glyph_width(','), 278.0);
        assert_eq!(StandardFont::Helvetica.glyph_width('W'), 944.0);
        assert_eq!(StandardFont::HelveticaBold.glyph_width('b'), 611.0);
        assert_eq!(StandardFont::TimesRoman.glyph_width('a'), 444.0);
        assert_eq!(StandardFont::Courier.glyph_width('i'), 600.0);
        assert_eq!(StandardFont::Helvetica.glyph_width('€'), 556.0);
    }

    #[test]
    fn test_text_width_scales_with_size() {
        // "121,00" = 5 * 556 + 278
        let width = StandardFont::Helvetica.text_width("121,00", 10.0);
        assert!((width - 30.58).abs() < 1e-9);
    }
}
