//! Positioned page text
//!
//! Walks a page's content stream, and the Form XObjects it paints, and
//! records a box for every shown character so a literal search over the
//! page text can be mapped back to rectangles on the page. Strings are
//! decoded through the page fonts and advanced by their widths; glyph
//! boxes span the font's ascent and descent.

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use crate::error::LocateError;
use crate::font::{load_fonts, PdfFont};
use crate::geometry::{Matrix, Rect};
use crate::object::{inherited, number, resolve, resolve_array, resolve_dict, stream_content};

/// Form XObjects nested deeper than this are not entered
const MAX_FORM_DEPTH: usize = 8;

/// Gap (in font sizes) between two glyphs on one baseline that reads as a space
const SPACE_GAP: f64 = 0.15;
/// Baseline shift (in font sizes) that starts a new line
const LINE_SHIFT: f64 = 0.5;

/// One literal occurrence on a page, in PDF user space
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub bounds: Rect,
    /// One rectangle per visual line covered by the occurrence
    pub quads: Vec<Rect>,
}

/// The text of one page with a box for each shown character
#[derive(Debug, Clone, Default)]
pub struct PageText {
    text: Vec<char>,
    boxes: Vec<Option<Rect>>,
    last: Option<GlyphAnchor>,
}

#[derive(Debug, Clone, Copy)]
struct GlyphAnchor {
    baseline: f64,
    end_x: f64,
    size: f64,
}

impl PageText {
    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    pub fn is_blank(&self) -> bool {
        self.text.iter().all(|c| c.is_whitespace())
    }

    fn push_separator(&mut self, c: char) {
        if self.text.last().is_some_and(|last| last.is_whitespace()) {
            return;
        }
        self.text.push(c);
        self.boxes.push(None);
    }

    fn push_glyph(&mut self, c: char, bbox: Rect, baseline: f64, end_x: f64, size: f64) {
        if let Some(last) = self.last {
            let unit = last.size.max(size).max(f64::EPSILON);
            if (baseline - last.baseline).abs() > unit * LINE_SHIFT {
                self.push_separator('\n');
            } else if bbox.x0 - last.end_x > unit * SPACE_GAP {
                self.push_separator(' ');
            }
        }
        self.text.push(c);
        self.boxes.push(Some(bbox));
        self.last = Some(GlyphAnchor {
            baseline,
            end_x,
            size,
        });
    }

    /// Case-insensitive literal search. Any run of whitespace in either the
    /// page or the needle matches any other run of whitespace.
    pub fn search(&self, needle: &str) -> Vec<TextMatch> {
        let (haystack, origin) = normalize(self.text.iter().copied());
        let (needle, _) = normalize(needle.trim().chars());
        if needle.is_empty() || needle.len() > haystack.len() {
            return Vec::new();
        }

        let mut matches = Vec::new();
        let mut start = 0;
        while start + needle.len() <= haystack.len() {
            if haystack[start..start + needle.len()] == needle[..] {
                let first = origin[start];
                let last = origin[start + needle.len() - 1];
                if let Some(found) = self.match_for(first, last) {
                    matches.push(found);
                }
                start += needle.len();
            } else {
                start += 1;
            }
        }
        matches
    }

    fn match_for(&self, first: usize, last: usize) -> Option<TextMatch> {
        let mut quads: Vec<Rect> = Vec::new();
        let mut line: Option<Rect> = None;

        for bbox in self.boxes[first..=last].iter().flatten() {
            line = match line {
                Some(current) if same_line(&current, bbox) => Some(current.union(bbox)),
                Some(current) => {
                    quads.push(current);
                    Some(*bbox)
                }
                None => Some(*bbox),
            };
        }
        quads.extend(line);

        let bounds = Rect::bounding(&quads)?;
        Some(TextMatch { bounds, quads })
    }
}

fn same_line(a: &Rect, b: &Rect) -> bool {
    let overlap = a.y1.min(b.y1) - a.y0.max(b.y0);
    overlap > 0.5 * a.height().min(b.height())
}

/// Lowercase, collapse whitespace runs to one space, and remember where
/// each kept character came from.
fn normalize(chars: impl Iterator<Item = char>) -> (Vec<char>, Vec<usize>) {
    let mut out = Vec::new();
    let mut origin = Vec::new();
    for (idx, c) in chars.enumerate() {
        if c.is_whitespace() {
            if out.last() != Some(&' ') {
                out.push(' ');
                origin.push(idx);
            }
            continue;
        }
        out.push(c.to_lowercase().next().unwrap_or(c));
        origin.push(idx);
    }
    (out, origin)
}

#[derive(Debug, Clone)]
struct TextState {
    font: Rc<PdfFont>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: Rc::new(PdfFont::default()),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// The part of the graphics state that `q`/`Q` save and restore
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

/// Fonts and XObjects reachable from one content stream
struct Resources<'a> {
    fonts: HashMap<Vec<u8>, Rc<PdfFont>>,
    xobjects: Option<&'a Dictionary>,
}

impl<'a> Resources<'a> {
    fn load(doc: &'a Document, dict: Option<&'a Dictionary>) -> Self {
        Self {
            fonts: load_fonts(doc, dict)
                .into_iter()
                .map(|(name, font)| (name, Rc::new(font)))
                .collect(),
            xobjects: dict
                .and_then(|d| d.get(b"XObject").ok())
                .and_then(|obj| resolve_dict(doc, obj)),
        }
    }
}

struct Walker<'a> {
    doc: &'a Document,
    page: PageText,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
}

impl<'a> Walker<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            page: PageText::default(),
            gs: GraphicsState {
                ctm: Matrix::IDENTITY,
                text: TextState::default(),
            },
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
        }
    }

    fn run(&mut self, data: &[u8], resources: &Resources<'a>, depth: usize) -> Result<(), LocateError> {
        let content = Content::decode(data).map_err(|e| LocateError::Content(e.to_string()))?;
        for op in &content.operations {
            match op.operator.as_str() {
                "Tf" => self.set_font(&op.operands, resources),
                "Do" => self.draw_form(&op.operands, resources, depth),
                other => self.apply(other, &op.operands),
            }
        }
        Ok(())
    }

    fn set_font(&mut self, operands: &[Object], resources: &Resources<'a>) {
        let name = operands.first().and_then(|obj| obj.as_name().ok());
        self.gs.text.font = match name.and_then(|n| resources.fonts.get(n)) {
            Some(font) => Rc::clone(font),
            None => {
                debug!(
                    font = %name.map(String::from_utf8_lossy).unwrap_or_default(),
                    "font not in resources"
                );
                Rc::new(PdfFont::default())
            }
        };
        if let Some(size) = operands.get(1).and_then(number) {
            self.gs.text.font_size = size;
        }
    }

    /// Walk a Form XObject in place, with its matrix applied and its own
    /// resources when it has them.
    fn draw_form(&mut self, operands: &[Object], resources: &Resources<'a>, depth: usize) {
        let doc = self.doc;
        let Some(stream) = operands
            .first()
            .and_then(|obj| obj.as_name().ok())
            .and_then(|name| resources.xobjects?.get(name).ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_stream().ok())
        else {
            return;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Form")
            .unwrap_or(false);
        if !is_form {
            return;
        }
        if depth >= MAX_FORM_DEPTH {
            debug!(depth, "form nesting too deep, skipping");
            return;
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| resolve_array(doc, obj))
            .and_then(matrix_from)
            .unwrap_or(Matrix::IDENTITY);
        let own = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
            .map(|dict| Resources::load(doc, Some(dict)));

        let saved = self.gs.clone();
        let saved_depth = self.stack.len();
        let (saved_tm, saved_tlm) = (self.tm, self.tlm);
        self.gs.ctm = matrix.multiply(&self.gs.ctm);

        let data = stream_content(stream);
        if let Err(e) = self.run(&data, own.as_ref().unwrap_or(resources), depth + 1) {
            debug!(error = %e, "unreadable form content");
        }

        self.stack.truncate(saved_depth);
        self.gs = saved;
        self.tm = saved_tm;
        self.tlm = saved_tlm;
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translate(tx, ty).multiply(&self.tlm);
        self.tm = self.tlm;
    }

    fn advance(&mut self, tx: f64) {
        self.tm = Matrix::translate(tx, 0.0).multiply(&self.tm);
    }

    fn show(&mut self, bytes: &[u8]) {
        let s = self.gs.text.clone();
        for glyph in s.font.decode(bytes) {
            let render = Matrix::new(
                s.font_size * s.horizontal_scale,
                0.0,
                0.0,
                s.font_size,
                0.0,
                s.rise,
            )
            .multiply(&self.tm)
            .multiply(&self.gs.ctm);
            let (_, baseline) = render.apply(0.0, 0.0);

            // Ligatures split their advance evenly between their characters.
            let chars: Vec<char> = glyph.text.chars().filter(|c| !c.is_control()).collect();
            let share = glyph.width / chars.len().max(1) as f64;
            for (k, c) in chars.into_iter().enumerate() {
                let x0 = share * k as f64;
                let x1 = x0 + share;
                let corners = [
                    render.apply(x0, s.font.descent),
                    render.apply(x1, s.font.descent),
                    render.apply(x0, s.font.ascent),
                    render.apply(x1, s.font.ascent),
                ];
                let bbox = corners.iter().fold(
                    Rect::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
                    |r, &(x, y)| Rect::new(r.x0.min(x), r.y0.min(y), r.x1.max(x), r.y1.max(y)),
                );
                let (end_x, _) = render.apply(x1, 0.0);
                self.page
                    .push_glyph(c, bbox, baseline, end_x, render.y_scale());
            }

            let mut tx = glyph.width * s.font_size + s.char_spacing;
            if glyph.is_space {
                tx += s.word_spacing;
            }
            self.advance(tx * s.horizontal_scale);
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        let num = |i: usize| operands.get(i).and_then(number);

        match operator {
            "q" => self.stack.push(self.gs.clone()),
            "Q" => {
                if let Some(gs) = self.stack.pop() {
                    self.gs = gs;
                }
            }
            "cm" => {
                if let Some(m) = matrix_from(operands) {
                    self.gs.ctm = m.multiply(&self.gs.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tc" => self.gs.text.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.gs.text.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.gs.text.horizontal_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => self.gs.text.leading = num(0).unwrap_or(0.0),
            "Ts" => self.gs.text.rise = num(0).unwrap_or(0.0),
            "Td" => self.next_line(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
            "TD" => {
                let ty = num(1).unwrap_or(0.0);
                self.gs.text.leading = -ty;
                self.next_line(num(0).unwrap_or(0.0), ty);
            }
            "Tm" => {
                if let Some(m) = matrix_from(operands) {
                    self.tlm = m;
                    self.tm = m;
                }
            }
            "T*" => self.next_line(0.0, -self.gs.text.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line(0.0, -self.gs.text.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.gs.text.word_spacing = num(0).unwrap_or(0.0);
                self.gs.text.char_spacing = num(1).unwrap_or(0.0);
                self.next_line(0.0, -self.gs.text.leading);
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
                                        * self.gs.text.font_size
                                        * self.gs.text.horizontal_scale;
                                    self.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let v: Vec<f64> = operands[..6].iter().map(number).collect::<Option<_>>()?;
    Some(Matrix::new(v[0], v[1], v[2], v[3], v[4], v[5]))
}

/// Extract the positioned text of one page, including text drawn by the
/// Form XObjects it paints.
pub fn extract_page_text(doc: &Document, page_id: ObjectId) -> Result<PageText, LocateError> {
    let data = doc
        .get_page_content(page_id)
        .map_err(|e| LocateError::Content(e.to_string()))?;
    let page_resources = inherited(doc, page_id, b"Resources").and_then(|obj| obj.as_dict().ok());
    let resources = Resources::load(doc, page_resources);

    let mut walker = Walker::new(doc);
    walker.run(&data, &resources, 0)?;
    trace!(chars = walker.page.text.len(), "extracted page text");
    Ok(walker.page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cid_glyph_width, pdf_with_cid_font, pdf_with_pages};
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};
    use pretty_assertions::assert_eq;

    fn first_page(pdf: &[u8]) -> PageText {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        extract_page_text(&doc, page_id).unwrap()
    }

    #[test]
    fn test_lines_are_separated_by_newlines() {
        let page = first_page(&pdf_with_pages(&[&["Rent is due", "on the first day"]]));
        assert_eq!(page.text(), "Rent is due\non the first day");
    }

    #[test]
    fn test_glyph_positions_follow_text_matrix() {
        let page = first_page(&pdf_with_pages(&[&["Hello"]]));
        let hits = page.search("hello");
        assert_eq!(hits.len(), 1);
        let bounds = hits[0].bounds;
        assert!((bounds.x0 - 72.0).abs() < 1e-6);
        assert!((bounds.x1 - (72.0 + 5.0 * 6.0)).abs() < 1e-6);
        assert!(bounds.y0 < 720.0 && bounds.y1 > 720.0);
    }

    #[test]
    fn test_search_across_line_break_yields_one_match_two_quads() {
        let page = first_page(&pdf_with_pages(&[&["Rent is due", "on the first day"]]));
        let hits = page.search("due on   the");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].quads.len(), 2);
        assert!(hits[0].quads[0].y0 > hits[0].quads[1].y0);
    }

    #[test]
    fn test_search_counts_every_occurrence() {
        let page = first_page(&pdf_with_pages(&[&["late fee", "no LATE FEE applies"]]));
        assert_eq!(page.search("late fee").len(), 2);
        assert!(page.search("early fee").is_empty());
        assert!(page.search("   ").is_empty());
    }

    #[test]
    fn test_tj_kerning_gap_reads_as_space() {
        let mut page = PageText::default();
        page.push_glyph('a', Rect::new(0.0, 0.0, 6.0, 12.0), 2.0, 6.0, 12.0);
        page.push_glyph('b', Rect::new(9.0, 0.0, 15.0, 12.0), 2.0, 15.0, 12.0);
        page.push_glyph('c', Rect::new(15.0, 0.0, 21.0, 12.0), 2.0, 21.0, 12.0);
        assert_eq!(page.text(), "a bc");
    }

    #[test]
    fn test_identity_h_font_decodes_through_to_unicode() {
        let line = "The security deposit is returned";
        let page = first_page(&pdf_with_cid_font(&[line, "within fifteen days."]));
        assert_eq!(page.text(), format!("{line}\nwithin fifteen days."));

        let hits = page.search("security deposit");
        assert_eq!(hits.len(), 1);
        let advance = |s: &str| s.chars().map(cid_glyph_width).sum::<i64>() as f64 * 12.0 / 1000.0;
        let bounds = hits[0].bounds;
        assert!((bounds.x0 - (72.0 + advance("The "))).abs() < 1e-6);
        assert!((bounds.x1 - (72.0 + advance("The security deposit"))).abs() < 1e-6);
        // Ascent 750 and descent -250 from the font descriptor
        assert!((bounds.y1 - 729.0).abs() < 1e-6);
        assert!((bounds.y0 - 717.0).abs() < 1e-6);
    }

    #[test]
    fn test_text_inside_form_xobject_is_extracted() {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let form_content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F2".into(), 10.into()]),
                Operation::new("Td", vec![0.into(), 0.into()]),
                Operation::new("Tj", vec![Object::string_literal("Inside")]),
                Operation::new("ET", vec![]),
            ],
        };
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 200.into(), 50.into()],
                "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 10.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F2" => font_id } },
            },
            form_content.encode().unwrap(),
        ));
        let page_content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 50.into()],
                ),
                Operation::new("Do", vec!["Fm1".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, page_content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => dictionary! { "Fm1" => form_id } },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });

        let page = extract_page_text(&doc, page_id).unwrap();
        assert_eq!(page.text(), "Inside");
        let bounds = page.search("inside")[0].bounds;
        assert!((bounds.x0 - 100.0).abs() < 1e-6);
        assert!((bounds.x1 - 130.0).abs() < 1e-6);
        assert!((bounds.y0 - 58.0).abs() < 1e-6);
        assert!((bounds.y1 - 68.0).abs() < 1e-6);
    }

    #[test]
    fn test_restore_brings_back_the_matrix() {
        let mut doc = Document::with_version("1.5");
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 300.into()],
                ),
                Operation::new("Q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new("Td", vec![10.into(), 20.into()]),
                Operation::new("Tj", vec![Object::string_literal("ab")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => content_id,
        });

        let page = extract_page_text(&doc, page_id).unwrap();
        let bounds = page.search("ab")[0].bounds;
        assert!((bounds.x0 - 10.0).abs() < 1e-6);
        assert!(bounds.y0 < 20.0 && bounds.y1 > 20.0);
    }

    #[test]
    fn test_blank_page() {
        let page = first_page(&pdf_with_pages(&[&[]]));
        assert!(page.is_blank());
        assert!(page.search("anything").is_empty());
    }
}
