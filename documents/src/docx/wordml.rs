//! WordprocessingML helpers over the raw element tree.
//!
//! Names are matched with the conventional `w:` prefix that every Word
//! producer emits for the main namespace.

use super::xml::{Element, Node};

pub const PARAGRAPH: &str = "w:p";
pub const PARAGRAPH_PROPS: &str = "w:pPr";
pub const RUN: &str = "w:r";
pub const RUN_PROPS: &str = "w:rPr";
pub const TEXT: &str = "w:t";
pub const TABLE: &str = "w:tbl";
pub const ROW: &str = "w:tr";
pub const CELL: &str = "w:tc";
pub const CELL_PROPS: &str = "w:tcPr";

/// Elements whose text never belongs to the surrounding paragraph.
const OPAQUE: &[&str] = &[
    "w:drawing",
    "w:pict",
    "w:object",
    "mc:AlternateContent",
    "w:pPr",
    "w:rPr",
    "w:instrText",
    "w:delText",
];

/// Children of `w:rPr` that must come after `w:sz`/`w:szCs`.
const AFTER_SIZE: &[&str] = &[
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
];

/// Node indices of the direct children named `name`.
pub fn child_indices(parent: &Element, name: &str) -> Vec<usize> {
    parent
        .children
        .iter()
        .enumerate()
        .filter_map(|(idx, node)| match node {
            Node::Element(el) if el.name == name => Some(idx),
            _ => None,
        })
        .collect()
}

pub fn element_at(parent: &Element, idx: usize) -> Option<&Element> {
    match parent.children.get(idx)? {
        Node::Element(el) => Some(el),
        _ => None,
    }
}

pub fn element_at_mut(parent: &mut Element, idx: usize) -> Option<&mut Element> {
    match parent.children.get_mut(idx)? {
        Node::Element(el) => Some(el),
        _ => None,
    }
}

/// Visible text of a paragraph: run text with tabs and breaks.
pub fn paragraph_text(p: &Element) -> String {
    let mut out = String::new();
    push_run_text(p, &mut out);
    out
}

fn push_run_text(el: &Element, out: &mut String) {
    for child in el.elements() {
        match child.name.as_str() {
            TEXT => out.push_str(&child.text_content()),
            "w:tab" => out.push('\t'),
            "w:br" | "w:cr" => out.push('\n'),
            name if OPAQUE.contains(&name) => {}
            _ => push_run_text(child, out),
        }
    }
}

/// Paragraph texts of a table cell.
pub fn cell_paragraph_texts(tc: &Element) -> Vec<String> {
    tc.children_named(PARAGRAPH).map(paragraph_text).collect()
}

/// Cell text with paragraphs joined by newlines.
pub fn cell_text(tc: &Element) -> String {
    cell_paragraph_texts(tc).join("\n")
}

/// Node indices of a row's cells, one entry per grid column.
///
/// A cell spanning several grid columns is repeated, so positions line up
/// with the table grid.
pub fn row_cell_positions(tr: &Element) -> Vec<usize> {
    let mut positions = Vec::new();
    for idx in child_indices(tr, CELL) {
        let span = element_at(tr, idx).map(grid_span).unwrap_or(1);
        positions.extend(std::iter::repeat(idx).take(span));
    }
    positions
}

fn grid_span(tc: &Element) -> usize {
    tc.child(CELL_PROPS)
        .and_then(|props| props.child("w:gridSpan"))
        .and_then(|span| span.attr("w:val"))
        .and_then(|val| val.parse().ok())
        .filter(|span: &usize| *span > 0)
        .unwrap_or(1)
}

fn first_run_props(p: &Element) -> Option<Element> {
    let mut runs = Vec::new();
    p.descendants_named(RUN, &mut runs);
    runs.first()
        .and_then(|run| run.child(RUN_PROPS))
        .cloned()
}

/// Builds a run holding `text`; newlines become breaks and tabs become tab stops.
pub fn text_run(props: Option<Element>, text: &str) -> Element {
    let mut run = Element::new(RUN);
    if let Some(props) = props {
        run.children.push(Node::Element(props));
    }
    for (line_no, line) in text.split('\n').enumerate() {
        if line_no > 0 {
            run.children.push(Node::Element(Element::new("w:br")));
        }
        for (seg_no, segment) in line.split('\t').enumerate() {
            if seg_no > 0 {
                run.children.push(Node::Element(Element::new("w:tab")));
            }
            if !segment.is_empty() {
                run.children.push(Node::Element(
                    Element::new(TEXT)
                        .with_attr("xml:space", "preserve")
                        .with_text(segment),
                ));
            }
        }
    }
    run
}

/// Removes all content but the paragraph properties.
///
/// Returns the formatting of the first run so callers can reuse it.
pub fn clear_paragraph(p: &mut Element) -> Option<Element> {
    let props = first_run_props(p);
    p.children
        .retain(|node| matches!(node, Node::Element(el) if el.name == PARAGRAPH_PROPS));
    props
}

/// Replaces the paragraph text, keeping paragraph and first-run formatting.
pub fn set_paragraph_text(p: &mut Element, text: &str) {
    let props = clear_paragraph(p);
    p.children.push(Node::Element(text_run(props, text)));
}

/// Replaces all cell content with a single paragraph holding `text`.
pub fn set_cell_text(tc: &mut Element, text: &str) {
    let first_p = tc.child(PARAGRAPH).cloned();
    let run_props = first_p.as_ref().and_then(first_run_props);
    let para_props = first_p.and_then(|p| p.child(PARAGRAPH_PROPS).cloned());

    tc.children
        .retain(|node| matches!(node, Node::Element(el) if el.name == CELL_PROPS));

    let mut p = Element::new(PARAGRAPH);
    if let Some(props) = para_props {
        p.children.push(Node::Element(props));
    }
    if !text.is_empty() {
        p.children.push(Node::Element(text_run(run_props, text)));
    }
    tc.children.push(Node::Element(p));
}

/// First paragraph of a cell, created when the cell has none.
pub fn first_paragraph_mut(tc: &mut Element) -> Option<&mut Element> {
    if tc.child(PARAGRAPH).is_none() {
        tc.children.push(Node::Element(Element::new(PARAGRAPH)));
    }
    tc.child_mut(PARAGRAPH)
}

/// Sets the font size of every run in the paragraph, in half-points.
pub fn set_font_size(p: &mut Element, half_points: u32) {
    let mut stack: Vec<&mut Element> = vec![p];
    while let Some(el) = stack.pop() {
        if el.name == RUN {
            set_run_size(el, half_points);
            continue;
        }
        for child in el.elements_mut() {
            if !OPAQUE.contains(&child.name.as_str()) {
                stack.push(child);
            }
        }
    }
}

fn set_run_size(run: &mut Element, half_points: u32) {
    if run.child(RUN_PROPS).is_none() {
        run.children.insert(0, Node::Element(Element::new(RUN_PROPS)));
    }
    let Some(props) = run.child_mut(RUN_PROPS) else {
        return;
    };
    props
        .children
        .retain(|node| !matches!(node, Node::Element(el) if el.name == "w:sz" || el.name == "w:szCs"));

    let insert_at = props
        .children
        .iter()
        .position(|node| matches!(node, Node::Element(el) if AFTER_SIZE.contains(&el.name.as_str())))
        .unwrap_or(props.children.len());

    let value = half_points.to_string();
    props.children.insert(
        insert_at,
        Node::Element(Element::new("w:szCs").with_attr("w:val", value.clone())),
    );
    props.children.insert(
        insert_at,
        Node::Element(Element::new("w:sz").with_attr("w:val", value)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::XmlDocument;

    fn parse(xml: &str) -> Element {
        XmlDocument::parse(xml.as_bytes()).unwrap().root
    }

    #[test]
    fn paragraph_text_joins_runs_and_skips_drawings() {
        let p = parse(
            r#"<w:p><w:pPr><w:rPr><w:t>x</w:t></w:rPr></w:pPr><w:r><w:t>Data </w:t></w:r><w:hyperlink><w:r><w:t>zajęć</w:t><w:tab/><w:t>1</w:t></w:r></w:hyperlink><w:r><w:drawing><w:t>no</w:t></w:drawing></w:r></w:p>"#,
        );
        assert_eq!(paragraph_text(&p), "Data zajęć\t1");
    }

    #[test]
    fn grid_span_repeats_cell_positions() {
        let tr = parse(
            r#"<w:tr><w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr><w:p/></w:tc><w:tc><w:p/></w:tc></w:tr>"#,
        );
        assert_eq!(row_cell_positions(&tr), vec![0, 0, 1]);
    }

    #[test]
    fn set_cell_text_keeps_formatting_and_drops_content() {
        let mut tc = parse(
            r#"<w:tc><w:tcPr><w:tcW w:w="100"/></w:tcPr><w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>old</w:t></w:r></w:p><w:p><w:r><w:t>more</w:t></w:r></w:p></w:tc>"#,
        );
        set_cell_text(&mut tc, "2,5h");

        assert_eq!(cell_text(&tc), "2,5h");
        assert!(tc.child(CELL_PROPS).is_some());
        let p = tc.child(PARAGRAPH).unwrap();
        assert!(p.child(PARAGRAPH_PROPS).is_some());
        assert!(p.child(RUN).unwrap().child(RUN_PROPS).unwrap().child("w:b").is_some());
        assert_eq!(tc.children_named(PARAGRAPH).count(), 1);
    }

    #[test]
    fn empty_text_leaves_an_empty_paragraph() {
        let mut tc = parse(r#"<w:tc><w:p><w:r><w:t>Jan</w:t></w:r></w:p></w:tc>"#);
        set_cell_text(&mut tc, "");
        assert_eq!(cell_text(&tc), "");
        assert_eq!(tc.children_named(PARAGRAPH).count(), 1);
    }

    #[test]
    fn font_size_goes_before_later_run_properties() {
        let mut p = parse(
            r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="30"/><w:lang w:val="pl-PL"/></w:rPr><w:t>a</w:t></w:r><w:r><w:t>b</w:t></w:r></w:p>"#,
        );
        set_font_size(&mut p, 20);

        for run in p.children_named(RUN) {
            let props = run.child(RUN_PROPS).unwrap();
            assert_eq!(props.child("w:sz").unwrap().attr("w:val"), Some("20"));
            assert_eq!(props.child("w:szCs").unwrap().attr("w:val"), Some("20"));
        }
        let names: Vec<_> = p
            .child(RUN)
            .unwrap()
            .child(RUN_PROPS)
            .unwrap()
            .elements()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["w:b", "w:sz", "w:szCs", "w:lang"]);
    }

    #[test]
    fn text_run_encodes_breaks_and_tabs() {
        let run = text_run(None, "a\tb\nc");
        let names: Vec<_> = run.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["w:t", "w:tab", "w:t", "w:br", "w:t"]);
    }
}
