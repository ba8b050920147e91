//! Builds small `.docx` packages from paragraphs and plain tables.
//!
//! The output is the bare minimum Word accepts: content types, package
//! relationships and a document part. Cell text containing newlines becomes
//! one paragraph per line.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, Event};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::docx::wordml::{text_run, CELL, PARAGRAPH, ROW, TABLE};
use crate::docx::xml::{Element, Node, XmlDocument};
use crate::error::DocumentResult;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

#[derive(Debug, Default, Clone)]
pub struct TemplateBuilder {
    blocks: Vec<Element>,
}

fn paragraph(text: &str) -> Element {
    let mut p = Element::new(PARAGRAPH);
    if !text.is_empty() {
        p.children.push(Node::Element(text_run(None, text)));
    }
    p
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paragraph(mut self, text: &str) -> Self {
        self.blocks.push(paragraph(text));
        self
    }

    pub fn table(mut self, rows: &[&[&str]]) -> Self {
        let mut tbl = Element::new(TABLE);
        for row in rows {
            let mut tr = Element::new(ROW);
            for text in row.iter() {
                let mut tc = Element::new(CELL);
                for line in text.split('\n') {
                    tc.children.push(Node::Element(paragraph(line)));
                }
                tr.children.push(Node::Element(tc));
            }
            tbl.children.push(Node::Element(tr));
        }
        self.blocks.push(tbl);
        self
    }

    pub fn build(&self) -> DocumentResult<Vec<u8>> {
        let mut body = Element::new("w:body");
        body.children
            .extend(self.blocks.iter().cloned().map(Node::Element));
        body.children.push(Node::Element(Element::new("w:sectPr")));

        let document = XmlDocument {
            prolog: vec![Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes")))],
            root: Element::new("w:document")
                .with_attr("xmlns:w", W_NS)
                .with_child(body),
        };

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let parts: [(&str, Vec<u8>); 4] = [
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec()),
            ("_rels/.rels", PACKAGE_RELS.as_bytes().to_vec()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes().to_vec()),
            ("word/document.xml", document.to_bytes()?),
        ];
        for (name, data) in parts {
            zip.start_file(name, options)?;
            zip.write_all(&data)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    pub fn write_to(&self, path: &Path) -> DocumentResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.build()?)?;
        Ok(())
    }
}
