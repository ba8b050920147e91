//! Word (`.docx`) packages opened from a template, edited in memory and
//! written back out.
//!
//! Only `word/document.xml`, its relationships and the content types are
//! parsed; every other part is carried through byte for byte.

pub mod media;
pub mod wordml;
pub mod xml;

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{DocumentError, DocumentResult, EmbedError};
use media::{MediaStore, CONTENT_TYPES_PART, RELS_PART};
use wordml::{PARAGRAPH, ROW, TABLE};
use xml::{Element, Node, XmlDocument};

pub const DOCUMENT_PART: &str = "word/document.xml";
const BODY: &str = "w:body";

/// Upper bound on buffer space reserved from a part's declared size.
const MAX_PART_PREALLOC: u64 = 8 << 20;

/// Capacity to reserve for a part; the size comes from the zip header and
/// is not trusted beyond [`MAX_PART_PREALLOC`].
fn part_capacity(declared: u64) -> usize {
    declared.min(MAX_PART_PREALLOC) as usize
}

/// Address of a table cell as node indices: body child, row child, cell child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CellRef {
    pub table: usize,
    pub row: usize,
    pub cell: usize,
}

/// An opened Word document.
#[derive(Debug)]
pub struct Docx {
    parts: Vec<(String, Vec<u8>)>,
    document: XmlDocument,
    media: MediaStore,
}

impl Docx {
    /// Opens the template at `path`.
    ///
    /// Fails with [`DocumentError::TemplateNotFound`] before touching the
    /// file when it does not exist.
    pub fn open(path: &Path) -> DocumentResult<Self> {
        if !path.is_file() {
            tracing::error!(path = %path.display(), "template file not found");
            return Err(DocumentError::TemplateNotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> DocumentResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(part_capacity(file.size()));
            file.read_to_end(&mut data)?;
            parts.push((file.name().to_string(), data));
        }

        let part = |name: &str| {
            parts
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, data)| data.as_slice())
        };

        let mut document = XmlDocument::parse(
            part(DOCUMENT_PART).ok_or(DocumentError::MissingPart(DOCUMENT_PART))?,
        )?;
        let content_types = XmlDocument::parse(
            part(CONTENT_TYPES_PART).ok_or(DocumentError::MissingPart(CONTENT_TYPES_PART))?,
        )?;
        let rels = media::parse_optional(part(RELS_PART))?;

        document
            .root
            .child(BODY)
            .ok_or(DocumentError::MissingPart("w:body"))?;
        let max_shape_id = media::max_shape_id(&document.root);
        media::ensure_drawing_namespaces(&mut document.root);

        let names = parts.iter().map(|(n, _)| n.clone()).collect();
        let media = MediaStore::new(rels, content_types, names, max_shape_id);

        Ok(Self {
            parts,
            document,
            media,
        })
    }

    /// Serializes the package.
    pub fn to_bytes(&self) -> DocumentResult<Vec<u8>> {
        let document = self.document.to_bytes()?;
        let rels = self.media.rels().to_bytes()?;
        let content_types = self.media.content_types().to_bytes()?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut wrote_rels = false;
        for (name, data) in &self.parts {
            let data = match name.as_str() {
                DOCUMENT_PART => &document,
                CONTENT_TYPES_PART => &content_types,
                RELS_PART => {
                    wrote_rels = true;
                    &rels
                }
                _ => data,
            };
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        if !wrote_rels {
            zip.start_file(RELS_PART, options)?;
            zip.write_all(&rels)?;
        }
        for (name, data) in self.media.added_parts() {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Writes the package to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> DocumentResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn document_xml(&self) -> &XmlDocument {
        &self.document
    }

    pub(crate) fn body(&self) -> Option<&Element> {
        self.document.root.child(BODY)
    }

    pub(crate) fn body_mut(&mut self) -> Option<&mut Element> {
        self.document.root.child_mut(BODY)
    }

    /// Node indices of the body-level paragraphs.
    pub(crate) fn paragraph_refs(&self) -> Vec<usize> {
        self.body()
            .map(|body| wordml::child_indices(body, PARAGRAPH))
            .unwrap_or_default()
    }

    /// Node indices of the body-level tables.
    pub(crate) fn table_refs(&self) -> Vec<usize> {
        self.body()
            .map(|body| wordml::child_indices(body, TABLE))
            .unwrap_or_default()
    }

    pub(crate) fn row_refs(&self, table: usize) -> Vec<usize> {
        self.body()
            .and_then(|body| wordml::element_at(body, table))
            .map(|tbl| wordml::child_indices(tbl, ROW))
            .unwrap_or_default()
    }

    /// Cells of a row in grid order.
    pub(crate) fn cell_refs(&self, table: usize, row: usize) -> Vec<CellRef> {
        self.body()
            .and_then(|body| wordml::element_at(body, table))
            .and_then(|tbl| wordml::element_at(tbl, row))
            .map(wordml::row_cell_positions)
            .unwrap_or_default()
            .into_iter()
            .map(|cell| CellRef { table, row, cell })
            .collect()
    }

    pub(crate) fn paragraph(&self, idx: usize) -> Option<&Element> {
        wordml::element_at(self.body()?, idx)
    }

    pub(crate) fn paragraph_mut(&mut self, idx: usize) -> Option<&mut Element> {
        wordml::element_at_mut(self.body_mut()?, idx)
    }

    pub(crate) fn cell(&self, at: CellRef) -> Option<&Element> {
        let tbl = wordml::element_at(self.body()?, at.table)?;
        let tr = wordml::element_at(tbl, at.row)?;
        wordml::element_at(tr, at.cell)
    }

    pub(crate) fn cell_mut(&mut self, at: CellRef) -> Option<&mut Element> {
        let tbl = wordml::element_at_mut(self.body_mut()?, at.table)?;
        let tr = wordml::element_at_mut(tbl, at.row)?;
        wordml::element_at_mut(tr, at.cell)
    }

    pub(crate) fn set_cell_text(&mut self, at: CellRef, text: &str) {
        if let Some(tc) = self.cell_mut(at) {
            wordml::set_cell_text(tc, text);
        }
    }

    /// Builds a run holding the picture at `path`, registering it if needed.
    fn picture_run(&mut self, path: &Path, width_cm: f64) -> Result<Element, EmbedError> {
        let picture = self.media.register(path)?;
        let drawing = self.media.drawing(&picture, width_cm);
        Ok(Element::new(wordml::RUN).with_child(drawing))
    }

    /// Clears the cell's first paragraph and puts the picture in it.
    pub(crate) fn put_picture_in_cell(
        &mut self,
        at: CellRef,
        path: &Path,
        width_cm: f64,
    ) -> Result<(), EmbedError> {
        let run = self.picture_run(path, width_cm)?;
        if let Some(p) = self.cell_mut(at).and_then(wordml::first_paragraph_mut) {
            wordml::clear_paragraph(p);
            p.children.push(Node::Element(run));
        }
        Ok(())
    }

    /// Replaces the paragraph content with the picture.
    pub(crate) fn put_picture_in_paragraph(
        &mut self,
        idx: usize,
        path: &Path,
        width_cm: f64,
    ) -> Result<(), EmbedError> {
        let run = self.picture_run(path, width_cm)?;
        if let Some(p) = self.paragraph_mut(idx) {
            wordml::clear_paragraph(p);
            p.children.push(Node::Element(run));
        }
        Ok(())
    }

    /// Texts of the body-level paragraphs, in order.
    pub fn paragraph_texts(&self) -> Vec<String> {
        self.paragraph_refs()
            .into_iter()
            .filter_map(|idx| self.paragraph(idx))
            .map(wordml::paragraph_text)
            .collect()
    }

    pub fn table_count(&self) -> usize {
        self.table_refs().len()
    }

    /// Text of the cell at grid position (`row`, `col`) of the `table`-th table.
    pub fn cell_text(&self, table: usize, row: usize, col: usize) -> Option<String> {
        self.grid_cell(table, row, col).map(wordml::cell_text)
    }

    /// Whether that cell holds an inline picture.
    pub fn cell_has_picture(&self, table: usize, row: usize, col: usize) -> bool {
        self.grid_cell(table, row, col)
            .map(|tc| {
                let mut found = Vec::new();
                tc.descendants_named("w:drawing", &mut found);
                !found.is_empty()
            })
            .unwrap_or(false)
    }

    /// Number of inline pictures anywhere in the body.
    pub fn picture_count(&self) -> usize {
        let mut found = Vec::new();
        if let Some(body) = self.body() {
            body.descendants_named("w:drawing", &mut found);
        }
        found.len()
    }

    fn grid_cell(&self, table: usize, row: usize, col: usize) -> Option<&Element> {
        let table = *self.table_refs().get(table)?;
        let row = *self.row_refs(table).get(row)?;
        let at = *self.cell_refs(table, row).get(col)?;
        self.cell(at)
    }
}
