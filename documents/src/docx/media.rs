//! Inline pictures: media parts, relationships, content types and the
//! `w:drawing` markup referencing them.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, ImageReader};

use super::xml::{Element, XmlDocument};
use crate::error::{DocumentResult, EmbedError};

pub const RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const PICTURE_URI: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

/// Namespaces the drawing markup needs on the document root.
pub const DRAWING_NAMESPACES: &[(&str, &str)] = &[
    (
        "xmlns:wp",
        "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing",
    ),
    ("xmlns:a", "http://schemas.openxmlformats.org/drawingml/2006/main"),
    ("xmlns:pic", PICTURE_URI),
    (
        "xmlns:r",
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
    ),
];

/// English Metric Units per centimetre.
pub const EMU_PER_CM: f64 = 360_000.0;

/// An image registered in the package.
#[derive(Debug, Clone)]
pub struct Picture {
    pub rel_id: String,
    pub file_name: String,
    pub width_px: u32,
    pub height_px: u32,
}

impl Picture {
    /// Extent in EMU for a given display width, keeping the aspect ratio.
    pub fn extent(&self, width_cm: f64) -> (i64, i64) {
        let cx = (width_cm * EMU_PER_CM).round() as i64;
        let cy = if self.width_px == 0 {
            cx
        } else {
            (cx as f64 * self.height_px as f64 / self.width_px as f64).round() as i64
        };
        (cx, cy)
    }
}

#[derive(Debug)]
pub struct MediaStore {
    rels: XmlDocument,
    content_types: XmlDocument,
    added_parts: Vec<(String, Vec<u8>)>,
    registered: HashMap<PathBuf, Picture>,
    taken_names: Vec<String>,
    next_rel: u32,
    next_shape_id: u32,
}

impl MediaStore {
    pub fn new(
        rels: Option<XmlDocument>,
        content_types: XmlDocument,
        part_names: Vec<String>,
        max_shape_id: u32,
    ) -> Self {
        let rels = rels.unwrap_or_else(|| XmlDocument {
            prolog: Vec::new(),
            root: Element::new("Relationships").with_attr("xmlns", RELS_NS),
        });
        let next_rel = rels
            .root
            .elements()
            .filter_map(|rel| rel.attr("Id"))
            .filter_map(|id| id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        Self {
            rels,
            content_types,
            added_parts: Vec::new(),
            registered: HashMap::new(),
            taken_names: part_names,
            next_rel,
            next_shape_id: max_shape_id + 1,
        }
    }

    pub fn rels(&self) -> &XmlDocument {
        &self.rels
    }

    pub fn content_types(&self) -> &XmlDocument {
        &self.content_types
    }

    pub fn added_parts(&self) -> &[(String, Vec<u8>)] {
        &self.added_parts
    }

    /// Adds the image at `path` to the package once and returns its handle.
    pub fn register(&mut self, path: &Path) -> Result<Picture, EmbedError> {
        if let Some(picture) = self.registered.get(path) {
            return Ok(picture.clone());
        }

        let bytes = fs::read(path).map_err(|source| EmbedError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let format_error = |reason: String| EmbedError::Format {
            path: path.to_path_buf(),
            reason,
        };

        let format = image::guess_format(&bytes).map_err(|e| format_error(e.to_string()))?;
        let (extension, mime) = match format {
            ImageFormat::Png => ("png", "image/png"),
            ImageFormat::Jpeg => ("jpeg", "image/jpeg"),
            other => return Err(format_error(format!("{other:?} images are not supported"))),
        };
        let (width_px, height_px) = ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .map_err(|e| format_error(e.to_string()))?;

        let file_name = self.free_media_name(extension);
        let rel_id = format!("rId{}", self.next_rel);
        self.next_rel += 1;

        self.rels.root.children.push(super::xml::Node::Element(
            Element::new("Relationship")
                .with_attr("Id", rel_id.clone())
                .with_attr("Type", IMAGE_REL_TYPE)
                .with_attr("Target", format!("media/{file_name}")),
        ));
        self.ensure_default_content_type(extension, mime);

        let part_name = format!("word/media/{file_name}");
        self.taken_names.push(part_name.clone());
        self.added_parts.push((part_name, bytes));

        let picture = Picture {
            rel_id,
            file_name,
            width_px,
            height_px,
        };
        self.registered.insert(path.to_path_buf(), picture.clone());
        Ok(picture)
    }

    fn free_media_name(&self, extension: &str) -> String {
        (1..)
            .map(|n| format!("signature{n}.{extension}"))
            .find(|name| {
                let part = format!("word/media/{name}");
                !self.taken_names.iter().any(|taken| *taken == part)
            })
            .unwrap_or_else(|| format!("signature.{extension}"))
    }

    fn ensure_default_content_type(&mut self, extension: &str, mime: &str) {
        let present = self.content_types.root.elements().any(|el| {
            el.name == "Default"
                && el
                    .attr("Extension")
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        });
        if !present {
            self.content_types.root.children.insert(
                0,
                super::xml::Node::Element(
                    Element::new("Default")
                        .with_attr("Extension", extension)
                        .with_attr("ContentType", mime),
                ),
            );
        }
    }

    /// Builds the `w:drawing` element showing `picture` at `width_cm`.
    pub fn drawing(&mut self, picture: &Picture, width_cm: f64) -> Element {
        let (cx, cy) = picture.extent(width_cm);
        let id = self.next_shape_id.to_string();
        self.next_shape_id += 1;
        let (cx, cy) = (cx.to_string(), cy.to_string());

        let pic = Element::new("pic:pic")
            .with_child(
                Element::new("pic:nvPicPr")
                    .with_child(
                        Element::new("pic:cNvPr")
                            .with_attr("id", "0")
                            .with_attr("name", picture.file_name.as_str()),
                    )
                    .with_child(Element::new("pic:cNvPicPr")),
            )
            .with_child(
                Element::new("pic:blipFill")
                    .with_child(Element::new("a:blip").with_attr("r:embed", picture.rel_id.as_str()))
                    .with_child(Element::new("a:stretch").with_child(Element::new("a:fillRect"))),
            )
            .with_child(
                Element::new("pic:spPr")
                    .with_child(
                        Element::new("a:xfrm")
                            .with_child(Element::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                            .with_child(
                                Element::new("a:ext")
                                    .with_attr("cx", cx.as_str())
                                    .with_attr("cy", cy.as_str()),
                            ),
                    )
                    .with_child(
                        Element::new("a:prstGeom")
                            .with_attr("prst", "rect")
                            .with_child(Element::new("a:avLst")),
                    ),
            );

        Element::new("w:drawing").with_child(
            Element::new("wp:inline")
                .with_attr("distT", "0")
                .with_attr("distB", "0")
                .with_attr("distL", "0")
                .with_attr("distR", "0")
                .with_child(
                    Element::new("wp:extent")
                        .with_attr("cx", cx.as_str())
                        .with_attr("cy", cy.as_str()),
                )
                .with_child(
                    Element::new("wp:docPr")
                        .with_attr("id", id.as_str())
                        .with_attr("name", format!("Picture {id}")),
                )
                .with_child(
                    Element::new("wp:cNvGraphicFramePr").with_child(
                        Element::new("a:graphicFrameLocks")
                            .with_attr("noChangeAspect", "1"),
                    ),
                )
                .with_child(
                    Element::new("a:graphic").with_child(
                        Element::new("a:graphicData")
                            .with_attr("uri", PICTURE_URI)
                            .with_child(pic),
                    ),
                ),
        )
    }
}

/// Highest `wp:docPr` id in the document, so new drawings get unique ids.
pub fn max_shape_id(root: &Element) -> u32 {
    let mut found = Vec::new();
    root.descendants_named("wp:docPr", &mut found);
    found
        .iter()
        .filter_map(|el| el.attr("id"))
        .filter_map(|id| id.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

/// Adds any missing drawing namespace declaration to the document root.
pub fn ensure_drawing_namespaces(root: &mut Element) {
    for (key, uri) in DRAWING_NAMESPACES {
        if root.attr(key).is_none() {
            root.set_attr(*key, *uri);
        }
    }
}

pub fn parse_optional(bytes: Option<&[u8]>) -> DocumentResult<Option<XmlDocument>> {
    bytes.map(XmlDocument::parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MediaStore {
        let ct = XmlDocument::parse(
            br#"<Types xmlns="urn:ct"><Default Extension="xml" ContentType="application/xml"/></Types>"#,
        )
        .unwrap();
        let rels = XmlDocument::parse(
            br#"<Relationships xmlns="urn:r"><Relationship Id="rId3" Type="t" Target="styles.xml"/></Relationships>"#,
        )
        .unwrap();
        MediaStore::new(Some(rels), ct, vec!["word/media/signature1.png".into()], 4)
    }

    fn write_png(dir: &Path, w: u32, h: u32) -> PathBuf {
        let path = dir.join("sig.png");
        image::RgbaImage::new(w, h).save(&path).unwrap();
        path
    }

    #[test]
    fn register_adds_part_relationship_and_content_type_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_png(tmp.path(), 200, 100);
        let mut media = store();

        let first = media.register(&path).unwrap();
        let second = media.register(&path).unwrap();

        assert_eq!(first.rel_id, "rId4");
        assert_eq!(second.rel_id, "rId4");
        assert_eq!(first.file_name, "signature2.png");
        assert_eq!((first.width_px, first.height_px), (200, 100));
        assert_eq!(media.added_parts().len(), 1);
        assert_eq!(media.rels().root.elements().count(), 2);
        assert!(media
            .content_types()
            .root
            .elements()
            .any(|el| el.attr("Extension") == Some("png")));
    }

    #[test]
    fn drawing_keeps_aspect_ratio_and_unique_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_png(tmp.path(), 200, 100);
        let mut media = store();
        let picture = media.register(&path).unwrap();

        assert_eq!(picture.extent(2.5), (900_000, 450_000));

        let a = media.drawing(&picture, 2.5);
        let b = media.drawing(&picture, 3.5);
        let mut ids = Vec::new();
        for d in [&a, &b] {
            let mut found = Vec::new();
            d.descendants_named("wp:docPr", &mut found);
            ids.push(found[0].attr("id").unwrap().to_string());
        }
        assert_eq!(ids, vec!["5", "6"]);
    }

    #[test]
    fn unsupported_or_missing_files_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let bogus = tmp.path().join("sig.png");
        fs::write(&bogus, b"definitely not an image").unwrap();
        let mut media = store();

        assert!(matches!(media.register(&bogus), Err(EmbedError::Format { .. })));
        assert!(matches!(
            media.register(&tmp.path().join("missing.png")),
            Err(EmbedError::Unreadable { .. })
        ));
        assert!(media.added_parts().is_empty());
    }
}
