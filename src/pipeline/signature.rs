//! Signature stamp: embed an image and build the inline-drawing run that
//! shows it.
//!
//! Adding a picture to a DOCX touches three parts besides the document
//! body: the image bytes under `word/media/`, a relationship in
//! `word/_rels/document.xml.rels` that the drawing refers to by id, and a
//! `Default` content type for the image extension in `[Content_Types].xml`.

use crate::config::SignatureStamp;
use crate::pipeline::package::{
    DocxPackage, PackageError, CONTENT_TYPES_PART, DOCUMENT_RELS_PART,
};
use crate::pipeline::xml::{Element, Node, XmlDocument};
use image::ImageFormat;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// English Metric Units per millimetre.
const EMU_PER_MM: f64 = 36_000.0;

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const IMAGE_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Errors raised while embedding the stamp image.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("cannot read signature image: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported signature image (PNG or JPEG required): {0}")]
    Image(String),

    #[error(transparent)]
    Package(#[from] PackageError),
}

/// Add `stamp`'s image to `package` and return the `<w:r>` that displays it.
///
/// `document` is the current `word/document.xml` root; it is only read, to
/// pick a drawing id not already in use.
pub fn prepare_stamp(
    package: &mut DocxPackage,
    document: &Element,
    stamp: &SignatureStamp,
) -> Result<Element, SignatureError> {
    let bytes = std::fs::read(&stamp.image)?;
    let format = image::guess_format(&bytes).map_err(|e| SignatureError::Image(e.to_string()))?;
    let (extension, content_type) = match format {
        ImageFormat::Png => ("png", "image/png"),
        ImageFormat::Jpeg => ("jpeg", "image/jpeg"),
        other => return Err(SignatureError::Image(format!("{other:?}"))),
    };
    let (width_px, height_px) = image::image_dimensions(&stamp.image)
        .map_err(|e| SignatureError::Image(e.to_string()))?;
    if width_px == 0 || height_px == 0 {
        return Err(SignatureError::Image("image has zero size".into()));
    }

    let file_name = format!("signature-{}.{extension}", Uuid::new_v4().simple());
    package.set_part(&format!("word/media/{file_name}"), bytes);

    let rel_id = add_image_relationship(package, &file_name)?;
    ensure_default_content_type(package, extension, content_type)?;

    let cx = (f64::from(stamp.width_mm.max(1.0)) * EMU_PER_MM).round() as u64;
    let cy = (cx as f64 * f64::from(height_px) / f64::from(width_px)).round() as u64;
    let doc_pr_id = max_doc_pr_id(document) + 1;

    debug!(
        "Embedded signature {} ({}x{} px) as {} → {}x{} EMU",
        file_name, width_px, height_px, rel_id, cx, cy
    );
    Ok(drawing_run(&rel_id, &file_name, doc_pr_id, cx, cy))
}

/// Append an image relationship and return its new `rId`.
fn add_image_relationship(
    package: &mut DocxPackage,
    file_name: &str,
) -> Result<String, PackageError> {
    let mut rels = match package.part(DOCUMENT_RELS_PART) {
        Some(_) => package.xml_part(DOCUMENT_RELS_PART)?,
        None => XmlDocument {
            decl: None,
            prolog: Vec::new(),
            root: Element::new("Relationships").with_attr("xmlns", RELS_NS),
        },
    };

    let next = rels
        .root
        .elements()
        .filter_map(|r| r.attr("Id"))
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let id = format!("rId{next}");

    rels.root.children.push(Node::Element(
        Element::new("Relationship")
            .with_attr("Id", id.as_str())
            .with_attr("Type", IMAGE_REL)
            .with_attr("Target", format!("media/{file_name}")),
    ));
    package.set_xml_part(DOCUMENT_RELS_PART, &rels)?;
    Ok(id)
}

/// Make sure `[Content_Types].xml` declares the image extension.
fn ensure_default_content_type(
    package: &mut DocxPackage,
    extension: &str,
    content_type: &str,
) -> Result<(), PackageError> {
    let mut types = package.xml_part(CONTENT_TYPES_PART)?;
    let declared = types.root.elements().any(|e| {
        e.is("Default")
            && e.attr("Extension")
                .is_some_and(|x| x.eq_ignore_ascii_case(extension))
    });
    if declared {
        return Ok(());
    }
    // Defaults precede Overrides by convention.
    let at = types
        .root
        .children
        .iter()
        .position(|n| matches!(n, Node::Element(e) if e.is("Override")))
        .unwrap_or(types.root.children.len());
    types.root.children.insert(
        at,
        Node::Element(
            Element::new("Default")
                .with_attr("Extension", extension)
                .with_attr("ContentType", content_type),
        ),
    );
    package.set_xml_part(CONTENT_TYPES_PART, &types)
}

fn max_doc_pr_id(e: &Element) -> u32 {
    let own = if e.is("wp:docPr") {
        e.attr("id").and_then(|v| v.parse().ok()).unwrap_or(0)
    } else {
        0
    };
    e.elements().map(max_doc_pr_id).fold(own, u32::max)
}

/// `<w:r><w:drawing><wp:inline>…</wp:inline></w:drawing></w:r>`, with the
/// drawing namespaces declared locally so the run is valid in any document.
fn drawing_run(rel_id: &str, file_name: &str, doc_pr_id: u32, cx: u64, cy: u64) -> Element {
    let (cx, cy) = (cx.to_string(), cy.to_string());

    let pic = Element::new("pic:pic")
        .with_attr("xmlns:pic", PIC_NS)
        .with_child(
            Element::new("pic:nvPicPr")
                .with_child(
                    Element::new("pic:cNvPr")
                        .with_attr("id", "0")
                        .with_attr("name", file_name),
                )
                .with_child(Element::new("pic:cNvPicPr")),
        )
        .with_child(
            Element::new("pic:blipFill")
                .with_child(
                    Element::new("a:blip")
                        .with_attr("xmlns:r", R_NS)
                        .with_attr("r:embed", rel_id),
                )
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

    let inline = Element::new("wp:inline")
        .with_attr("xmlns:wp", WP_NS)
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
                .with_attr("id", doc_pr_id.to_string())
                .with_attr("name", "Signature"),
        )
        .with_child(
            Element::new("a:graphic").with_attr("xmlns:a", A_NS).with_child(
                Element::new("a:graphicData")
                    .with_attr("uri", PIC_NS)
                    .with_child(pic),
            ),
        );

    Element::new("w:r").with_child(Element::new("w:drawing").with_child(inline))
}
