//! Raw document assembly: one page per preprocessed JPEG, in order.
//!
//! The JPEG bytes are embedded as-is (`DCTDecode`), so assembly never
//! re-encodes and the result has exactly one page per input image.
//!
//! Page size in points is `pixels * 72 / dpi`. Without a DPI override every
//! image pixel becomes one point.

use crate::error::Viewer2PdfError;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolution assumed when no DPI override is given.
pub const DEFAULT_DPI: u32 = 72;

/// A preprocessed page image ready to be embedded.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Baseline RGB JPEG on disk.
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Page box in PDF points for an image of `px` pixels at `dpi`.
pub fn points(px: u32, dpi: Option<u32>) -> f32 {
    let dpi = dpi.unwrap_or(DEFAULT_DPI).max(1);
    px as f32 * 72.0 / dpi as f32
}

/// Pack `pages` into a PDF at `out`. Returns the size of the written file.
pub fn assemble_pdf(
    pages: &[PageImage],
    dpi: Option<u32>,
    out: &Path,
) -> Result<u64, Viewer2PdfError> {
    if pages.is_empty() {
        return Err(Viewer2PdfError::Assembly("no pages to assemble".into()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let page_id = add_page(&mut doc, pages_id, page, dpi)?;
        kids.push(page_id.into());
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

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| Viewer2PdfError::Assembly(format!("serialising PDF: {e}")))?;
    std::fs::write(out, &buf)
        .map_err(|e| Viewer2PdfError::Assembly(format!("writing {}: {e}", out.display())))?;

    debug!("Assembled {} pages into {} ({} bytes)", count, out.display(), buf.len());
    Ok(buf.len() as u64)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    page: &PageImage,
    dpi: Option<u32>,
) -> Result<ObjectId, Viewer2PdfError> {
    let jpeg = std::fs::read(&page.path).map_err(|e| {
        Viewer2PdfError::Assembly(format!("reading {}: {e}", page.path.display()))
    })?;

    let mut image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => page.width as i64,
            "Height" => page.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    );
    image.allows_compression = false;
    let image_id = doc.add_object(image);

    let (w, h) = (points(page.width, dpi), points(page.height, dpi));
    let content = format!("q {w:.4} 0 0 {h:.4} 0 0 cm /Im0 Do Q");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(w), Object::Real(h)],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}
