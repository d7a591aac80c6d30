//! Document Info dictionary: title, author, subject, keywords, producer.
//!
//! Only the fields that are set are touched; everything else the recognition
//! tool wrote (CreationDate, its own Creator) is kept. Text strings are
//! written as PDFDocEncoding-compatible literals when they are plain ASCII
//! and as UTF-16BE with a byte-order mark otherwise, so umlauts in German
//! titles survive.

use crate::config::DocumentInfo;
use crate::error::Viewer2PdfError;
use lopdf::{Dictionary, Document, Object, StringFormat};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Producer entry stamped on every finished document.
pub const PRODUCER: &str = concat!(
    "viewer2pdf ",
    env!("CARGO_PKG_VERSION"),
    " (chromiumoxide + lopdf + ocrmypdf)"
);

fn metadata_err(path: &Path, detail: impl std::fmt::Display) -> Viewer2PdfError {
    Viewer2PdfError::Metadata {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Encode `s` as a PDF text string.
pub fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8, or Latin-1).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect())
}

/// Merge `info` and the producer into the Info dictionary of the PDF at
/// `path`, rewriting the file in place.
pub fn write_info(path: &Path, info: &DocumentInfo) -> Result<(), Viewer2PdfError> {
    let mut doc = Document::load(path).map_err(|e| metadata_err(path, e))?;

    let info_ref = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|o| o.as_reference().ok());
    let mut dict = match info_ref {
        Some(id) => doc.get_dictionary(id).cloned().unwrap_or_else(|_| Dictionary::new()),
        None => match doc.trailer.get(b"Info") {
            Ok(Object::Dictionary(inline)) => inline.clone(),
            _ => Dictionary::new(),
        },
    };

    if let Some(title) = &info.title {
        dict.set("Title", text_string(title));
    }
    if let Some(author) = &info.author {
        dict.set("Author", text_string(author));
    }
    if let Some(subject) = &info.subject {
        dict.set("Subject", text_string(subject));
    }
    if !info.keywords.is_empty() {
        dict.set("Keywords", text_string(&info.keywords.join(", ")));
    }
    dict.set("Producer", text_string(PRODUCER));

    match info_ref {
        Some(id) => {
            doc.objects.insert(id, Object::Dictionary(dict));
        }
        None => {
            let id = doc.add_object(dict);
            doc.trailer.set("Info", id);
        }
    }

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(|e| metadata_err(path, e))?;
    std::fs::write(path, &buf).map_err(|e| metadata_err(path, e))?;
    debug!("Info dictionary written to {}", path.display());
    Ok(())
}

/// All string entries of the Info dictionary, decoded.
pub fn read_info(path: &Path) -> Result<BTreeMap<String, String>, Viewer2PdfError> {
    let doc = Document::load(path).map_err(|e| metadata_err(path, e))?;

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(inline)) => Some(inline),
        _ => None,
    };
    let Some(info) = info else {
        return Ok(BTreeMap::new());
    };

    Ok(info
        .iter()
        .filter_map(|(key, value)| match value {
            Object::String(bytes, _) => Some((
                String::from_utf8_lossy(key).into_owned(),
                decode_text_string(bytes),
            )),
            _ => None,
        })
        .collect())
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize, Viewer2PdfError> {
    let doc = Document::load(path).map_err(|e| metadata_err(path, e))?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn blank_pdf(path: &Path, with_info: Option<Dictionary>) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(info) = with_info {
            let id = doc.add_object(info);
            doc.trailer.set("Info", id);
        }
        doc.save(path).unwrap();
    }

    #[test]
    fn writes_fields_and_producer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        blank_pdf(&path, None);

        let info = DocumentInfo {
            title: Some("Mathematik 9".into()),
            author: Some("Verlag".into()),
            subject: None,
            keywords: vec!["algebra".into(), "grade 9".into()],
        };
        write_info(&path, &info).unwrap();

        let read = read_info(&path).unwrap();
        assert_eq!(read["Title"], "Mathematik 9");
        assert_eq!(read["Author"], "Verlag");
        assert_eq!(read["Keywords"], "algebra, grade 9");
        assert!(read["Producer"].starts_with("viewer2pdf"));
        assert!(!read.contains_key("Subject"));
        assert_eq!(page_count(&path).unwrap(), 1);
    }

    #[test]
    fn keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        blank_pdf(
            &path,
            Some(dictionary! {
                "Creator" => Object::string_literal("ocrmypdf"),
                "Title" => Object::string_literal("old"),
            }),
        );

        write_info(
            &path,
            &DocumentInfo {
                title: Some("new".into()),
                ..DocumentInfo::default()
            },
        )
        .unwrap();

        let read = read_info(&path).unwrap();
        assert_eq!(read["Title"], "new");
        assert_eq!(read["Creator"], "ocrmypdf");
    }

    #[test]
    fn non_ascii_titles_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        blank_pdf(&path, None);

        write_info(
            &path,
            &DocumentInfo {
                title: Some("Grundlagen der Physik für Schüler".into()),
                ..DocumentInfo::default()
            },
        )
        .unwrap();
        assert_eq!(
            read_info(&path).unwrap()["Title"],
            "Grundlagen der Physik für Schüler"
        );
    }

    #[test]
    fn text_string_encoding() {
        match text_string("abc") {
            Object::String(bytes, StringFormat::Literal) => assert_eq!(bytes, b"abc"),
            other => panic!("unexpected {other:?}"),
        }
        match text_string("ä") {
            Object::String(bytes, _) => assert_eq!(bytes, vec![0xFE, 0xFF, 0x00, 0xE4]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0xE4]), "ä");
        assert_eq!(decode_text_string(&[0x4B, 0xF6]), "Kö");
    }

    #[test]
    fn unreadable_file_is_a_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = write_info(&path, &DocumentInfo::default()).unwrap_err();
        assert!(matches!(err, Viewer2PdfError::Metadata { .. }));
    }
}
