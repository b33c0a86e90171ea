//! DOCX package I/O: the zip container around the WordprocessingML parts.
//!
//! Parts are held in their original archive order and copied byte-for-byte
//! unless explicitly replaced. Keeping `[Content_Types].xml` first and every
//! untouched part identical means the filled letter differs from its
//! template only where fields were substituted.

use crate::pipeline::xml::{XmlDocument, XmlError};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Main document part.
pub const DOCUMENT_PART: &str = "word/document.xml";
/// Relationships of the main document part.
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
/// Package content-type map.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Errors raised while reading or writing a package.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a valid DOCX (zip) container: {0}")]
    Zip(String),

    #[error("package has no '{0}' part")]
    MissingPart(String),

    #[error("part '{part}' is not well-formed XML: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },
}

impl From<zip::result::ZipError> for PackageError {
    fn from(e: zip::result::ZipError) -> Self {
        PackageError::Zip(e.to_string())
    }
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

/// An opened DOCX package.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    parts: Vec<Part>,
}

impl DocxPackage {
    /// Read a package from disk.
    pub fn open(path: &Path) -> Result<Self, PackageError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Read a package from an in-memory archive.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push(Part {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                is_dir: file.is_dir(),
            });
        }

        if !parts.iter().any(|p| p.name == DOCUMENT_PART) {
            return Err(PackageError::MissingPart(DOCUMENT_PART.to_string()));
        }

        debug!("Opened DOCX package with {} parts", parts.len());
        Ok(Self { parts })
    }

    /// Names of all parts, in archive order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Raw bytes of a part.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Replace a part's bytes, or append a new (deflated) part.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|p| p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name: name.to_string(),
                data,
                compression: CompressionMethod::Deflated,
                is_dir: false,
            }),
        }
    }

    /// Parse a part as XML.
    pub fn xml_part(&self, name: &str) -> Result<XmlDocument, PackageError> {
        let data = self
            .part(name)
            .ok_or_else(|| PackageError::MissingPart(name.to_string()))?;
        XmlDocument::parse(data).map_err(|source| PackageError::Xml {
            part: name.to_string(),
            source,
        })
    }

    /// Serialise `doc` into the named part.
    pub fn set_xml_part(&mut self, name: &str, doc: &XmlDocument) -> Result<(), PackageError> {
        let bytes = doc.to_bytes().map_err(|source| PackageError::Xml {
            part: name.to_string(),
            source,
        })?;
        self.set_part(name, bytes);
        Ok(())
    }

    /// Serialise the whole package into a zip archive.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for part in &self.parts {
            // The writer only supports these two; anything exotic is re-deflated.
            let method = match part.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = SimpleFileOptions::default().compression_method(method);

            if part.is_dir {
                zip.add_directory(part.name.as_str(), options)?;
                continue;
            }
            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(&part.data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Write the package to `path`.
    pub fn save(&self, path: &Path) -> Result<(), PackageError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        debug!("Saved DOCX package to {}", path.display());
        Ok(())
    }
}
