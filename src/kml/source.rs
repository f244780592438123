//! Loading KML text from `.kml` files and `.kmz` archives

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use tracing::{debug, info};
use zip::ZipArchive;

use crate::{GeoKitError, Result};

/// Input container kind, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Kml,
    Kmz,
}

impl SourceKind {
    /// Detect the kind from a file name (case-insensitive)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("kml") => Ok(SourceKind::Kml),
            Some("kmz") => Ok(SourceKind::Kmz),
            _ => Err(GeoKitError::UnsupportedFormat(
                path.to_string_lossy().to_string(),
            )),
        }
    }
}

/// Read the KML document of a `.kml` or `.kmz` file
pub fn read_kml<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let kind = SourceKind::from_path(path)?;

    if !path.exists() {
        return Err(GeoKitError::FileNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    info!("Reading {:?} as {:?}", path, kind);
    let bytes = fs::read(path)?;
    read_kml_bytes(kind, bytes)
}

/// Same as [`read_kml`] for data already in memory
pub fn read_kml_bytes(kind: SourceKind, bytes: Vec<u8>) -> Result<String> {
    match kind {
        SourceKind::Kml => Ok(decode_text(bytes)),
        SourceKind::Kmz => extract_kml_from_kmz(&bytes),
    }
}

fn extract_kml_from_kmz(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut candidates = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_file() && entry.name().to_ascii_lowercase().ends_with(".kml") {
            candidates.push((i, entry.name().to_string()));
        }
    }
    debug!("KMZ archive holds {} KML entries", candidates.len());

    // doc.kml is the root document by convention; otherwise take the first one
    let chosen = candidates
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case("doc.kml"))
        .or_else(|| candidates.first())
        .ok_or_else(|| GeoKitError::parse("no KML document found in KMZ archive"))?;

    let mut entry = archive.by_index(chosen.0)?;
    let mut content = Vec::new();
    entry.read_to_end(&mut content)?;
    debug!("Extracted {} ({} bytes)", chosen.1, content.len());

    Ok(decode_text(content))
}

/// Decode as UTF-8, falling back to Latin-1 for legacy exports
pub(crate) fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text),
        Err(err) => {
            debug!("Input is not valid UTF-8, decoding as Latin-1");
            err.into_bytes().iter().map(|&b| char::from(b)).collect()
        }
    }
}
