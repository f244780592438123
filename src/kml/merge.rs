//! Merging several KML documents into one
//!
//! Features are copied as raw XML events, so styles, extended data and
//! vendor extensions survive the merge untouched.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, info};

use super::source::read_kml;
use crate::{GeoKitError, Result};

/// Default KML 2.2 namespace of the merged document
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// Container metadata that must not be duplicated inside the merged `Document`
const CONTAINER_METADATA: [&str; 6] = [
    "name",
    "open",
    "visibility",
    "description",
    "Snippet",
    "snippet",
];

/// Result of a merge
#[derive(Debug, Clone)]
pub struct MergedDocument {
    pub xml: String,
    /// Number of top-level elements copied into the merged `Document`
    pub elements: usize,
}

/// Merge KML documents, given as `(label, xml)` pairs, in order
pub fn merge_documents(sources: &[(String, String)]) -> Result<MergedDocument> {
    let mut body = Writer::new(Vec::new());
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut elements = 0;

    for (label, xml) in sources {
        let copied = copy_features(xml, &mut body, &mut namespaces).map_err(|e| match e {
            GeoKitError::Xml { position, message } => GeoKitError::Xml {
                position,
                message: format!("{label}: {message}"),
            },
            other => other,
        })?;
        debug!("Copied {} elements from {}", copied, label);
        elements += copied;
    }

    let mut root = BytesStart::new("kml");
    root.push_attribute(("xmlns", KML_NAMESPACE));
    for (key, value) in &namespaces {
        root.push_attribute((key.as_str(), value.as_str()));
    }

    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    writer.write_event(Event::Start(root))?;
    writer.write_event(Event::Start(BytesStart::new("Document")))?;

    let mut xml = writer.into_inner();
    xml.extend_from_slice(&body.into_inner());

    let mut writer = Writer::new(xml);
    writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    writer.write_event(Event::End(BytesEnd::new("Document")))?;
    writer.write_event(Event::End(BytesEnd::new("kml")))?;
    writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;

    let xml = String::from_utf8(writer.into_inner())
        .map_err(|e| GeoKitError::parse(format!("merged document is not UTF-8: {e}")))?;

    Ok(MergedDocument { xml, elements })
}

/// Copy the features of one source into `out`; returns how many were copied
fn copy_features(
    xml: &str,
    out: &mut Writer<Vec<u8>>,
    namespaces: &mut Vec<(String, String)>,
) -> Result<usize> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut in_container = false;
    let mut copy_from: Option<usize> = None;
    let mut copied = 0;

    loop {
        let event = reader.read_event().map_err(|e| GeoKitError::Xml {
            position: reader.error_position(),
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                depth += 1;
                if copy_from.is_some() {
                    out.write_event(Event::Start(e))?;
                    continue;
                }
                if depth == 1 {
                    collect_namespaces(&e, namespaces)?;
                } else if is_feature_level(depth, in_container) {
                    if depth == 2 && is_container(&e) {
                        collect_namespaces(&e, namespaces)?;
                        in_container = true;
                    } else if !is_container_metadata(&e, depth) {
                        out.write_event(Event::Text(BytesText::from_escaped("\n    ")))?;
                        out.write_event(Event::Start(e))?;
                        copy_from = Some(depth);
                        copied += 1;
                    }
                }
            }
            Event::Empty(e) => {
                if copy_from.is_some() {
                    out.write_event(Event::Empty(e))?;
                } else if is_feature_level(depth + 1, in_container)
                    && !is_container(&e)
                    && !is_container_metadata(&e, depth + 1)
                {
                    out.write_event(Event::Text(BytesText::from_escaped("\n    ")))?;
                    out.write_event(Event::Empty(e))?;
                    copied += 1;
                }
            }
            Event::End(e) => {
                if let Some(start) = copy_from {
                    out.write_event(Event::End(e))?;
                    if depth == start {
                        copy_from = None;
                    }
                } else if depth == 2 {
                    in_container = false;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            Event::Decl(_) | Event::DocType(_) => {}
            other => {
                if copy_from.is_some() {
                    out.write_event(other)?;
                }
            }
        }
    }

    Ok(copied)
}

/// Elements at this depth are copied whole: direct children of the `kml`
/// root, or children of a top-level `Document`/`Folder`
fn is_feature_level(depth: usize, in_container: bool) -> bool {
    depth == 2 || (depth == 3 && in_container)
}

fn is_container(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"Document" | b"Folder")
}

fn is_container_metadata(e: &BytesStart<'_>, depth: usize) -> bool {
    depth == 3
        && CONTAINER_METADATA
            .iter()
            .any(|m| m.as_bytes() == e.local_name().as_ref())
}

/// Gather `xmlns:*` declarations of the root or a top-level container
fn collect_namespaces(root: &BytesStart<'_>, namespaces: &mut Vec<(String, String)>) -> Result<()> {
    for attr in root.attributes() {
        let attr = attr.map_err(|e| GeoKitError::parse(format!("invalid attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if !key.starts_with("xmlns:") || namespaces.iter().any(|(k, _)| *k == key) {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        namespaces.push((key, value));
    }
    Ok(())
}

/// Merge KML/KMZ files into a single KML file at `output`
pub fn merge_files<P: AsRef<Path>>(inputs: &[PathBuf], output: P) -> Result<MergedDocument> {
    if inputs.is_empty() {
        return Err(GeoKitError::validation("at least one input file is required"));
    }

    let mut sources = Vec::with_capacity(inputs.len());
    for input in inputs {
        sources.push((input.to_string_lossy().to_string(), read_kml(input)?));
    }

    let merged = merge_documents(&sources)?;

    let output = output.as_ref();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &merged.xml)?;

    info!(
        "Merged {} files ({} elements) into {:?}",
        inputs.len(),
        merged.elements,
        output
    );
    Ok(merged)
}
