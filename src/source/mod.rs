//! Source adapters: turn an SBOM file into a [`RawRecordSet`].
//!
//! - [`tabular`]: four-sheet SPDX spreadsheet, read through [`workbook`].
//! - [`graph`]: SPDX RDF/XML, read through [`rdf_xml`] into a triple [`rdf_xml::Graph`].
//!
//! [`read_source`] picks the adapter from the file extension.

use std::path::Path;

use tracing::info;

use crate::detector::{detect_encoding, SourceEncoding};
use crate::error::Result;
use crate::models::RawRecordSet;

pub mod graph;
pub mod rdf_xml;
pub mod tabular;
pub mod workbook;

pub trait SourceReader {
    fn read(&self, path: &Path) -> Result<RawRecordSet>;
}

/// Read `path` with the adapter its extension selects.
pub fn read_source(path: &Path) -> Result<RawRecordSet> {
    let encoding = detect_encoding(path)?;
    info!(path = %path.display(), encoding = ?encoding, "reading source");

    let reader: Box<dyn SourceReader> = match encoding {
        SourceEncoding::Tabular => Box::new(tabular::TabularReader::new()),
        SourceEncoding::Graph => Box::new(graph::GraphReader::new()),
    };
    reader.read(path)
}
