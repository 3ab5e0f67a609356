use std::path::Path;

use crate::error::{NoticeError, Result};

/// The two SBOM encodings an adapter exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// SPDX spreadsheet (`.xls`, `.xlsx`).
    Tabular,
    /// SPDX RDF/XML (`.rdf`, `.rdf.xml`).
    Graph,
}

/// Select the encoding of `path` from its file name.
pub fn detect_encoding(path: &Path) -> Result<SourceEncoding> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if file_name.ends_with(".xlsx") || file_name.ends_with(".xls") {
        return Ok(SourceEncoding::Tabular);
    }

    if file_name.ends_with(".rdf") || file_name.ends_with(".rdf.xml") {
        return Ok(SourceEncoding::Graph);
    }

    Err(NoticeError::UnsupportedInput(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spreadsheet_extensions() {
        assert_eq!(
            detect_encoding(Path::new("sbom/SPDXRdfExample.xlsx")).unwrap(),
            SourceEncoding::Tabular
        );
        assert_eq!(
            detect_encoding(Path::new("legacy.XLS")).unwrap(),
            SourceEncoding::Tabular
        );
    }

    #[test]
    fn test_rdf_extensions() {
        assert_eq!(
            detect_encoding(Path::new("example.rdf")).unwrap(),
            SourceEncoding::Graph
        );
        assert_eq!(
            detect_encoding(Path::new("SPDXRdfExample-v2.2.spdx.rdf.xml")).unwrap(),
            SourceEncoding::Graph
        );
    }

    #[test]
    fn test_plain_xml_is_unsupported() {
        assert!(matches!(
            detect_encoding(Path::new("pom.xml")),
            Err(NoticeError::UnsupportedInput(_))
        ));
        assert!(matches!(
            detect_encoding(Path::new("sbom.json")),
            Err(NoticeError::UnsupportedInput(_))
        ));
    }
}
