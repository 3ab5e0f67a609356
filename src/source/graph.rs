use std::path::Path;

use tracing::debug;

use super::rdf_xml::{Graph, Term};
use super::SourceReader;
use crate::error::{NoticeError, Result};
use crate::license::expression::{normalize_license_value, strip_enclosing_parens};
use crate::models::{
    CreationInfo, DocumentMetadata, ExtractedLicense, RawFile, RawPackage, RawRecordSet,
};

pub const SPDX_NS: &str = "http://spdx.org/rdf/terms#";

const SUBJECT_DOCUMENT: &str = "SpdxDocument";
const SUBJECT_CREATION_INFO: &str = "CreationInfo";
const SUBJECT_PACKAGE: &str = "Package";
const SUBJECT_FILE: &str = "File";
const SUBJECT_EXTRACTED_LICENSE: &str = "ExtractedLicensingInfo";

const PREDICATE_NAME: &str = "name";
const PREDICATE_CREATOR: &str = "creator";
const PREDICATE_VERSION_INFO: &str = "versionInfo";
const PREDICATE_LICENSE_CONCLUDED: &str = "licenseConcluded";
const PREDICATE_LICENSE_DECLARED: &str = "licenseDeclared";
const PREDICATE_COPYRIGHT_TEXT: &str = "copyrightText";
const PREDICATE_DOWNLOAD_LOCATION: &str = "downloadLocation";
const PREDICATE_FILE_NAME: &str = "fileName";
const PREDICATE_LICENSE_INFO_IN_FILE: &str = "licenseInfoInFile";
const PREDICATE_LICENSE_ID: &str = "licenseId";
const PREDICATE_EXTRACTED_TEXT: &str = "extractedText";
const PREDICATE_MEMBER: &str = "member";
const PREDICATE_LICENSE_EXCEPTION: &str = "licenseException";
const PREDICATE_LICENSE_EXCEPTION_ID: &str = "licenseExceptionId";

const REQUIRED_SUBJECTS: [&str; 2] = [SUBJECT_DOCUMENT, SUBJECT_PACKAGE];

const DOCUMENT_PREDICATES: &[&str] = &[PREDICATE_NAME];
const CREATION_INFO_PREDICATES: &[&str] = &[PREDICATE_CREATOR];
const PACKAGE_PREDICATES: &[&str] = &[
    PREDICATE_NAME,
    PREDICATE_VERSION_INFO,
    PREDICATE_LICENSE_CONCLUDED,
    PREDICATE_LICENSE_DECLARED,
    PREDICATE_COPYRIGHT_TEXT,
    PREDICATE_DOWNLOAD_LOCATION,
];
const FILE_PREDICATES: &[&str] = &[
    PREDICATE_FILE_NAME,
    PREDICATE_LICENSE_CONCLUDED,
    PREDICATE_LICENSE_INFO_IN_FILE,
    PREDICATE_COPYRIGHT_TEXT,
];
const EXTRACTED_LICENSE_PREDICATES: &[&str] = &[PREDICATE_LICENSE_ID, PREDICATE_EXTRACTED_TEXT];

/// Nesting limit for composite license nodes; deeper graphs are treated as cyclic.
const MAX_LICENSE_DEPTH: usize = 32;

fn spdx(local: &str) -> String {
    format!("{}{}", SPDX_NS, local)
}

/// Reader for SPDX RDF/XML documents (`.rdf`, `.rdf.xml`).
pub struct GraphReader;

impl GraphReader {
    pub fn new() -> Self {
        Self
    }
}

impl SourceReader for GraphReader {
    fn read(&self, path: &Path) -> Result<RawRecordSet> {
        let content = std::fs::read_to_string(path)?;
        let graph = Graph::parse(&content)?;
        debug!(triples = graph.triples().len(), "parsed RDF graph");
        records_from_graph(&graph)
    }
}

/// Validate required subjects and predicates, then extract every record.
pub fn records_from_graph(graph: &Graph) -> Result<RawRecordSet> {
    validate(graph)?;

    Ok(RawRecordSet {
        metadata: document_info(graph)?,
        packages: package_info(graph)?,
        files: per_file_info(graph)?,
        extracted_licenses: extracted_license_info(graph)?,
    })
}

fn validate(graph: &Graph) -> Result<()> {
    for subject in REQUIRED_SUBJECTS {
        if graph.subjects_of_type(&spdx(subject)).is_empty() {
            return Err(NoticeError::validation(format!(
                "required subject is missing: {}",
                subject
            )));
        }
    }

    let checks: [(&str, &[&str]); 5] = [
        (SUBJECT_DOCUMENT, DOCUMENT_PREDICATES),
        (SUBJECT_CREATION_INFO, CREATION_INFO_PREDICATES),
        (SUBJECT_PACKAGE, PACKAGE_PREDICATES),
        (SUBJECT_FILE, FILE_PREDICATES),
        (SUBJECT_EXTRACTED_LICENSE, EXTRACTED_LICENSE_PREDICATES),
    ];
    for (subject_type, predicates) in checks {
        for subject in graph.subjects_of_type(&spdx(subject_type)) {
            for predicate in predicates {
                if !graph.has_predicate(subject, &spdx(predicate)) {
                    return Err(NoticeError::validation(format!(
                        "required predicate is missing: {}{} (on {} {})",
                        SPDX_NS,
                        predicate,
                        subject_type,
                        describe(subject)
                    )));
                }
            }
        }
    }
    Ok(())
}

fn describe(term: &Term) -> String {
    match term {
        Term::Iri(iri) => iri.clone(),
        Term::Blank(id) => format!("_:{}", id),
        Term::Literal(value) => format!("\"{}\"", value),
    }
}

/// Plain value of a non-license predicate: first object, newlines removed, trimmed.
fn text_value(graph: &Graph, subject: &Term, predicate: &str) -> String {
    match graph.objects(subject, &spdx(predicate)).next() {
        Some(Term::Literal(value)) | Some(Term::Iri(value)) => {
            value.replace('\n', "").trim().to_string()
        }
        Some(Term::Blank(_)) | None => String::new(),
    }
}

/// Multi-line value kept verbatim (license text).
fn raw_value(graph: &Graph, subject: &Term, predicate: &str) -> String {
    match graph.objects(subject, &spdx(predicate)).next() {
        Some(Term::Literal(value)) => value.clone(),
        _ => String::new(),
    }
}

/// License expression of a license-valued predicate.
///
/// Several objects on one predicate (common for `licenseInfoInFile`) are
/// joined with `AND`.
fn license_value(graph: &Graph, subject: &Term, predicate: &str) -> Result<String> {
    let mut parts = Vec::new();
    for object in graph.objects(subject, &spdx(predicate)) {
        let expr = license_expression(graph, object, 0)?;
        if !expr.is_empty() {
            parts.push(expr);
        }
    }
    let joined = if parts.len() > 1 {
        parts
            .iter()
            .map(|p| format!("({})", strip_enclosing_parens(p)))
            .collect::<Vec<_>>()
            .join(" AND ")
    } else {
        parts.pop().unwrap_or_default()
    };
    Ok(normalize_license_value(&joined))
}

/// Flatten a license object into expression syntax, recursing through composite nodes.
fn license_expression(graph: &Graph, object: &Term, depth: usize) -> Result<String> {
    if depth > MAX_LICENSE_DEPTH {
        return Err(NoticeError::validation(format!(
            "license node {} nests too deeply",
            describe(object)
        )));
    }

    match object {
        Term::Literal(value) => Ok(normalize_license_value(value)),
        Term::Iri(iri) => Ok(license_id_from_iri(iri)),
        Term::Blank(_) => {
            let operator = graph.types(object).find_map(|t| {
                match t.strip_prefix(SPDX_NS)? {
                    "DisjunctiveLicenseSet" => Some(" OR "),
                    "ConjunctiveLicenseSet" => Some(" AND "),
                    "WithExceptionOperator" => Some(" WITH "),
                    _ => None,
                }
            });

            let Some(operator) = operator else {
                // an inline license node rather than an operator
                for predicate in [PREDICATE_LICENSE_ID, PREDICATE_LICENSE_EXCEPTION_ID] {
                    let id = text_value(graph, object, predicate);
                    if !id.is_empty() {
                        return Ok(id);
                    }
                }
                return Err(NoticeError::validation(format!(
                    "license node {} is neither a license nor a license set",
                    describe(object)
                )));
            };

            let mut members = Vec::new();
            for member in graph.objects(object, &spdx(PREDICATE_MEMBER)) {
                members.push(license_expression(graph, member, depth + 1)?);
            }
            for exception in graph.objects(object, &spdx(PREDICATE_LICENSE_EXCEPTION)) {
                members.push(license_expression(graph, exception, depth + 1)?);
            }
            members.retain(|m| !m.is_empty());

            let joined = members.join(operator);
            if operator == " WITH " {
                Ok(joined)
            } else {
                Ok(format!("({})", joined))
            }
        }
    }
}

/// `http://spdx.org/licenses/MIT` → `MIT`; `…/doc#LicenseRef-1` → `LicenseRef-1`.
/// The `noassertion` / `none` vocabulary terms carry no license.
fn license_id_from_iri(iri: &str) -> String {
    if iri == spdx("noassertion") || iri == spdx("none") {
        return String::new();
    }
    let basename = iri.rsplit('/').next().unwrap_or(iri);
    let id = match basename.split_once('#') {
        Some((_, fragment)) => fragment,
        None => basename,
    };
    normalize_license_value(id)
}

fn document_info(graph: &Graph) -> Result<DocumentMetadata> {
    let documents = graph.subjects_of_type(&spdx(SUBJECT_DOCUMENT));
    let document = match documents.as_slice() {
        [document] => *document,
        _ => {
            return Err(NoticeError::validation(format!(
                "expected exactly one {}, found {}",
                SUBJECT_DOCUMENT,
                documents.len()
            )))
        }
    };
    let name = text_value(graph, document, PREDICATE_NAME);
    if name.is_empty() {
        return Err(NoticeError::validation("required value is missing: document name"));
    }

    let mut creation_info = None;
    for info in graph.subjects_of_type(&spdx(SUBJECT_CREATION_INFO)) {
        for creator in graph.objects(info, &spdx(PREDICATE_CREATOR)) {
            if let Term::Literal(creator) = creator {
                if let Some(parsed) = CreationInfo::from_creator(creator) {
                    creation_info.get_or_insert(parsed);
                } else {
                    debug!(creator = %creator, "skipping creator without organization and email");
                }
            }
        }
    }
    let creation_info = creation_info.ok_or_else(|| {
        NoticeError::validation("no creator with Organization and email in the creation info")
    })?;

    Ok(DocumentMetadata {
        name,
        creation_info,
    })
}

fn package_info(graph: &Graph) -> Result<Vec<RawPackage>> {
    graph
        .subjects_of_type(&spdx(SUBJECT_PACKAGE))
        .into_iter()
        .map(|subject| -> Result<RawPackage> {
            Ok(RawPackage {
                name: text_value(graph, subject, PREDICATE_NAME),
                version: text_value(graph, subject, PREDICATE_VERSION_INFO),
                license_concluded: license_value(graph, subject, PREDICATE_LICENSE_CONCLUDED)?,
                license_declared: license_value(graph, subject, PREDICATE_LICENSE_DECLARED)?,
                copyright_text: text_value(graph, subject, PREDICATE_COPYRIGHT_TEXT),
                download_location: text_value(graph, subject, PREDICATE_DOWNLOAD_LOCATION),
            })
        })
        .collect()
}

fn per_file_info(graph: &Graph) -> Result<Vec<RawFile>> {
    graph
        .subjects_of_type(&spdx(SUBJECT_FILE))
        .into_iter()
        .map(|subject| -> Result<RawFile> {
            Ok(RawFile {
                file_name: text_value(graph, subject, PREDICATE_FILE_NAME),
                license_concluded: license_value(graph, subject, PREDICATE_LICENSE_CONCLUDED)?,
                license_info_in_file: license_value(graph, subject, PREDICATE_LICENSE_INFO_IN_FILE)?,
                copyright_text: text_value(graph, subject, PREDICATE_COPYRIGHT_TEXT),
                download_location: String::new(),
            })
        })
        .collect()
}

fn extracted_license_info(graph: &Graph) -> Result<Vec<ExtractedLicense>> {
    Ok(graph
        .subjects_of_type(&spdx(SUBJECT_EXTRACTED_LICENSE))
        .into_iter()
        .map(|subject| ExtractedLicense {
            identifier: text_value(graph, subject, PREDICATE_LICENSE_ID),
            name: text_value(graph, subject, PREDICATE_NAME),
            text: raw_value(graph, subject, PREDICATE_EXTRACTED_TEXT),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::rdf_xml::{Triple, RDF_TYPE};
    use std::io::Write;
    use tempfile::Builder;

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:spdx="http://spdx.org/rdf/terms#">
  <spdx:SpdxDocument rdf:about="http://spdx.org/spdxdocs/example#SPDXRef-DOCUMENT">
    <spdx:name>SPDX-Tools-v2.0</spdx:name>
    <spdx:creationInfo>
      <spdx:CreationInfo>
        <spdx:creator>Tool: LicenseFind-1.0</spdx:creator>
        <spdx:creator>Organization: ExampleCodeInspect (contact@example.com)</spdx:creator>
      </spdx:CreationInfo>
    </spdx:creationInfo>
  </spdx:SpdxDocument>
  <spdx:Package rdf:about="http://spdx.org/spdxdocs/example#SPDXRef-Package">
    <spdx:name>glibc</spdx:name>
    <spdx:versionInfo>2.11.1</spdx:versionInfo>
    <spdx:downloadLocation>http://ftp.gnu.org/gnu/glibc/glibc-ports-2.15.tar.gz</spdx:downloadLocation>
    <spdx:copyrightText>Copyright 2008-2010
 John Smith</spdx:copyrightText>
    <spdx:licenseConcluded>
      <spdx:DisjunctiveLicenseSet>
        <spdx:member rdf:resource="http://spdx.org/licenses/LGPL-2.0-only"/>
        <spdx:member>
          <spdx:ExtractedLicensingInfo rdf:about="http://spdx.org/spdxdocs/example#LicenseRef-3">
            <spdx:licenseId>LicenseRef-3</spdx:licenseId>
            <spdx:name>CyberNeko License</spdx:name>
            <spdx:extractedText>The CyberNeko Software License, Version 1.0
...</spdx:extractedText>
          </spdx:ExtractedLicensingInfo>
        </spdx:member>
      </spdx:DisjunctiveLicenseSet>
    </spdx:licenseConcluded>
    <spdx:licenseDeclared>
      <spdx:ConjunctiveLicenseSet>
        <spdx:member rdf:resource="http://spdx.org/licenses/LGPL-2.0-only"/>
        <spdx:member>
          <spdx:WithExceptionOperator>
            <spdx:member rdf:resource="http://spdx.org/licenses/GPL-2.0-only"/>
            <spdx:licenseException>
              <spdx:LicenseException>
                <spdx:licenseExceptionId>Classpath-exception-2.0</spdx:licenseExceptionId>
              </spdx:LicenseException>
            </spdx:licenseException>
          </spdx:WithExceptionOperator>
        </spdx:member>
      </spdx:ConjunctiveLicenseSet>
    </spdx:licenseDeclared>
  </spdx:Package>
  <spdx:Package rdf:about="http://spdx.org/spdxdocs/example#SPDXRef-Saxon">
    <spdx:name>Saxon</spdx:name>
    <spdx:versionInfo>8.8</spdx:versionInfo>
    <spdx:downloadLocation>https://sourceforge.net/projects/saxon/files/Saxon-B/8.8.0.7/saxonb8-8-0-7j.zip/download</spdx:downloadLocation>
    <spdx:copyrightText>Copyright Saxonica Ltd</spdx:copyrightText>
    <spdx:licenseConcluded rdf:resource="http://spdx.org/rdf/terms#noassertion"/>
    <spdx:licenseDeclared rdf:resource="http://spdx.org/licenses/MPL-1.0"/>
  </spdx:Package>
  <spdx:File rdf:about="http://spdx.org/spdxdocs/example#SPDXRef-File">
    <spdx:fileName>./lib-source/commons-lang3-3.1-sources.jar</spdx:fileName>
    <spdx:copyrightText>Copyright 2001-2011 The Apache Software Foundation</spdx:copyrightText>
    <spdx:licenseConcluded rdf:resource="http://spdx.org/licenses/Apache-2.0"/>
    <spdx:licenseInfoInFile rdf:resource="http://spdx.org/licenses/Apache-2.0"/>
    <spdx:licenseInfoInFile>LicenseRef-1</spdx:licenseInfoInFile>
  </spdx:File>
</rdf:RDF>"#;

    fn records(xml: &str) -> Result<RawRecordSet> {
        records_from_graph(&Graph::parse(xml)?)
    }

    #[test]
    fn test_document_and_creator() {
        let records = records(DOC).unwrap();
        assert_eq!(records.metadata.name, "SPDX-Tools-v2.0");
        assert_eq!(records.metadata.creation_info.organization, "ExampleCodeInspect");
        assert_eq!(records.metadata.creation_info.email, "contact@example.com");
    }

    #[test]
    fn test_composite_licenses_are_flattened() {
        let records = records(DOC).unwrap();
        let glibc = &records.packages[0];
        assert_eq!(glibc.name, "glibc");
        assert_eq!(glibc.copyright_text, "Copyright 2008-2010 John Smith");
        assert_eq!(glibc.license_concluded, "LGPL-2.0-only OR LicenseRef-3");
        assert_eq!(
            glibc.license_declared,
            "LGPL-2.0-only AND GPL-2.0-only WITH Classpath-exception-2.0"
        );
    }

    #[test]
    fn test_noassertion_is_empty() {
        let records = records(DOC).unwrap();
        let saxon = &records.packages[1];
        assert_eq!(saxon.license_concluded, "");
        assert_eq!(saxon.license_declared, "MPL-1.0");
    }

    #[test]
    fn test_files_and_extracted_licenses() {
        let records = records(DOC).unwrap();
        assert_eq!(records.files.len(), 1);
        let file = &records.files[0];
        assert_eq!(file.file_name, "./lib-source/commons-lang3-3.1-sources.jar");
        assert_eq!(file.license_concluded, "Apache-2.0");
        assert_eq!(file.license_info_in_file, "(Apache-2.0) AND (LicenseRef-1)");
        assert_eq!(file.download_location, "");

        assert_eq!(records.extracted_licenses.len(), 1);
        let extracted = &records.extracted_licenses[0];
        assert_eq!(extracted.identifier, "LicenseRef-3");
        assert_eq!(extracted.name, "CyberNeko License");
        assert!(extracted.text.contains('\n'));
    }

    #[test]
    fn test_missing_required_subject() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                              xmlns:spdx="http://spdx.org/rdf/terms#">
            <spdx:SpdxDocument rdf:about="urn:doc"><spdx:name>x</spdx:name></spdx:SpdxDocument>
        </rdf:RDF>"#;
        let err = records(xml).unwrap_err();
        assert!(err.to_string().contains("Package"), "{}", err);
    }

    #[test]
    fn test_missing_required_predicate() {
        let xml = DOC.replace("<spdx:versionInfo>8.8</spdx:versionInfo>", "");
        let err = records(&xml).unwrap_err();
        assert!(matches!(err, NoticeError::Validation(_)));
        assert!(err.to_string().contains("versionInfo"), "{}", err);
    }

    #[test]
    fn test_missing_creator_organization() {
        let xml = DOC.replace(
            "<spdx:creator>Organization: ExampleCodeInspect (contact@example.com)</spdx:creator>",
            "",
        );
        let err = records(&xml).unwrap_err();
        assert!(err.to_string().contains("Organization"), "{}", err);
    }

    #[test]
    fn test_cyclic_license_node() {
        let node = Term::Blank("set".to_string());
        let graph = Graph::from_triples(vec![
            Triple {
                subject: node.clone(),
                predicate: RDF_TYPE.to_string(),
                object: Term::Iri(spdx("ConjunctiveLicenseSet")),
            },
            Triple {
                subject: node.clone(),
                predicate: spdx(PREDICATE_MEMBER),
                object: node.clone(),
            },
        ]);
        assert!(matches!(
            license_expression(&graph, &node, 0),
            Err(NoticeError::Validation(_))
        ));
    }

    #[test]
    fn test_license_id_from_iri() {
        assert_eq!(license_id_from_iri("http://spdx.org/licenses/MIT"), "MIT");
        assert_eq!(
            license_id_from_iri("http://spdx.org/spdxdocs/example#LicenseRef-1"),
            "LicenseRef-1"
        );
        assert_eq!(license_id_from_iri("http://spdx.org/rdf/terms#none"), "");
    }

    #[test]
    fn test_reader_reads_file() {
        let mut f = Builder::new().suffix(".rdf.xml").tempfile().unwrap();
        f.write_all(DOC.as_bytes()).unwrap();
        let from_file = GraphReader::new().read(f.path()).unwrap();
        assert_eq!(from_file, records(DOC).unwrap());
    }
}
