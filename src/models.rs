use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Serializer};

use crate::license::expression::LicenseExpr;

/// Organization and contact details taken from the document's creator entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationInfo {
    pub organization: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_download_url: Option<String>,
}

impl CreationInfo {
    /// Parse a creator value such as `Organization: ExampleCodeInspect (contact@example.com)`.
    ///
    /// Returns `None` unless the value carries both the `Organization` marker and an `@`.
    pub fn from_creator(creator: &str) -> Option<Self> {
        if !creator.contains("Organization") || !creator.contains('@') {
            return None;
        }
        let body = creator.replace("Organization:", "");
        let (organization, rest) = body.split_once('(')?;
        let email = rest.replace(')', "");
        Some(CreationInfo {
            organization: organization.trim().to_string(),
            email: email.trim().to_string(),
            source_download_url: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub name: String,
    pub creation_info: CreationInfo,
}

/// One package row as read from the source, before deduplication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPackage {
    pub name: String,
    pub version: String,
    pub license_concluded: String,
    pub license_declared: String,
    pub copyright_text: String,
    pub download_location: String,
}

/// One per-file row; folded into the package set as a pseudo-package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFile {
    pub file_name: String,
    pub license_concluded: String,
    pub license_info_in_file: String,
    pub copyright_text: String,
    pub download_location: String,
}

/// Document-local license definition, used when the registry does not know an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedLicense {
    pub identifier: String,
    pub name: String,
    pub text: String,
}

/// The shape both source adapters converge on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecordSet {
    pub metadata: DocumentMetadata,
    pub packages: Vec<RawPackage>,
    pub files: Vec<RawFile>,
    pub extracted_licenses: Vec<ExtractedLicense>,
}

/// Identity of a package: `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PackageKey {
    pub name: String,
    pub version: String,
}

impl PackageKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageKey {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for PackageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.version)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub license_concluded: String,
    pub license_declared: String,
    pub copyright_text: String,
    pub download_location: String,
    /// Operator structure of the effective license expression, if it parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_expression: Option<LicenseExpr>,
}

impl Package {
    pub fn key(&self) -> PackageKey {
        PackageKey::new(self.name.clone(), self.version.clone())
    }

    /// The concluded expression, or the declared one when nothing was concluded.
    pub fn effective_license(&self) -> &str {
        if self.license_concluded.trim().is_empty() {
            &self.license_declared
        } else {
            &self.license_concluded
        }
    }
}

impl From<RawPackage> for Package {
    fn from(raw: RawPackage) -> Self {
        Package {
            name: raw.name,
            version: raw.version,
            license_concluded: raw.license_concluded,
            license_declared: raw.license_declared,
            copyright_text: raw.copyright_text,
            download_location: raw.download_location,
            license_expression: None,
        }
    }
}

/// Where a resolved license text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseSource {
    Registry,
    Extracted,
}

/// A license resolved to its full text, with every package that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLicense {
    pub id: String,
    pub name: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_html: Option<String>,
    pub source: LicenseSource,
    pub packages: BTreeSet<PackageKey>,
}

/// The canonical, fully resolved document handed to generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub name: String,
    pub creation_info: CreationInfo,
    #[serde(serialize_with = "serialize_values")]
    pub packages: BTreeMap<PackageKey, Package>,
    #[serde(serialize_with = "serialize_values")]
    pub licenses: BTreeMap<String, ResolvedLicense>,
    #[serde(serialize_with = "serialize_values")]
    pub extracted_licenses: BTreeMap<String, ExtractedLicense>,
}

impl Document {
    pub fn new(metadata: DocumentMetadata) -> Self {
        Document {
            name: metadata.name,
            creation_info: metadata.creation_info,
            packages: BTreeMap::new(),
            licenses: BTreeMap::new(),
            extracted_licenses: BTreeMap::new(),
        }
    }
}

fn serialize_values<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    V: Serialize,
    S: Serializer,
{
    serializer.collect_seq(map.values())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creator_with_organization_and_email() {
        let info =
            CreationInfo::from_creator("Organization: ExampleCodeInspect (contact@example.com)")
                .unwrap();
        assert_eq!(info.organization, "ExampleCodeInspect");
        assert_eq!(info.email, "contact@example.com");
        assert_eq!(info.source_download_url, None);
    }

    #[test]
    fn test_creator_without_email_is_rejected() {
        assert!(CreationInfo::from_creator("Organization: ExampleCodeInspect ()").is_none());
        assert!(CreationInfo::from_creator("Tool: LicenseFind-1.0").is_none());
        assert!(CreationInfo::from_creator("Person: Jane (jane@example.com)").is_none());
    }

    #[test]
    fn test_effective_license_falls_back_to_declared() {
        let mut pkg = Package::from(RawPackage {
            name: "libfoo".to_string(),
            license_declared: "MIT".to_string(),
            ..Default::default()
        });
        assert_eq!(pkg.effective_license(), "MIT");
        pkg.license_concluded = "Apache-2.0".to_string();
        assert_eq!(pkg.effective_license(), "Apache-2.0");
    }

    #[test]
    fn test_document_serializes_maps_as_lists() {
        let mut doc = Document::new(DocumentMetadata {
            name: "doc".to_string(),
            creation_info: CreationInfo {
                organization: "Org".to_string(),
                email: "a@b.c".to_string(),
                source_download_url: None,
            },
        });
        let pkg = Package::from(RawPackage {
            name: "libfoo".to_string(),
            version: "1.2".to_string(),
            ..Default::default()
        });
        doc.packages.insert(pkg.key(), pkg);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["packages"][0]["name"], "libfoo");
        assert!(json["licenses"].as_array().unwrap().is_empty());
    }
}
