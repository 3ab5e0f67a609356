use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use super::{notice_file_stem, NoticeGenerator};
use crate::models::Document;

pub struct JsonGenerator {
    output_dir: PathBuf,
}

impl JsonGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        JsonGenerator {
            output_dir: output_dir.into(),
        }
    }
}

impl NoticeGenerator for JsonGenerator {
    fn generate(&self, document: &Document) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("creating output directory {}", self.output_dir.display())
        })?;

        let path = self
            .output_dir
            .join(format!("{}.json", notice_file_stem(document)));
        let body = serde_json::to_string_pretty(document)?;
        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;

        info!(path = %path.display(), "wrote JSON notice");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreationInfo, DocumentMetadata, LicenseSource, Package, PackageKey, RawPackage,
        ResolvedLicense,
    };
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn document() -> Document {
        let mut doc = Document::new(DocumentMetadata {
            name: "My Product 1.0".to_string(),
            creation_info: CreationInfo {
                organization: "Acme".to_string(),
                email: "oss@acme.test".to_string(),
                source_download_url: Some("https://acme.test/src".to_string()),
            },
        });
        let package = Package::from(RawPackage {
            name: "libfoo".to_string(),
            version: "1.2".to_string(),
            license_concluded: "MIT".to_string(),
            ..Default::default()
        });
        doc.packages.insert(package.key(), package);
        doc.licenses.insert(
            "MIT".to_string(),
            ResolvedLicense {
                id: "MIT".to_string(),
                name: "MIT License".to_string(),
                text: "Permission is hereby granted".to_string(),
                text_html: None,
                source: LicenseSource::Registry,
                packages: BTreeSet::from([PackageKey::new("libfoo", "1.2")]),
            },
        );
        doc
    }

    #[test]
    fn test_writes_named_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested");
        let path = JsonGenerator::new(&out).generate(&document()).unwrap();

        assert_eq!(path, out.join("OSS_Notice_My_Product_1.0.json"));
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["name"], "My Product 1.0");
        assert_eq!(value["creation_info"]["source_download_url"], "https://acme.test/src");
        assert_eq!(value["packages"][0]["name"], "libfoo");
        assert_eq!(value["licenses"][0]["id"], "MIT");
        assert_eq!(value["licenses"][0]["source"], "registry");
        assert_eq!(value["licenses"][0]["packages"][0]["version"], "1.2");
    }
}
