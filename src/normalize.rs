//! Fold raw records into the canonical [`Document`].
//!
//! Packages are accepted in input order, first `(name, version)` wins, with
//! per-file rows converted to pseudo-packages and appended after the package
//! rows. Each accepted package's effective license expression is flattened to
//! atomic identifiers, and every identifier is resolved exactly once per run:
//! already resolved, then the registry, then the document's extracted licenses.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{NoticeError, Result};
use crate::license::expression::{tokenize, LicenseExpr};
use crate::models::{
    Document, ExtractedLicense, LicenseSource, Package, PackageKey, RawFile, RawPackage,
    RawRecordSet, ResolvedLicense,
};
use crate::registry::LicenseRegistry;

/// Build-qualifier suffixes that are not part of an artifact's name or version.
const FILE_NAME_NOISE: [&str; 3] = ["-sources", "-RELEASE", "-SNAPSHOT"];

/// Normalize a record set, resolving license texts through `registry`.
///
/// Fails on the first identifier that neither the registry nor the extracted
/// license table knows; no partial document is returned.
pub fn normalize<R>(records: RawRecordSet, registry: &mut R) -> Result<Document>
where
    R: LicenseRegistry + ?Sized,
{
    let RawRecordSet {
        metadata,
        packages,
        files,
        extracted_licenses,
    } = records;

    let mut document = Document::new(metadata);

    for extracted in extracted_licenses {
        if document.extracted_licenses.contains_key(&extracted.identifier) {
            debug!(id = %extracted.identifier, "skipping duplicate extracted license");
            continue;
        }
        document
            .extracted_licenses
            .insert(extracted.identifier.clone(), extracted);
    }

    let mut candidates = packages;
    for file in files {
        candidates.push(pseudo_package(file)?);
    }

    // accepted keys in input order; the BTreeMap alone would lose it
    let mut accepted = Vec::new();
    for raw in candidates {
        let mut package = Package::from(raw);
        let key = package.key();
        if document.packages.contains_key(&key) {
            debug!(package = %key, "skipping duplicate package");
            continue;
        }
        package.license_expression = LicenseExpr::parse(package.effective_license());
        document.packages.insert(key.clone(), package);
        accepted.push(key);
    }

    for key in &accepted {
        let expression = match document.packages.get(key) {
            Some(package) => package.effective_license().to_string(),
            None => continue,
        };
        for id in tokenize(&expression) {
            attach_license(&mut document, registry, &id, key)?;
        }
    }

    info!(
        packages = document.packages.len(),
        licenses = document.licenses.len(),
        "normalized document"
    );
    Ok(document)
}

fn attach_license<R>(
    document: &mut Document,
    registry: &mut R,
    id: &str,
    package: &PackageKey,
) -> Result<()>
where
    R: LicenseRegistry + ?Sized,
{
    if let Some(license) = document.licenses.get_mut(id) {
        license.packages.insert(package.clone());
        return Ok(());
    }

    let resolved = match registry.resolve(id)? {
        Some(details) => {
            debug!(id, "resolved from registry");
            ResolvedLicense {
                id: details.id,
                name: details.name,
                text: details.text,
                text_html: details.text_html,
                source: LicenseSource::Registry,
                packages: BTreeSet::new(),
            }
        }
        None => match document.extracted_licenses.get(id) {
            Some(extracted) => {
                debug!(id, "resolved from extracted licenses");
                from_extracted(extracted)
            }
            None => {
                return Err(NoticeError::UnresolvedLicense {
                    license: id.to_string(),
                    package: package.name.clone(),
                    version: package.version.clone(),
                })
            }
        },
    };

    // keyed by the token so later references hit the cache even if the
    // registry reports a differently cased id
    let entry = document
        .licenses
        .entry(id.to_string())
        .or_insert(resolved);
    entry.packages.insert(package.clone());
    Ok(())
}

fn from_extracted(extracted: &ExtractedLicense) -> ResolvedLicense {
    ResolvedLicense {
        id: extracted.identifier.clone(),
        name: extracted.name.clone(),
        text: extracted.text.clone(),
        text_html: None,
        source: LicenseSource::Extracted,
        packages: BTreeSet::new(),
    }
}

fn pseudo_package(file: RawFile) -> Result<RawPackage> {
    let (name, version) = package_coordinates(&file.file_name)?;
    Ok(RawPackage {
        name,
        version,
        license_concluded: file.license_concluded,
        license_declared: file.license_info_in_file,
        copyright_text: file.copyright_text,
        download_location: file.download_location,
    })
}

/// Split an artifact file name into `(name, version)`.
///
/// `lib/foo-bar-1.0.3-sources.jar` → `("foo-bar", "1.0.3")`. The version starts
/// at the first `-<digit>`; without one the whole stem is the name.
pub fn package_coordinates(file_name: &str) -> Result<(String, String)> {
    let path = Path::new(file_name);
    let mut stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    for noise in FILE_NAME_NOISE {
        stem = stem.replace(noise, "");
    }

    let boundary = Regex::new(r"-\d")?;
    Ok(match boundary.find(&stem) {
        Some(m) => (stem[..m.start()].to_string(), stem[m.start() + 1..].to_string()),
        None => (stem, String::new()),
    })
}
