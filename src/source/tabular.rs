use std::path::Path;

use tracing::{debug, warn};

use super::workbook::{cell, Sheet, Workbook};
use super::SourceReader;
use crate::error::{NoticeError, Result};
use crate::license::expression::normalize_license_value;
use crate::models::{
    CreationInfo, DocumentMetadata, ExtractedLicense, RawFile, RawPackage, RawRecordSet,
};

const SHEET_DOCUMENT_INFO: &str = "Document Info";
const SHEET_PACKAGE_INFO: &str = "Package Info";
const SHEET_PER_FILE_INFO: &str = "Per File Info";
const SHEET_EXTRACTED_LICENSE_INFO: &str = "Extracted License Info";

const COLUMN_DOCUMENT_NAME: &str = "Document Name";
const COLUMN_CREATOR: &str = "Creator";
const COLUMN_PACKAGE_NAME: &str = "Package Name";
const COLUMN_PACKAGE_VERSION: &str = "Package Version";
const COLUMN_PACKAGE_DOWNLOAD_LOCATION: &str = "Package Download Location";
const COLUMN_LICENSE_CONCLUDED: &str = "License Concluded";
const COLUMN_LICENSE_DECLARED: &str = "License Declared";
const COLUMN_PACKAGE_COPYRIGHT_TEXT: &str = "Package Copyright Text";
const COLUMN_FILE_NAME: &str = "File Name";
const COLUMN_LICENSE_INFO_IN_FILE: &str = "License Info in File";
const COLUMN_FILE_COPYRIGHT_TEXT: &str = "File Copyright Text";
const COLUMN_ARTIFACT_OF_HOMEPAGE: &str = "Artifact of Homepage";
const COLUMN_IDENTIFIER: &str = "Identifier";
const COLUMN_EXTRACTED_TEXT: &str = "Extracted Text";
const COLUMN_LICENSE_NAME: &str = "License Name";

/// (sheet, required columns, sheet is required)
const LAYOUT: [(&str, &[&str], bool); 4] = [
    (
        SHEET_DOCUMENT_INFO,
        &[COLUMN_DOCUMENT_NAME, COLUMN_CREATOR],
        true,
    ),
    (
        SHEET_PACKAGE_INFO,
        &[
            COLUMN_PACKAGE_NAME,
            COLUMN_PACKAGE_VERSION,
            COLUMN_LICENSE_CONCLUDED,
            COLUMN_LICENSE_DECLARED,
            COLUMN_PACKAGE_COPYRIGHT_TEXT,
            COLUMN_PACKAGE_DOWNLOAD_LOCATION,
        ],
        true,
    ),
    (
        SHEET_PER_FILE_INFO,
        &[
            COLUMN_FILE_NAME,
            COLUMN_LICENSE_CONCLUDED,
            COLUMN_LICENSE_INFO_IN_FILE,
            COLUMN_FILE_COPYRIGHT_TEXT,
            COLUMN_ARTIFACT_OF_HOMEPAGE,
        ],
        true,
    ),
    (
        SHEET_EXTRACTED_LICENSE_INFO,
        &[COLUMN_IDENTIFIER, COLUMN_EXTRACTED_TEXT, COLUMN_LICENSE_NAME],
        false,
    ),
];

/// Reader for the SPDX spreadsheet layout (`.xlsx`).
pub struct TabularReader;

impl TabularReader {
    pub fn new() -> Self {
        Self
    }
}

impl SourceReader for TabularReader {
    fn read(&self, path: &Path) -> Result<RawRecordSet> {
        let workbook = Workbook::open(path)?;
        debug!(sheets = ?workbook.sheet_names().collect::<Vec<_>>(), "opened workbook");
        records_from_workbook(&workbook)
    }
}

/// Validate the sheet layout, then extract every record.
pub fn records_from_workbook(workbook: &Workbook) -> Result<RawRecordSet> {
    validate(workbook)?;

    let metadata = document_info(required_sheet(workbook, SHEET_DOCUMENT_INFO)?)?;
    let packages = package_info(required_sheet(workbook, SHEET_PACKAGE_INFO)?);
    let files = per_file_info(required_sheet(workbook, SHEET_PER_FILE_INFO)?);
    let extracted_licenses = workbook
        .sheet(SHEET_EXTRACTED_LICENSE_INFO)
        .map(extracted_license_info)
        .unwrap_or_default();

    Ok(RawRecordSet {
        metadata,
        packages,
        files,
        extracted_licenses,
    })
}

fn validate(workbook: &Workbook) -> Result<()> {
    for (sheet_name, columns, required) in LAYOUT {
        let sheet = match workbook.sheet(sheet_name) {
            Some(sheet) => sheet,
            None if required => {
                return Err(NoticeError::validation(format!(
                    "required sheet is missing: {}",
                    sheet_name
                )))
            }
            None => continue,
        };
        for column in columns {
            if sheet.column(column).is_none() {
                return Err(NoticeError::validation(format!(
                    "required column is missing: {} (sheet {})",
                    column, sheet_name
                )));
            }
        }
    }
    Ok(())
}

fn required_sheet<'a>(workbook: &'a Workbook, name: &str) -> Result<&'a Sheet> {
    workbook
        .sheet(name)
        .ok_or_else(|| NoticeError::validation(format!("required sheet is missing: {}", name)))
}

/// Column lookup after [`validate`] has confirmed the header.
fn col(sheet: &Sheet, name: &str) -> usize {
    sheet.column(name).unwrap_or(usize::MAX)
}

fn document_info(sheet: &Sheet) -> Result<DocumentMetadata> {
    let name_col = col(sheet, COLUMN_DOCUMENT_NAME);
    let creator_col = col(sheet, COLUMN_CREATOR);

    let names: Vec<&str> = sheet
        .data_rows()
        .map(|row| cell(row, name_col).trim())
        .filter(|name| !name.is_empty())
        .collect();
    let name = match names.as_slice() {
        [name] => name.to_string(),
        [] => {
            return Err(NoticeError::validation(format!(
                "required value is missing: {}",
                COLUMN_DOCUMENT_NAME
            )))
        }
        _ => {
            return Err(NoticeError::validation(format!(
                "expected exactly one {}, found {}",
                COLUMN_DOCUMENT_NAME,
                names.len()
            )))
        }
    };

    let creation_info = sheet
        .data_rows()
        .map(|row| cell(row, creator_col))
        .filter(|creator| !creator.trim().is_empty())
        .find_map(|creator| {
            let parsed = CreationInfo::from_creator(creator);
            if parsed.is_none() {
                debug!(creator, "skipping creator without organization and email");
            }
            parsed
        })
        .ok_or_else(|| {
            NoticeError::validation(format!(
                "no creator with Organization and email in sheet {}",
                SHEET_DOCUMENT_INFO
            ))
        })?;

    Ok(DocumentMetadata {
        name,
        creation_info,
    })
}

fn package_info(sheet: &Sheet) -> Vec<RawPackage> {
    let name = col(sheet, COLUMN_PACKAGE_NAME);
    let version = col(sheet, COLUMN_PACKAGE_VERSION);
    let concluded = col(sheet, COLUMN_LICENSE_CONCLUDED);
    let declared = col(sheet, COLUMN_LICENSE_DECLARED);
    let copyright = col(sheet, COLUMN_PACKAGE_COPYRIGHT_TEXT);
    let location = col(sheet, COLUMN_PACKAGE_DOWNLOAD_LOCATION);

    sheet
        .data_rows()
        .map(|row| RawPackage {
            name: cell(row, name).trim().to_string(),
            version: cell(row, version).trim().to_string(),
            license_concluded: normalize_license_value(cell(row, concluded)),
            license_declared: normalize_license_value(cell(row, declared)),
            copyright_text: cell(row, copyright).to_string(),
            download_location: cell(row, location).replace('"', ""),
        })
        .collect()
}

fn per_file_info(sheet: &Sheet) -> Vec<RawFile> {
    let name = col(sheet, COLUMN_FILE_NAME);
    let concluded = col(sheet, COLUMN_LICENSE_CONCLUDED);
    let in_file = col(sheet, COLUMN_LICENSE_INFO_IN_FILE);
    let copyright = col(sheet, COLUMN_FILE_COPYRIGHT_TEXT);
    let homepage = col(sheet, COLUMN_ARTIFACT_OF_HOMEPAGE);

    sheet
        .data_rows()
        .map(|row| RawFile {
            file_name: cell(row, name).trim().to_string(),
            license_concluded: normalize_license_value(cell(row, concluded)),
            license_info_in_file: normalize_license_value(cell(row, in_file)),
            copyright_text: cell(row, copyright).to_string(),
            download_location: cell(row, homepage).replace('"', ""),
        })
        .collect()
}

fn extracted_license_info(sheet: &Sheet) -> Vec<ExtractedLicense> {
    let identifier = col(sheet, COLUMN_IDENTIFIER);
    let text = col(sheet, COLUMN_EXTRACTED_TEXT);
    let license_name = col(sheet, COLUMN_LICENSE_NAME);

    sheet
        .data_rows()
        .filter_map(|row| {
            let id = cell(row, identifier).trim();
            if id.is_empty() {
                warn!("skipping extracted license row without an identifier");
                return None;
            }
            Some(ExtractedLicense {
                identifier: id.to_string(),
                name: cell(row, license_name).trim().to_string(),
                text: cell(row, text).to_string(),
            })
        })
        .collect()
}
