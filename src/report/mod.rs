//! Consumers of the canonical [`Document`].
//!
//! - [`json`]: writes the whole document as pretty-printed JSON.
//! - [`terminal`]: colored license/package summary; respects `--verbose` / `--quiet`.

use std::path::PathBuf;

use anyhow::Result;

use crate::models::Document;

pub mod json;
pub mod terminal;

/// Renders a document to an artifact and reports where it was written.
pub trait NoticeGenerator {
    fn generate(&self, document: &Document) -> Result<PathBuf>;
}

/// `OSS_Notice_<document name>` with spaces replaced, shared by file generators.
pub fn notice_file_stem(document: &Document) -> String {
    format!("OSS_Notice_{}", document.name.replace(' ', "_"))
}
