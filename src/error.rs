//! Error taxonomy for the normalization pipeline.
//!
//! Every variant is terminal for the current run: nothing is retried and no
//! partially built document ever leaves [`crate::normalize`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoticeError {
    /// A required sheet, column, subject, predicate or scalar is missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// An atomic identifier matched neither the registry nor the extracted-license table.
    #[error(
        "license '{license}' referenced by package '{package} {version}' is not in the SPDX \
         license list and has no extracted license entry"
    )]
    UnresolvedLicense {
        license: String,
        package: String,
        version: String,
    },

    /// Network or decode failure while talking to the license registry.
    #[error("registry request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered, but with something we cannot use.
    #[error("registry error: {0}")]
    Registry(String),

    #[error("unsupported input file type: {}", .0.display())]
    UnsupportedInput(PathBuf),

    /// The input container or markup could not be parsed at all.
    #[error("malformed {kind} input: {message}")]
    Malformed { kind: &'static str, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl NoticeError {
    pub fn validation(message: impl Into<String>) -> Self {
        NoticeError::Validation(message.into())
    }

    pub fn malformed(kind: &'static str, message: impl std::fmt::Display) -> Self {
        NoticeError::Malformed {
            kind,
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NoticeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_message_names_license_and_package() {
        let err = NoticeError::UnresolvedLicense {
            license: "LicenseRef-x".to_string(),
            package: "libfoo".to_string(),
            version: "1.2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("LicenseRef-x"));
        assert!(msg.contains("libfoo 1.2"));
    }

    #[test]
    fn test_unsupported_input_message() {
        let err = NoticeError::UnsupportedInput(PathBuf::from("sbom.csv"));
        assert_eq!(err.to_string(), "unsupported input file type: sbom.csv");
    }
}
