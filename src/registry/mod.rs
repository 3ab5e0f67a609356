//! License registry lookups.
//!
//! [`LicenseRegistry`] is the seam the normalizer resolves identifiers through;
//! [`spdx::SpdxRegistry`] implements it against the public SPDX license list.
//! A lookup returns `Ok(None)` when the identifier is unknown and `Err` on
//! transport or decode failures.

pub mod spdx;

use serde::Serialize;

use crate::error::Result;

/// Canonical name and full text of a license or license exception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseDetails {
    pub id: String,
    pub name: String,
    pub text: String,
    pub text_html: Option<String>,
}

pub trait LicenseRegistry {
    /// Resolve one atomic identifier, or report that the registry does not know it.
    fn resolve(&mut self, id: &str) -> Result<Option<LicenseDetails>>;
}
