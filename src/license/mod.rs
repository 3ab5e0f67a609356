//! License expression handling.
//!
//! - [`expression`]: splits compound SPDX expressions into atomic identifiers
//!   and parses them into a [`LicenseExpr`](expression::LicenseExpr) tree.

pub mod expression;
