use std::path::Path;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::license::expression::LicenseExpr;
use crate::models::{Document, LicenseSource, Package};

/// Render a colored terminal summary of a normalized document.
pub fn render(document: &Document, source: &Path, verbose: bool, quiet: bool) -> Result<()> {
    let package_count = document.packages.len();
    let license_count = document.licenses.len();
    let extracted_used = document
        .licenses
        .values()
        .filter(|l| l.source == LicenseSource::Extracted)
        .count();
    let choice_count = document
        .packages
        .values()
        .filter(|p| p.license_expression.as_ref().is_some_and(LicenseExpr::is_choice))
        .count();

    if quiet {
        println!(
            "Packages: {}  Licenses: {}  Extracted: {}",
            package_count.to_string().cyan(),
            license_count.to_string().green(),
            extracted_used.to_string().yellow(),
        );
        return Ok(());
    }

    println!("\n {} v{}", "spdx-notice".bold(), env!("CARGO_PKG_VERSION"));
    println!(" Source: {}\n", source.display());

    let info = &document.creation_info;
    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", document.name.bold());
    println!(
        " │  {:<48} │",
        format!("{} <{}>", info.organization, info.email)
    );
    println!(" │  {:<48} │", format!("Packages         : {:>4}", package_count));
    println!(
        " │  {:<48} │",
        format!("{}  Licenses       : {:>4}", "✓".green(), license_count)
    );
    println!(
        " │  {:<48} │",
        format!("{}  Extracted      : {:>4}", "◆".yellow(), extracted_used)
    );
    println!(
        " │  {:<48} │",
        format!("{}  License choice : {:>4}", "⚠".yellow(), choice_count)
    );
    println!(" └────────────────────────────────────────────────────┘\n");

    if license_count > 0 {
        println!(" {} Licenses:\n", "[LICENSES]".green().bold());
        render_license_table(document);
        println!();
    }

    if verbose && package_count > 0 {
        println!(" {} Packages:\n", "[PACKAGES]".cyan().bold());
        render_package_table(document.packages.values());
        println!();
    }

    Ok(())
}

fn render_license_table(document: &Document) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("License").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Packages").add_attribute(Attribute::Bold),
        ]);

    for license in document.licenses.values() {
        let (source, color) = source_label(license.source);
        table.add_row(vec![
            Cell::new(&license.id),
            Cell::new(&license.name),
            Cell::new(source).fg(color),
            Cell::new(license.packages.len()).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{}", table);
}

fn source_label(source: LicenseSource) -> (&'static str, Color) {
    match source {
        LicenseSource::Registry => ("spdx", Color::Green),
        LicenseSource::Extracted => ("extracted", Color::Yellow),
    }
}

/// Number of license identifiers (exceptions included) a package references.
fn term_count(package: &Package) -> usize {
    package
        .license_expression
        .as_ref()
        .map_or(0, |expr| expr.identifiers().len())
}

fn render_package_table<'a>(packages: impl Iterator<Item = &'a Package>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("License").add_attribute(Attribute::Bold),
            Cell::new("Terms").add_attribute(Attribute::Bold),
            Cell::new("Download").add_attribute(Attribute::Bold),
        ]);

    for package in packages {
        let license = package.effective_license();
        let color = match &package.license_expression {
            None => Color::DarkGrey,
            Some(expr) if expr.is_choice() => Color::Yellow,
            Some(_) => Color::Green,
        };
        table.add_row(vec![
            Cell::new(&package.name),
            Cell::new(&package.version),
            Cell::new(if license.is_empty() { "none" } else { license }).fg(color),
            Cell::new(term_count(package)).set_alignment(CellAlignment::Right),
            Cell::new(&package.download_location),
        ]);
    }

    println!("{}", table);
}
