use std::path::Path;

use colored::Colorize;

use crate::cli::open_index;
use crate::error::Result;
use crate::importer::{build_index, DocumentFilter};
use crate::settings::load_settings;

pub fn run(folder: &str, db: Option<&str>) -> Result<()> {
    let filter = DocumentFilter::price_documents(&load_settings());
    let index = open_index(db)?;

    let summary = build_index(&index, Path::new(folder), |p| filter.matches(p))?;

    println!(
        "{} documents ingested, {} price records added",
        summary.documents, summary.records
    );
    for (path, reason) in &summary.failed {
        println!("{} {}: {reason}", "skipped".yellow(), path.display());
    }
    Ok(())
}
