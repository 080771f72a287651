use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::quantity;
use crate::importer::{load_requests, DocumentFilter};
use crate::settings::load_settings;

pub fn run(path: &str) -> Result<()> {
    let filter = DocumentFilter::request_documents(&load_settings());
    let batch = load_requests(Path::new(path), |p| filter.matches(p))?;

    let mut table = Table::new();
    table.set_header(vec!["#", "Item", "Spec", "Manufacturer", "Unit", "Qty", "Sheet"]);
    for (i, r) in batch.records.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(&r.item_name),
            Cell::new(&r.spec_code),
            Cell::new(&r.manufacturer),
            Cell::new(&r.unit),
            Cell::new(quantity(r.purchase_quantity)),
            Cell::new(&r.source_section),
        ]);
    }
    println!("{table}");
    println!(
        "{} request lines from {} documents",
        batch.records.len(),
        batch.documents
    );
    for (file, reason) in &batch.failed {
        println!("{} {}: {reason}", "skipped".yellow(), file.display());
    }
    Ok(())
}
