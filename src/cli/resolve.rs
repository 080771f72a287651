use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_index;
use crate::error::Result;
use crate::export::{to_json, write_csv};
use crate::fmt::{opt_price, price, quantity};
use crate::importer::{load_requests, DocumentFilter};
use crate::models::{MatchResult, MatchStatus};
use crate::resolver::{resolve, Overrides};
use crate::settings::load_settings;

pub struct MatchArgs {
    pub path: String,
    pub set: Vec<String>,
    pub overrides: Option<String>,
    pub output: Option<String>,
    pub json: bool,
}

pub fn run(args: MatchArgs, db: Option<&str>) -> Result<()> {
    let filter = DocumentFilter::request_documents(&load_settings());
    let batch = load_requests(Path::new(&args.path), |p| filter.matches(p))?;
    let index = open_index(db)?;

    let mut results = resolve(&index, &batch.records)?;

    let mut overrides = Overrides::new();
    if let Some(file) = &args.overrides {
        overrides.merge_json(&std::fs::read_to_string(file)?)?;
    }
    for assignment in &args.set {
        overrides.parse_assignment(assignment)?;
    }
    let applied = overrides.apply(&mut results);

    if args.json {
        println!("{}", to_json(&results)?);
    } else {
        print_table(&results);
        print_summary(&results, applied);
        for (file, reason) in &batch.failed {
            println!("{} {}: {reason}", "skipped".yellow(), file.display());
        }
    }

    if let Some(output) = args.output {
        let path = PathBuf::from(output);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        write_csv(&results, std::fs::File::create(&path)?)?;
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_table(results: &[MatchResult]) {
    let mut table = Table::new();
    table.set_header(vec![
        "#", "Item", "Spec", "Qty", "Unit Price", "Amount", "Tier", "Status", "Source",
    ]);
    for (i, r) in results.iter().enumerate() {
        let status = match r.status {
            MatchStatus::Priced => r.status.key().green(),
            MatchStatus::NoPriceFound => r.status.key().red(),
        };
        let source = r
            .provenance
            .as_ref()
            .map(|p| {
                format!(
                    "{} ({})",
                    p.source_document,
                    p.effective_timestamp.format("%Y-%m-%d")
                )
            })
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(i),
            Cell::new(&r.request.item_name),
            Cell::new(&r.request.spec_code),
            Cell::new(quantity(r.request.purchase_quantity)),
            Cell::new(opt_price(r.unit_price)),
            Cell::new(opt_price(r.amount)),
            Cell::new(r.tier.map(|t| t.key()).unwrap_or("-")),
            Cell::new(status),
            Cell::new(source),
        ]);
    }
    println!("{table}");
}

fn print_summary(results: &[MatchResult], applied: usize) {
    let priced = results
        .iter()
        .filter(|r| r.status == MatchStatus::Priced)
        .count();
    let total: f64 = results.iter().filter_map(|r| r.amount).sum();
    println!(
        "{priced} of {} lines priced, total {}",
        results.len(),
        price(total).bold()
    );
    if applied > 0 {
        println!("{applied} manual price overrides applied");
    }
}
