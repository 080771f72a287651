use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::models::{Candidate, MatchResult};

const CSV_HEADER: [&str; 17] = [
    "index",
    "source_document",
    "source_section",
    "item_name",
    "spec_code",
    "manufacturer",
    "unit",
    "purchase_quantity",
    "status",
    "tier",
    "unit_price",
    "amount",
    "price_document",
    "price_section",
    "price_date",
    "price_marker",
    "candidates",
];

fn option_to_csv(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One row per resolved request line, in request order.
pub fn write_csv<W: Write>(results: &[MatchResult], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(CSV_HEADER)?;
    for (i, result) in results.iter().enumerate() {
        let request = &result.request;
        let provenance = result.provenance.as_ref();
        writer.write_record([
            i.to_string(),
            request.source_document.clone(),
            request.source_section.clone(),
            request.item_name.clone(),
            request.spec_code.clone(),
            request.manufacturer.clone(),
            request.unit.clone(),
            option_to_csv(request.purchase_quantity),
            result.status.key().to_string(),
            result.tier.map(|t| t.key().to_string()).unwrap_or_default(),
            option_to_csv(result.unit_price),
            option_to_csv(result.amount),
            provenance.map(|p| p.source_document.clone()).unwrap_or_default(),
            provenance.map(|p| p.source_section.clone()).unwrap_or_default(),
            provenance.map(date_only).unwrap_or_default(),
            provenance.map(|p| p.free_text_marker.clone()).unwrap_or_default(),
            result.candidates.len().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn date_only(candidate: &Candidate) -> String {
    candidate.effective_timestamp.format("%Y-%m-%d").to_string()
}

// ---------------------------------------------------------------------------
// JSON view
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CandidateView<'a> {
    unit_price: Option<f64>,
    source_document: &'a str,
    source_section: &'a str,
    free_text_marker: &'a str,
    date: String,
}

impl<'a> From<&'a Candidate> for CandidateView<'a> {
    fn from(c: &'a Candidate) -> Self {
        Self {
            unit_price: c.unit_price,
            source_document: &c.source_document,
            source_section: &c.source_section,
            free_text_marker: &c.free_text_marker,
            date: date_only(c),
        }
    }
}

#[derive(Serialize)]
struct ResultView<'a> {
    source_document: &'a str,
    source_section: &'a str,
    item_name: &'a str,
    spec_code: &'a str,
    manufacturer: &'a str,
    unit: &'a str,
    purchase_quantity: Option<f64>,
    unit_price: Option<f64>,
    amount: Option<f64>,
    matched: bool,
    status: &'static str,
    tier: Option<&'static str>,
    provenance: Option<CandidateView<'a>>,
    candidates: Vec<CandidateView<'a>>,
}

/// Pretty-printed JSON array, dates reduced to `YYYY-MM-DD`.
pub fn to_json(results: &[MatchResult]) -> Result<String> {
    let views: Vec<ResultView> = results
        .iter()
        .map(|r| ResultView {
            source_document: &r.request.source_document,
            source_section: &r.request.source_section,
            item_name: &r.request.item_name,
            spec_code: &r.request.spec_code,
            manufacturer: &r.request.manufacturer,
            unit: &r.request.unit,
            purchase_quantity: r.request.purchase_quantity,
            unit_price: r.unit_price,
            amount: r.amount,
            matched: r.matched,
            status: r.status.key(),
            tier: r.tier.map(|t| t.key()),
            provenance: r.provenance.as_ref().map(CandidateView::from),
            candidates: r.candidates.iter().map(CandidateView::from).collect(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&views)?)
}
