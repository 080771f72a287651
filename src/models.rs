use chrono::{DateTime, Local};
use serde::Serialize;

/// One priced line of a historical quotation. Every line of a document
/// shares the document's timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub source_document: String,
    pub source_section: String,
    pub effective_timestamp: DateTime<Local>,
    pub free_text_marker: String,
    pub item_name: String,
    pub spec_code: String,
    pub unit: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub amount: Option<f64>,
}

/// A line of a purchase request that needs a price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub source_document: String,
    pub source_section: String,
    pub item_name: String,
    pub spec_code: String,
    pub manufacturer: String,
    pub unit: String,
    pub purchase_quantity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    SpecOnly,
    SpecFuzzy,
    NameOnly,
}

impl MatchTier {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::SpecOnly => "spec_only",
            Self::SpecFuzzy => "spec_fuzzy",
            Self::NameOnly => "name_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Priced,
    NoPriceFound,
}

impl MatchStatus {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Priced => "priced",
            Self::NoPriceFound => "no_price_found",
        }
    }
}

/// Price plus provenance of a historical record, as shown for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub unit_price: Option<f64>,
    pub source_document: String,
    pub source_section: String,
    pub effective_timestamp: DateTime<Local>,
    pub free_text_marker: String,
}

impl From<&PriceRecord> for Candidate {
    fn from(record: &PriceRecord) -> Self {
        Self {
            unit_price: record.unit_price,
            source_document: record.source_document.clone(),
            source_section: record.source_section.clone(),
            effective_timestamp: record.effective_timestamp,
            free_text_marker: record.free_text_marker.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub request: RequestRecord,
    pub matched: bool,
    /// Tier that produced `provenance`; set for priceless hits as well.
    pub tier: Option<MatchTier>,
    pub unit_price: Option<f64>,
    pub amount: Option<f64>,
    /// Outcome of the index lookup. Manual overrides replace `unit_price`
    /// and `amount` only, so a cleared line can still read `priced`.
    pub status: MatchStatus,
    pub provenance: Option<Candidate>,
    /// Every priced record under the exact (item, spec) key, newest first.
    pub candidates: Vec<Candidate>,
}

impl MatchResult {
    /// Replace the unit price (or clear it with `None`) and recompute the amount.
    pub fn set_unit_price(&mut self, unit_price: Option<f64>) {
        self.unit_price = unit_price;
        self.amount = line_amount(unit_price, self.request.purchase_quantity);
    }
}

/// `unit_price × quantity`, unknown if either side is unknown.
pub fn line_amount(unit_price: Option<f64>, quantity: Option<f64>) -> Option<f64> {
    Some(unit_price? * quantity?)
}
