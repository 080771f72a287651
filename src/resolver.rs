use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{PricebookError, Result};
use crate::index::PriceIndex;
use crate::models::{line_amount, Candidate, MatchResult, MatchStatus, MatchTier, PriceRecord, RequestRecord};
use crate::normalize::{fuzzy_key, fuzzy_keys_match};

// ---------------------------------------------------------------------------
// Tiers: enum dispatch, tried in declared order
// ---------------------------------------------------------------------------

pub const DEFAULT_TIERS: &[MatchTier] = &[
    MatchTier::Exact,
    MatchTier::SpecOnly,
    MatchTier::SpecFuzzy,
    MatchTier::NameOnly,
];

impl MatchTier {
    /// The record this tier would use for `request`, priced or not.
    pub fn lookup<I: PriceIndex + ?Sized>(
        &self,
        index: &I,
        request: &RequestRecord,
    ) -> Result<Option<PriceRecord>> {
        let name = request.item_name.as_str();
        let spec = request.spec_code.as_str();
        match self {
            Self::Exact if !name.is_empty() && !spec.is_empty() => index.exact(name, spec),
            Self::SpecOnly if !spec.is_empty() => index.by_spec(spec),
            Self::SpecFuzzy if !spec.is_empty() => lookup_fuzzy_spec(index, spec),
            Self::NameOnly if !name.is_empty() => index.by_name(name),
            _ => Ok(None),
        }
    }
}

/// Newest spec-bearing record whose fuzzy key is a suffix of the request's,
/// or the other way round. Recency decides between several hits.
fn lookup_fuzzy_spec<I: PriceIndex + ?Sized>(index: &I, spec_code: &str) -> Result<Option<PriceRecord>> {
    let target = fuzzy_key(spec_code);
    if target.is_empty() {
        return Ok(None);
    }
    Ok(index
        .all_with_spec()?
        .into_iter()
        .find(|record| fuzzy_keys_match(&target, &fuzzy_key(&record.spec_code))))
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

pub fn resolve_one<I: PriceIndex + ?Sized>(
    index: &I,
    request: &RequestRecord,
    tiers: &[MatchTier],
) -> Result<MatchResult> {
    let candidates: Vec<Candidate> = if request.item_name.is_empty() || request.spec_code.is_empty() {
        Vec::new()
    } else {
        index
            .all_exact_candidates(&request.item_name, &request.spec_code)?
            .iter()
            .map(Candidate::from)
            .collect()
    };

    let mut closest: Option<(MatchTier, PriceRecord)> = None;
    for tier in tiers {
        let Some(record) = tier.lookup(index, request)? else {
            continue;
        };
        if let Some(unit_price) = record.unit_price {
            debug!(item = %request.item_name, tier = tier.key(), unit_price, "priced");
            return Ok(MatchResult {
                request: request.clone(),
                matched: true,
                tier: Some(*tier),
                unit_price: Some(unit_price),
                amount: line_amount(Some(unit_price), request.purchase_quantity),
                status: MatchStatus::Priced,
                provenance: Some(Candidate::from(&record)),
                candidates,
            });
        }
        debug!(item = %request.item_name, tier = tier.key(), "record has no unit price, trying next tier");
        closest = Some((*tier, record));
    }

    debug!(item = %request.item_name, spec = %request.spec_code, "no price found");
    Ok(MatchResult {
        request: request.clone(),
        matched: false,
        tier: closest.as_ref().map(|(tier, _)| *tier),
        unit_price: None,
        amount: None,
        status: MatchStatus::NoPriceFound,
        provenance: closest.as_ref().map(|(_, record)| Candidate::from(record)),
        candidates,
    })
}

/// Resolve every request in order with the default tiers. Fails when the
/// index has nothing loaded, so an empty history is never mistaken for a
/// batch where nothing matched.
pub fn resolve<I: PriceIndex + ?Sized>(index: &I, requests: &[RequestRecord]) -> Result<Vec<MatchResult>> {
    resolve_with(index, requests, DEFAULT_TIERS)
}

pub fn resolve_with<I: PriceIndex + ?Sized>(
    index: &I,
    requests: &[RequestRecord],
    tiers: &[MatchTier],
) -> Result<Vec<MatchResult>> {
    if index.document_count()? == 0 {
        return Err(PricebookError::EmptyIndex);
    }
    requests
        .iter()
        .map(|request| resolve_one(index, request, tiers))
        .collect()
}

// ---------------------------------------------------------------------------
// Manual overrides
// ---------------------------------------------------------------------------

/// Position in the result list → replacement unit price, `None` to clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides(BTreeMap<usize, Option<f64>>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, position: usize, unit_price: Option<f64>) {
        self.0.insert(position, unit_price);
    }

    /// Parse `IDX=PRICE` or `IDX=clear`.
    pub fn parse_assignment(&mut self, raw: &str) -> Result<()> {
        let (idx, value) = raw
            .split_once('=')
            .ok_or_else(|| PricebookError::InvalidOverride(format!("expected IDX=PRICE, got '{raw}'")))?;
        let position: usize = idx
            .trim()
            .parse()
            .map_err(|_| PricebookError::InvalidOverride(format!("bad position '{idx}'")))?;
        let value = value.trim();
        let unit_price = if value.is_empty() || value.eq_ignore_ascii_case("clear") {
            None
        } else {
            Some(parse_price(value)?)
        };
        self.set(position, unit_price);
        Ok(())
    }

    /// Merge a JSON object such as `{"3": 1200, "5": null}`.
    pub fn merge_json(&mut self, json: &str) -> Result<()> {
        let parsed: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        for (key, value) in parsed {
            let position: usize = key
                .trim()
                .parse()
                .map_err(|_| PricebookError::InvalidOverride(format!("bad position '{key}'")))?;
            let unit_price = match value {
                serde_json::Value::Null => None,
                serde_json::Value::Number(n) => Some(n.as_f64().ok_or_else(|| {
                    PricebookError::InvalidOverride(format!("bad price for position {position}"))
                })?),
                serde_json::Value::String(s) if s.trim().is_empty() => None,
                serde_json::Value::String(s) => Some(parse_price(&s)?),
                other => {
                    return Err(PricebookError::InvalidOverride(format!(
                        "bad price for position {position}: {other}"
                    )))
                }
            };
            self.set(position, unit_price);
        }
        Ok(())
    }

    /// Apply to resolved results; positions past the end are ignored.
    pub fn apply(&self, results: &mut [MatchResult]) -> usize {
        let mut applied = 0;
        for (&position, &unit_price) in &self.0 {
            if let Some(result) = results.get_mut(position) {
                result.set_unit_price(unit_price);
                applied += 1;
            }
        }
        applied
    }
}

fn parse_price(raw: &str) -> Result<f64> {
    raw.trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .ok_or_else(|| PricebookError::InvalidOverride(format!("bad price '{raw}'")))
}
