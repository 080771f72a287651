//! Header and data-region detection for sheets whose table can start on any
//! row, with columns in any order and blank spacer rows inside it.

use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::grid::{Cell, Grid};
use crate::models::{PriceRecord, RequestRecord};

/// Consecutive blank rows that close a table once data has been seen.
const END_OF_TABLE_BLANKS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ItemName,
    SpecCode,
    Manufacturer,
    Unit,
    Quantity,
    UnitPrice,
    Amount,
    PurchaseQuantity,
}

/// Required column labels of one document kind, plus labels that stand in
/// for a required one when it is missing from the header row.
#[derive(Debug)]
pub struct HeaderSchema {
    pub labels: &'static [(&'static str, Field)],
    pub synonyms: &'static [(&'static str, Field)],
}

pub const PRICE_SCHEMA: HeaderSchema = HeaderSchema {
    labels: &[
        ("품명", Field::ItemName),
        ("규격", Field::SpecCode),
        ("단위", Field::Unit),
        ("수량", Field::Quantity),
        ("단가", Field::UnitPrice),
        ("금액", Field::Amount),
    ],
    synonyms: &[],
};

pub const REQUEST_SCHEMA: HeaderSchema = HeaderSchema {
    labels: &[
        ("품명", Field::ItemName),
        ("규격", Field::SpecCode),
        ("제조사", Field::Manufacturer),
        ("단위", Field::Unit),
        ("구매량", Field::PurchaseQuantity),
    ],
    synonyms: &[("수량", Field::PurchaseQuantity)],
};

impl HeaderSchema {
    fn field_for(&self, label: &str) -> Option<Field> {
        self.labels
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, f)| *f)
    }

    fn synonym_for(&self, label: &str) -> Option<Field> {
        self.synonyms
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, f)| *f)
    }

    fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.labels.iter().map(|(_, f)| *f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRow {
    pub row: usize,
    pub columns: HashMap<Field, usize>,
}

impl HeaderRow {
    pub fn cell<'g>(&self, grid: &'g Grid, row: usize, field: Field) -> &'g Cell {
        match self.columns.get(&field) {
            Some(&col) => grid.get(row, col),
            None => Cell::blank(),
        }
    }

    fn text(&self, grid: &Grid, row: usize, field: Field) -> String {
        self.cell(grid, row, field).normalized()
    }

    fn number(&self, grid: &Grid, row: usize, field: Field) -> Option<f64> {
        self.cell(grid, row, field).to_float()
    }
}

/// First row, top to bottom, that carries every required label. The first
/// column wins when a label repeats.
pub fn locate_header(grid: &Grid, schema: &HeaderSchema) -> Option<HeaderRow> {
    (0..grid.height()).find_map(|row| {
        let mut columns: HashMap<Field, usize> = HashMap::new();
        let mut stand_ins: HashMap<Field, usize> = HashMap::new();
        for (col, cell) in grid.row(row).iter().enumerate() {
            let label = cell.normalized();
            if label.is_empty() {
                continue;
            }
            if let Some(field) = schema.field_for(&label) {
                columns.entry(field).or_insert(col);
            } else if let Some(field) = schema.synonym_for(&label) {
                stand_ins.entry(field).or_insert(col);
            }
        }
        for (field, col) in stand_ins {
            columns.entry(field).or_insert(col);
        }
        schema
            .fields()
            .all(|f| columns.contains_key(&f))
            .then_some(HeaderRow { row, columns })
    })
}

/// Rows below the header that hold data in at least one mapped column.
///
/// Blank rows before the first data row are skipped; after that, the table
/// ends at the second consecutive blank row.
pub fn data_rows(grid: &Grid, header: &HeaderRow) -> Vec<usize> {
    let mut rows = Vec::new();
    let mut seen_data = false;
    let mut blank_streak = 0usize;
    for row in header.row + 1..grid.height() {
        let has_any = header
            .columns
            .values()
            .any(|&col| !grid.get(row, col).is_blank());
        if has_any {
            seen_data = true;
            blank_streak = 0;
            rows.push(row);
        } else if seen_data {
            blank_streak += 1;
            if blank_streak >= END_OF_TABLE_BLANKS {
                break;
            }
        }
    }
    rows
}

pub fn extract_price_records(
    grid: &Grid,
    source_document: &str,
    source_section: &str,
    effective_timestamp: DateTime<Local>,
) -> Vec<PriceRecord> {
    if grid.is_blank() {
        return Vec::new();
    }
    let Some(header) = locate_header(grid, &PRICE_SCHEMA) else {
        return Vec::new();
    };
    let free_text_marker = grid.marker_text();
    data_rows(grid, &header)
        .into_iter()
        .filter_map(|row| {
            let item_name = header.text(grid, row, Field::ItemName);
            if item_name.is_empty() {
                return None;
            }
            Some(PriceRecord {
                source_document: source_document.to_string(),
                source_section: source_section.to_string(),
                effective_timestamp,
                free_text_marker: free_text_marker.clone(),
                item_name,
                spec_code: header.text(grid, row, Field::SpecCode),
                unit: header.text(grid, row, Field::Unit),
                quantity: header.number(grid, row, Field::Quantity),
                unit_price: header.number(grid, row, Field::UnitPrice),
                amount: header.number(grid, row, Field::Amount),
            })
        })
        .collect()
}

pub fn extract_request_records(
    grid: &Grid,
    source_document: &str,
    source_section: &str,
) -> Vec<RequestRecord> {
    if grid.is_blank() {
        return Vec::new();
    }
    let Some(header) = locate_header(grid, &REQUEST_SCHEMA) else {
        return Vec::new();
    };
    data_rows(grid, &header)
        .into_iter()
        .filter_map(|row| {
            let item_name = header.text(grid, row, Field::ItemName);
            if item_name.is_empty() {
                return None;
            }
            Some(RequestRecord {
                source_document: source_document.to_string(),
                source_section: source_section.to_string(),
                item_name,
                spec_code: header.text(grid, row, Field::SpecCode),
                manufacturer: header.text(grid, row, Field::Manufacturer),
                unit: header.text(grid, row, Field::Unit),
                purchase_quantity: header.number(grid, row, Field::PurchaseQuantity),
            })
        })
        .collect()
}
