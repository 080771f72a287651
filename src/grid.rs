use calamine::{Data, Range};

use crate::normalize::normalize_text;

/// Row/column of the free-text marker cell (A7).
pub const MARKER_CELL: (usize, usize) = (6, 0);

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Self::Empty,
            Data::String(s) => Self::Text(s.clone()),
            Data::Float(f) if f.is_nan() => Self::Empty,
            Data::Float(f) => Self::Number(*f),
            Data::Int(i) => Self::Number(*i as f64),
            Data::Bool(b) => Self::Bool(*b),
            Data::DateTime(dt) => Self::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Self::Text(s.clone()),
        }
    }

    pub fn blank() -> &'static Cell {
        &EMPTY
    }

    /// Display text of the cell. Integral numbers render without a
    /// fractional part so numeric codes survive as written.
    pub fn text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Self::Number(f) => f.to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
        }
    }

    pub fn normalized(&self) -> String {
        match self {
            Self::Empty => String::new(),
            other => normalize_text(&other.text()),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.normalized().is_empty()
    }

    /// Numeric value, or `None` when the cell is blank or not a number.
    /// Text is accepted with thousands separators.
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Self::Number(f) => Some(*f),
            Self::Text(s) => {
                let cleaned = s.trim().replace(',', "");
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
            }
            Self::Empty | Self::Bool(_) => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}

/// Read-only view of one sheet, addressed from A1. Rows may be ragged;
/// anything outside the stored cells reads as `Cell::Empty`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// calamine ranges start at their first used cell; pad back to A1 so
    /// absolute positions such as the marker cell stay addressable.
    pub fn from_range(range: &Range<Data>) -> Self {
        let Some((start_row, start_col)) = range.start() else {
            return Self::default();
        };
        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
        for source in range.rows() {
            let mut row = vec![Cell::Empty; start_col as usize];
            row.extend(source.iter().map(Cell::from_data));
            rows.push(row);
        }
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn is_blank(&self) -> bool {
        self.rows.iter().flatten().all(Cell::is_blank)
    }

    pub fn marker_text(&self) -> String {
        let (row, col) = MARKER_CELL;
        self.get(row, col).text().trim().to_string()
    }
}
