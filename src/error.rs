use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricebookError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read workbook {}: {message}", path.display())]
    Workbook { path: PathBuf, message: String },

    #[error("No {kind} documents found under {}", root.display())]
    NoDocuments { kind: &'static str, root: PathBuf },

    #[error("The price index has no price documents loaded. Run `pricebook ingest <folder>` first.")]
    EmptyIndex,

    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, PricebookError>;
