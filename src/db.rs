use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    checksum TEXT NOT NULL,
    effective_timestamp TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    ingested_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS price_records (
    id INTEGER PRIMARY KEY,
    document_id INTEGER,
    source_document TEXT NOT NULL,
    source_section TEXT NOT NULL,
    effective_timestamp TEXT NOT NULL,
    free_text_marker TEXT NOT NULL DEFAULT '',
    item_name TEXT NOT NULL,
    spec_code TEXT NOT NULL DEFAULT '',
    unit TEXT NOT NULL DEFAULT '',
    quantity REAL,
    unit_price REAL,
    amount REAL,
    FOREIGN KEY (document_id) REFERENCES documents(id)
);

CREATE INDEX IF NOT EXISTS idx_price_lookup
    ON price_records (item_name, spec_code, effective_timestamp);

CREATE INDEX IF NOT EXISTS idx_price_spec
    ON price_records (spec_code, effective_timestamp);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
