use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::warn;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::models::PriceRecord;
use crate::normalize::normalize_text;

/// Query contract of the price history. All lookups are newest-first by
/// `effective_timestamp`, last inserted first on ties, and key on normalized
/// item names and spec codes.
pub trait PriceIndex {
    /// Append records. There is no dedup and no update path. Records whose
    /// item name normalizes to empty are skipped; returns the number stored.
    fn insert(&self, records: &[PriceRecord]) -> Result<usize>;

    fn exact(&self, item_name: &str, spec_code: &str) -> Result<Option<PriceRecord>>;

    /// Every record under the exact key that has a unit price.
    fn all_exact_candidates(&self, item_name: &str, spec_code: &str) -> Result<Vec<PriceRecord>>;

    fn by_spec(&self, spec_code: &str) -> Result<Option<PriceRecord>>;

    fn by_name(&self, item_name: &str) -> Result<Option<PriceRecord>>;

    /// Every record with a non-empty spec code.
    fn all_with_spec(&self) -> Result<Vec<PriceRecord>>;

    /// Number of distinct source documents loaded.
    fn document_count(&self) -> Result<i64>;
}

/// Audit entry for one ingested price document.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub path: String,
    pub checksum: String,
    pub effective_timestamp: DateTime<Local>,
}

const COLUMNS: &str = "source_document, source_section, effective_timestamp, free_text_marker, \
     item_name, spec_code, unit, quantity, unit_price, amount";

const NEWEST_FIRST: &str = "ORDER BY effective_timestamp DESC, id DESC";

/// UTC with fixed precision so timestamps sort correctly as text.
fn encode_timestamp(ts: &DateTime<Local>) -> String {
    ts.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str, col: usize) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_record(row: &Row) -> rusqlite::Result<PriceRecord> {
    let raw_ts: String = row.get(2)?;
    Ok(PriceRecord {
        source_document: row.get(0)?,
        source_section: row.get(1)?,
        effective_timestamp: decode_timestamp(&raw_ts, 2)?,
        free_text_marker: row.get(3)?,
        item_name: row.get(4)?,
        spec_code: row.get(5)?,
        unit: row.get(6)?,
        quantity: row.get(7)?,
        unit_price: row.get(8)?,
        amount: row.get(9)?,
    })
}

pub struct SqliteIndex {
    conn: Connection,
    path: PathBuf,
}

impl SqliteIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = get_connection(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one document's records together with its audit entry.
    pub fn ingest_document(&self, doc: &DocumentEntry, records: &[PriceRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO documents (path, checksum, effective_timestamp, record_count) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                doc.path,
                doc.checksum,
                encode_timestamp(&doc.effective_timestamp),
                records.len() as i64,
            ],
        )?;
        let document_id = tx.last_insert_rowid();
        let inserted = insert_records(&tx, Some(document_id), records)?;
        if inserted != records.len() {
            tx.execute(
                "UPDATE documents SET record_count = ?1 WHERE id = ?2",
                rusqlite::params![inserted as i64, document_id],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn record_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT count(*) FROM price_records", [], |r| r.get(0))?;
        Ok(count)
    }

    pub fn newest_timestamp(&self) -> Result<Option<DateTime<Local>>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT max(effective_timestamp) FROM price_records", [], |r| r.get(0))?;
        match raw {
            Some(raw) => Ok(Some(decode_timestamp(&raw, 0)?)),
            None => Ok(None),
        }
    }

    fn query_one(&self, filter: &str, params: impl rusqlite::Params) -> Result<Option<PriceRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM price_records WHERE {filter} {NEWEST_FIRST} LIMIT 1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let record = stmt.query_row(params, row_to_record).optional()?;
        Ok(record)
    }

    fn query_all(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<PriceRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM price_records WHERE {filter} {NEWEST_FIRST}");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map(params, row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn insert_records(conn: &Connection, document_id: Option<i64>, records: &[PriceRecord]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO price_records (document_id, source_document, source_section, effective_timestamp, \
         free_text_marker, item_name, spec_code, unit, quantity, unit_price, amount) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    let mut inserted = 0;
    for record in records {
        let item_name = normalize_text(&record.item_name);
        // a record without an item name can never be looked up
        if item_name.is_empty() {
            warn!(document = %record.source_document, "skipping price record without item name");
            continue;
        }
        stmt.execute(rusqlite::params![
            document_id,
            record.source_document,
            record.source_section,
            encode_timestamp(&record.effective_timestamp),
            record.free_text_marker,
            item_name,
            normalize_text(&record.spec_code),
            record.unit,
            record.quantity,
            record.unit_price,
            record.amount,
        ])?;
        inserted += 1;
    }
    Ok(inserted)
}

impl PriceIndex for SqliteIndex {
    fn insert(&self, records: &[PriceRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let inserted = insert_records(&tx, None, records)?;
        tx.commit()?;
        Ok(inserted)
    }

    fn exact(&self, item_name: &str, spec_code: &str) -> Result<Option<PriceRecord>> {
        self.query_one(
            "item_name = ?1 AND spec_code = ?2",
            [normalize_text(item_name), normalize_text(spec_code)],
        )
    }

    fn all_exact_candidates(&self, item_name: &str, spec_code: &str) -> Result<Vec<PriceRecord>> {
        self.query_all(
            "item_name = ?1 AND spec_code = ?2 AND unit_price IS NOT NULL",
            [normalize_text(item_name), normalize_text(spec_code)],
        )
    }

    fn by_spec(&self, spec_code: &str) -> Result<Option<PriceRecord>> {
        self.query_one("spec_code = ?1", [normalize_text(spec_code)])
    }

    fn by_name(&self, item_name: &str) -> Result<Option<PriceRecord>> {
        self.query_one("item_name = ?1", [normalize_text(item_name)])
    }

    fn all_with_spec(&self) -> Result<Vec<PriceRecord>> {
        self.query_all("spec_code != ''", [])
    }

    fn document_count(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT count(DISTINCT source_document) FROM price_records",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_index() -> (tempfile::TempDir, SqliteIndex) {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(&dir.path().join("test.db")).unwrap();
        (dir, index)
    }

    fn at(day: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn record(doc: &str, day: u32, name: &str, spec: &str, price: Option<f64>) -> PriceRecord {
        PriceRecord {
            source_document: doc.to_string(),
            source_section: "Sheet1".to_string(),
            effective_timestamp: at(day),
            free_text_marker: String::new(),
            item_name: name.to_string(),
            spec_code: spec.to_string(),
            unit: "EA".to_string(),
            quantity: Some(1.0),
            unit_price: price,
            amount: price,
        }
    }

    #[test]
    fn test_exact_returns_newest() {
        let (_dir, index) = test_index();
        index
            .insert(&[
                record("new.xlsx", 20, "BoltM6", "SS304-10MM", Some(120.0)),
                record("old.xlsx", 1, "BoltM6", "SS304-10MM", Some(100.0)),
            ])
            .unwrap();
        let hit = index.exact("BoltM6", "SS304-10MM").unwrap().unwrap();
        assert_eq!(hit.unit_price, Some(120.0));
        assert_eq!(hit.source_document, "new.xlsx");
        assert_eq!(hit.effective_timestamp, at(20));
    }

    #[test]
    fn test_tie_goes_to_last_inserted() {
        let (_dir, index) = test_index();
        index
            .insert(&[
                record("a.xlsx", 5, "Bolt", "M6", Some(1.0)),
                record("b.xlsx", 5, "Bolt", "M6", Some(2.0)),
            ])
            .unwrap();
        assert_eq!(index.exact("Bolt", "M6").unwrap().unwrap().unit_price, Some(2.0));
    }

    #[test]
    fn test_lookup_keys_are_normalized() {
        let (_dir, index) = test_index();
        index
            .insert(&[record("a.xlsx", 1, "Hex Bolt", "SS304 - 10MM", Some(9.0))])
            .unwrap();
        assert!(index.exact("HexBolt", "SS304-10MM").unwrap().is_some());
        assert!(index.by_spec("SS 304-10 MM").unwrap().is_some());
        assert!(index.by_name(" Hex\u{00A0}Bolt ").unwrap().is_some());
    }

    #[test]
    fn test_candidates_skip_unpriced_and_are_newest_first() {
        let (_dir, index) = test_index();
        index
            .insert(&[
                record("t1.xlsx", 1, "BoltM6", "SS304-10MM", Some(100.0)),
                record("t3.xlsx", 3, "BoltM6", "SS304-10MM", None),
                record("t2.xlsx", 2, "BoltM6", "SS304-10MM", Some(120.0)),
            ])
            .unwrap();
        let prices: Vec<Option<f64>> = index
            .all_exact_candidates("BoltM6", "SS304-10MM")
            .unwrap()
            .iter()
            .map(|r| r.unit_price)
            .collect();
        assert_eq!(prices, vec![Some(120.0), Some(100.0)]);
        // the latest record under the key is still returned even without a price
        assert_eq!(index.exact("BoltM6", "SS304-10MM").unwrap().unwrap().unit_price, None);
    }

    #[test]
    fn test_all_with_spec_excludes_blank_specs() {
        let (_dir, index) = test_index();
        index
            .insert(&[
                record("a.xlsx", 1, "Bolt", "", Some(1.0)),
                record("a.xlsx", 1, "Nut", "M6", Some(2.0)),
                record("b.xlsx", 2, "Washer", "W6", Some(3.0)),
            ])
            .unwrap();
        let specs: Vec<String> = index
            .all_with_spec()
            .unwrap()
            .into_iter()
            .map(|r| r.spec_code)
            .collect();
        assert_eq!(specs, vec!["W6", "M6"]);
    }

    #[test]
    fn test_insert_is_append_only() {
        let (_dir, index) = test_index();
        let rows = [record("a.xlsx", 1, "Bolt", "M6", Some(1.0))];
        index.insert(&rows).unwrap();
        index.insert(&rows).unwrap();
        assert_eq!(index.record_count().unwrap(), 2);
        assert_eq!(index.document_count().unwrap(), 1);
    }

    #[test]
    fn test_ingest_document_logs_entry() {
        let (_dir, index) = test_index();
        let doc = DocumentEntry {
            path: "a.xlsx".to_string(),
            checksum: "abc".to_string(),
            effective_timestamp: at(4),
        };
        let n = index
            .ingest_document(&doc, &[record("a.xlsx", 4, "Bolt", "M6", Some(1.0))])
            .unwrap();
        assert_eq!(n, 1);
        let logged: i64 = index
            .conn
            .query_row("SELECT record_count FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(logged, 1);
        assert_eq!(index.newest_timestamp().unwrap(), Some(at(4)));
    }

    #[test]
    fn test_records_without_item_name_are_not_stored() {
        let (_dir, index) = test_index();
        let doc = DocumentEntry {
            path: "a.xlsx".to_string(),
            checksum: "abc".to_string(),
            effective_timestamp: at(4),
        };
        let n = index
            .ingest_document(
                &doc,
                &[
                    record("a.xlsx", 4, " \u{00A0} ", "M6", Some(1.0)),
                    record("a.xlsx", 4, "Bolt", "M6", Some(2.0)),
                ],
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(index.insert(&[record("b.xlsx", 5, "", "M6", Some(3.0))]).unwrap(), 0);
        assert_eq!(index.record_count().unwrap(), 1);
        assert_eq!(index.by_spec("M6").unwrap().unwrap().item_name, "Bolt");
        let logged: i64 = index
            .conn
            .query_row("SELECT record_count FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(logged, 1);
    }

    #[test]
    fn test_empty_index() {
        let (_dir, index) = test_index();
        assert_eq!(index.document_count().unwrap(), 0);
        assert_eq!(index.newest_timestamp().unwrap(), None);
        assert!(index.by_name("Bolt").unwrap().is_none());
    }

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let a = encode_timestamp(&at(2));
        let b = encode_timestamp(&at(11));
        assert!(a < b);
        assert_eq!(decode_timestamp(&a, 0).unwrap(), at(2));
    }
}
