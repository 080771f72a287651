use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use calamine::Reader;
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::error::{PricebookError, Result};
use crate::extractor::{extract_price_records, extract_request_records};
use crate::grid::Grid;
use crate::index::{DocumentEntry, SqliteIndex};
use crate::models::{PriceRecord, RequestRecord};
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Document filters
// ---------------------------------------------------------------------------

/// Filename predicate deciding which spreadsheets belong to a document kind.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    extensions: Vec<String>,
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}

impl DocumentFilter {
    pub fn new(include: &[String], exclude: &[String], extensions: &[String]) -> Self {
        Self {
            include: include.iter().map(|k| nfc(k)).collect(),
            exclude: exclude.iter().map(|k| nfc(k)).collect(),
            extensions: extensions.to_vec(),
        }
    }

    /// Quotations: a price keyword and no request keyword in the name.
    pub fn price_documents(settings: &Settings) -> Self {
        Self::new(&settings.price_keywords, &settings.request_keywords, &settings.extensions)
    }

    pub fn request_documents(settings: &Settings) -> Self {
        Self::new(&settings.request_keywords, &[], &settings.extensions)
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        // Office lock files
        if name.starts_with("~$") {
            return false;
        }
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        if !ext_ok {
            return false;
        }
        let name = nfc(name);
        self.include.iter().any(|k| name.contains(k.as_str()))
            && !self.exclude.iter().any(|k| name.contains(k.as_str()))
    }
}

/// Files under `root`, recursively, that satisfy `accept`, sorted by path.
pub fn discover(root: &Path, accept: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| accept(path))
        .collect();
    files.sort();
    files
}

// ---------------------------------------------------------------------------
// Workbook reading
// ---------------------------------------------------------------------------

fn workbook_error(path: &Path, e: impl std::fmt::Display) -> PricebookError {
    PricebookError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "reader panicked".to_string())
}

/// Every readable worksheet of an `.xls`/`.xlsx` file as `(sheet name, grid)`.
/// A sheet that cannot be read is logged and skipped; only a file that
/// cannot be opened at all is an error.
pub fn read_workbook(path: &Path) -> Result<Vec<(String, Grid)>> {
    // calamine panics on some corrupt archives instead of returning an error
    let mut workbook = catch_unwind(AssertUnwindSafe(|| calamine::open_workbook_auto(path)))
        .map_err(|payload| workbook_error(path, panic_message(payload)))?
        .map_err(|e| workbook_error(path, e))?;
    let names = workbook.sheet_names().to_owned();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        match catch_unwind(AssertUnwindSafe(|| workbook.worksheet_range(&name))) {
            Ok(Ok(range)) => sheets.push((name, Grid::from_range(&range))),
            Ok(Err(e)) => {
                warn!(document = %path.display(), sheet = %name, "skipping sheet: {e}");
            }
            Err(payload) => {
                let reason = panic_message(payload);
                warn!(document = %path.display(), sheet = %name, "skipping sheet: {reason}");
            }
        }
    }
    Ok(sheets)
}

/// Creation time where the platform records it, else modification time.
pub fn document_timestamp(path: &Path) -> Result<DateTime<Local>> {
    let meta = std::fs::metadata(path)?;
    let time = meta.created().or_else(|_| meta.modified())?;
    Ok(DateTime::<Local>::from(time))
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

pub fn parse_price_document(path: &Path) -> Result<Vec<PriceRecord>> {
    let effective_timestamp = document_timestamp(path)?;
    let source = path.display().to_string();
    let mut records = Vec::new();
    for (sheet, grid) in read_workbook(path)? {
        if grid.is_blank() {
            debug!(document = %source, sheet = %sheet, "empty sheet");
            continue;
        }
        let rows = extract_price_records(&grid, &source, &sheet, effective_timestamp);
        if rows.is_empty() {
            debug!(document = %source, sheet = %sheet, "no price table found");
        }
        records.extend(rows);
    }
    Ok(records)
}

pub fn parse_request_document(path: &Path) -> Result<Vec<RequestRecord>> {
    let source = path.display().to_string();
    let mut records = Vec::new();
    for (sheet, grid) in read_workbook(path)? {
        if grid.is_blank() {
            debug!(document = %source, sheet = %sheet, "empty sheet");
            continue;
        }
        let rows = extract_request_records(&grid, &source, &sheet);
        if rows.is_empty() {
            debug!(document = %source, sheet = %sheet, "no request table found");
        }
        records.extend(rows);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Batch operations
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub documents: usize,
    pub records: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Parse one quotation and append its records to the index.
pub fn ingest_price_document(index: &SqliteIndex, path: &Path) -> Result<usize> {
    let records = parse_price_document(path)?;
    let entry = DocumentEntry {
        path: path.display().to_string(),
        checksum: compute_checksum(path)?,
        effective_timestamp: document_timestamp(path)?,
    };
    index.ingest_document(&entry, &records)
}

/// Ingest every price document under `root`. A document that cannot be read
/// is reported in the summary and does not stop the rest.
pub fn build_index(
    index: &SqliteIndex,
    root: &Path,
    accept: impl Fn(&Path) -> bool,
) -> Result<IngestSummary> {
    let files = discover(root, accept);
    if files.is_empty() {
        return Err(PricebookError::NoDocuments {
            kind: "price",
            root: root.to_path_buf(),
        });
    }
    let mut summary = IngestSummary::default();
    for path in files {
        match ingest_price_document(index, &path) {
            Ok(n) => {
                info!(document = %path.display(), records = n, "ingested");
                summary.documents += 1;
                summary.records += n;
            }
            Err(e) => {
                warn!(document = %path.display(), "skipping document: {e}");
                summary.failed.push((path, e.to_string()));
            }
        }
    }
    Ok(summary)
}

#[derive(Debug, Default)]
pub struct RequestBatch {
    pub documents: usize,
    pub records: Vec<RequestRecord>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Request lines from a single file, or from every request document in a
/// folder. A single file that cannot be read is an error; inside a folder
/// it is skipped and reported.
pub fn load_requests(path: &Path, accept: impl Fn(&Path) -> bool) -> Result<RequestBatch> {
    if !path.is_dir() {
        let records = parse_request_document(path)?;
        return Ok(RequestBatch {
            documents: 1,
            records,
            failed: Vec::new(),
        });
    }
    let files = discover(path, accept);
    if files.is_empty() {
        return Err(PricebookError::NoDocuments {
            kind: "request",
            root: path.to_path_buf(),
        });
    }
    let mut batch = RequestBatch::default();
    for file in files {
        match parse_request_document(&file) {
            Ok(records) => {
                info!(document = %file.display(), records = records.len(), "parsed");
                batch.documents += 1;
                batch.records.extend(records);
            }
            Err(e) => {
                warn!(document = %file.display(), "skipping document: {e}");
                batch.failed.push((file, e.to_string()));
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PriceIndex;

    fn write_xlsx(path: &Path, sheets: &[(&str, &[&[&str]])]) {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        for (name, rows) in sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(*name).unwrap();
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    match value.parse::<f64>() {
                        Ok(n) => sheet.write_number(r as u32, c as u16, n).unwrap(),
                        Err(_) => sheet.write_string(r as u32, c as u16, *value).unwrap(),
                    };
                }
            }
        }
        workbook.save(path).unwrap();
    }

    /// Rewrite one member of a saved workbook archive in place.
    fn rewrite_entry(path: &Path, entry: &str, edit: impl Fn(String) -> String) {
        use std::io::{Read, Write};
        let bytes = std::fs::read(path).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let name = file.name().to_string();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            if name == entry {
                content = edit(String::from_utf8(content).unwrap()).into_bytes();
            }
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(&content).unwrap();
        }
        writer.finish().unwrap();
    }

    const EMPTY_SHEET: &[&[&str]] = &[];

    const PRICE_SHEET: &[&[&str]] = &[
        &["견 적 서"],
        &[],
        &["", "번호", "품명", "규격", "단위", "수량", "단가", "금액"],
        &["", "1", "볼트", "SS304-10MM", "EA", "10", "120", "1200"],
        &["", "2", "너트", "M6", "EA", "5", "", ""],
        &[],
        &[],
        &["", "", "부가세 별도"],
    ];

    const REQUEST_SHEET: &[&[&str]] = &[
        &["견적의뢰서"],
        &["품명", "규격", "제조사", "단위", "수량"],
        &["볼트", "SS304-10MM", "대한", "EA", "3"],
        &["와셔", "", "", "EA", "2"],
    ];

    fn test_index(dir: &Path) -> SqliteIndex {
        SqliteIndex::open(&dir.join("test.db")).unwrap()
    }

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_price_filter() {
        let filter = DocumentFilter::price_documents(&settings());
        assert!(filter.matches(Path::new("/db/2024 견적서 A.xlsx")));
        assert!(filter.matches(Path::new("/db/견적서.XLS")));
        assert!(!filter.matches(Path::new("/db/~$견적서.xlsx")));
        assert!(!filter.matches(Path::new("/db/견적서.csv")));
        assert!(!filter.matches(Path::new("/db/견적의뢰서.xlsx")));
        assert!(!filter.matches(Path::new("/db/견적요청 견적서.xlsx")));
        assert!(!filter.matches(Path::new("/db/발주서.xlsx")));
    }

    #[test]
    fn test_request_filter() {
        let filter = DocumentFilter::request_documents(&settings());
        assert!(filter.matches(Path::new("견적의뢰서_0312.xlsx")));
        assert!(filter.matches(Path::new("견적요청.xls")));
        assert!(!filter.matches(Path::new("견적서.xlsx")));
    }

    #[test]
    fn test_filter_normalizes_decomposed_names() {
        let decomposed: String = "견적서.xlsx".nfd().collect();
        let filter = DocumentFilter::price_documents(&settings());
        assert!(filter.matches(Path::new(&decomposed)));
    }

    #[test]
    fn test_discover_walks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2024").join("03");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("견적서_b.xlsx"), b"x").unwrap();
        std::fs::write(dir.path().join("견적서_a.xlsx"), b"x").unwrap();
        std::fs::write(dir.path().join("메모.txt"), b"x").unwrap();
        let filter = DocumentFilter::price_documents(&settings());
        let found = discover(dir.path(), |p| filter.matches(p));
        assert_eq!(found.len(), 2);
        assert!(found[0] < found[1]);
    }

    #[test]
    fn test_parse_price_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("견적서.xlsx");
        write_xlsx(&path, &[("표지", EMPTY_SHEET), ("견적", PRICE_SHEET)]);
        let records = parse_price_document(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].item_name, "볼트");
        assert_eq!(records[0].source_section, "견적");
        assert_eq!(records[0].unit_price, Some(120.0));
        assert_eq!(records[1].unit_price, None);
        assert_eq!(records[0].effective_timestamp, records[1].effective_timestamp);
        assert_eq!(records[0].source_document, path.display().to_string());
    }

    #[test]
    fn test_parse_request_document_with_quantity_synonym() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("견적의뢰서.xlsx");
        write_xlsx(&path, &[("Sheet1", REQUEST_SHEET)]);
        let requests = parse_request_document(&path).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].manufacturer, "대한");
        assert_eq!(requests[0].purchase_quantity, Some(3.0));
        assert_eq!(requests[1].spec_code, "");
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("견적서.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();
        let err = parse_price_document(&path).unwrap_err();
        assert!(matches!(err, PricebookError::Workbook { .. }));
    }

    #[test]
    fn test_truncated_sheet_keeps_sibling_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("견적서.xlsx");
        write_xlsx(&path, &[("견적", PRICE_SHEET), ("깨짐", PRICE_SHEET)]);
        rewrite_entry(&path, "xl/worksheets/sheet2.xml", |xml| {
            let cut = xml.find("</sheetData>").unwrap();
            xml[..cut].to_string()
        });
        let records = parse_price_document(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source_section == "견적"));
    }

    #[test]
    fn test_bad_shared_string_index_skips_only_that_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("견적서.xlsx");
        write_xlsx(&path, &[("견적", PRICE_SHEET), ("깨짐", PRICE_SHEET)]);
        rewrite_entry(&path, "xl/worksheets/sheet2.xml", |xml| {
            xml.replace("t=\"s\"><v>", "t=\"s\"><v>999")
        });
        let records = parse_price_document(&path).unwrap();
        assert!(records.len() >= 2);
        assert!(records
            .iter()
            .filter(|r| r.source_section == "견적")
            .any(|r| r.item_name == "볼트"));
    }

    #[test]
    fn test_build_index_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("db");
        std::fs::create_dir_all(&docs).unwrap();
        write_xlsx(&docs.join("견적서_1.xlsx"), &[("견적", PRICE_SHEET)]);
        std::fs::write(docs.join("견적서_2.xlsx"), b"corrupt").unwrap();
        write_xlsx(&docs.join("견적의뢰서.xlsx"), &[("Sheet1", REQUEST_SHEET)]);
        let index = test_index(dir.path());
        let filter = DocumentFilter::price_documents(&settings());
        let summary = build_index(&index, &docs, |p| filter.matches(p)).unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].0.ends_with("견적서_2.xlsx"));
        assert_eq!(index.document_count().unwrap(), 1);
        assert!(index.exact("볼트", "SS304-10MM").unwrap().is_some());
    }

    #[test]
    fn test_build_index_reingest_appends() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("db");
        std::fs::create_dir_all(&docs).unwrap();
        write_xlsx(&docs.join("견적서.xlsx"), &[("견적", PRICE_SHEET)]);
        let index = test_index(dir.path());
        let filter = DocumentFilter::price_documents(&settings());
        build_index(&index, &docs, |p| filter.matches(p)).unwrap();
        build_index(&index, &docs, |p| filter.matches(p)).unwrap();
        assert_eq!(index.record_count().unwrap(), 4);
    }

    #[test]
    fn test_build_index_without_documents() {
        let dir = tempfile::tempdir().unwrap();
        let index = test_index(dir.path());
        let filter = DocumentFilter::price_documents(&settings());
        let err = build_index(&index, dir.path(), |p| filter.matches(p)).unwrap_err();
        assert!(matches!(err, PricebookError::NoDocuments { kind: "price", .. }));
    }

    #[test]
    fn test_load_requests_from_folder_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("견적의뢰서.xlsx");
        write_xlsx(&file, &[("Sheet1", REQUEST_SHEET)]);
        std::fs::write(dir.path().join("견적요청_broken.xlsx"), b"junk").unwrap();
        write_xlsx(&dir.path().join("견적서.xlsx"), &[("견적", PRICE_SHEET)]);
        let filter = DocumentFilter::request_documents(&settings());

        let batch = load_requests(dir.path(), |p| filter.matches(p)).unwrap();
        assert_eq!(batch.documents, 1);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.failed.len(), 1);

        let single = load_requests(&file, |p| filter.matches(p)).unwrap();
        assert_eq!(single.records.len(), 2);
    }

    #[test]
    fn test_load_requests_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let filter = DocumentFilter::request_documents(&settings());
        let err = load_requests(dir.path(), |p| filter.matches(p)).unwrap_err();
        assert!(matches!(err, PricebookError::NoDocuments { kind: "request", .. }));
    }
}
