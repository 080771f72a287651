use crate::error::Result;
use crate::index::{PriceIndex, SqliteIndex};
use crate::settings::{db_path, load_settings};

pub fn run(db: Option<&str>) -> Result<()> {
    let settings = load_settings();
    let db_path = db_path(db);

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let index = SqliteIndex::open(&db_path)?;
        let newest = index
            .newest_timestamp()?
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!();
        println!("Documents:  {}", index.document_count()?);
        println!("Records:    {}", index.record_count()?);
        println!("Newest:     {newest}");
    } else {
        println!();
        println!("Database not found. Run `pricebook init` to set up.");
    }

    Ok(())
}
