pub mod ingest;
pub mod init;
pub mod parse;
pub mod resolve;
pub mod status;

use clap::{ArgAction, Parser, Subcommand};

use crate::error::Result;
use crate::index::SqliteIndex;
use crate::settings::db_path;

pub(crate) fn open_index(db: Option<&str>) -> Result<SqliteIndex> {
    SqliteIndex::open(&db_path(db))
}

#[derive(Parser)]
#[command(
    name = "pricebook",
    about = "Price purchase requests from the most recent matching quotations."
)]
pub struct Cli {
    /// Price index database (default: <data_dir>/pricebook.db)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Log more (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and create an empty price index.
    Init {
        /// Path for pricebook data (default: ~/Documents/pricebook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Add every quotation found under a folder to the price index.
    Ingest {
        /// Folder searched recursively for quotation spreadsheets
        folder: String,
    },
    /// Show the request lines extracted from a file or folder.
    Parse {
        /// Request spreadsheet, or folder of request spreadsheets
        path: String,
    },
    /// Resolve a price for every request line.
    Match {
        /// Request spreadsheet, or folder of request spreadsheets
        path: String,
        /// Manual price for a line: IDX=PRICE, or IDX=clear
        #[arg(long = "set")]
        set: Vec<String>,
        /// JSON file of manual prices: {"3": 1200, "5": null}
        #[arg(long)]
        overrides: Option<String>,
        /// Write results as CSV to this path
        #[arg(long)]
        output: Option<String>,
        /// Print results as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the price index location and contents.
    Status,
}
