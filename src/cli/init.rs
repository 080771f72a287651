use std::path::PathBuf;

use crate::cli::open_index;
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>, db: Option<&str>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;

    let index = open_index(db)?;
    println!("Initialized pricebook at {}", resolved.display());
    println!("Price index: {}", index.path().display());
    Ok(())
}
