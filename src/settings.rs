use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PricebookError, Result};

pub const DB_FILE: &str = "pricebook.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Filename fragments that mark a price-history quotation.
    #[serde(default = "default_price_keywords")]
    pub price_keywords: Vec<String>,
    /// Filename fragments that mark a purchase request.
    #[serde(default = "default_request_keywords")]
    pub request_keywords: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_price_keywords() -> Vec<String> {
    vec!["견적서".to_string()]
}

fn default_request_keywords() -> Vec<String> {
    vec!["견적의뢰".to_string(), "견적요청".to_string()]
}

fn default_extensions() -> Vec<String> {
    vec!["xls".to_string(), "xlsx".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            price_keywords: default_price_keywords(),
            request_keywords: default_request_keywords(),
            extensions: default_extensions(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("pricebook")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("pricebook")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("ignoring unreadable settings at {}: {e}", path.display());
                Settings::default()
            }
        }
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| PricebookError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

/// Database path: the `--db` override if given, else `<data_dir>/pricebook.db`.
pub fn db_path(db_override: Option<&str>) -> PathBuf {
    match db_override {
        Some(path) => PathBuf::from(shellexpand_path(path)),
        None => get_data_dir().join(DB_FILE),
    }
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
