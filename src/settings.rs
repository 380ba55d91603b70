use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Settings stored between runs.
/// If the data structure changes, it should be versioned to maintain compatibility with files
/// saved by older versions of spantree.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum PersistentSettings {
    V1(SettingsV1),
}

impl Default for PersistentSettings {
    fn default() -> Self {
        PersistentSettings::V1(SettingsV1::default())
    }
}

impl From<PersistentSettings> for Settings {
    fn from(persistent: PersistentSettings) -> Self {
        match persistent {
            PersistentSettings::V1(settings) => settings,
        }
    }
}

pub type Settings = SettingsV1;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SettingsV1 {
    /// Log filter used when `RUST_LOG` isn't set.
    pub log_level: String,
    /// Number of characters used for the bar column of the text waterfall.
    pub bar_width: usize,
    /// Number of characters used for the (indented) span name column.
    pub name_width: usize,
    pub show_missing_spans: bool,
    pub show_timestamps: bool,
}

impl Default for SettingsV1 {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            bar_width: 60,
            name_width: 48,
            show_missing_spans: true,
            show_timestamps: false,
        }
    }
}

pub fn load_settings() -> Result<Settings> {
    let Some(path) = settings_file_path() else {
        debug!("No settings directory on this platform, using default settings");
        return Ok(Settings::default());
    };
    read_settings(&path)
}

pub fn save_settings(settings: &Settings) -> Result<PathBuf> {
    let folder = settings_folder().context("No settings directory on this platform")?;
    let path = folder.join(SETTINGS_FILE_NAME);
    write_settings(&folder, &path, settings)?;
    Ok(path)
}

pub fn read_settings(path: &Path) -> Result<Settings> {
    debug!(path = %path.display(), "reading settings");
    if !path.try_exists()? {
        debug!("Settings file not found, using default settings");
        return Ok(Settings::default());
    }
    let file = std::fs::File::open(path)?;
    let data: PersistentSettings = serde_json::from_reader(file)
        .with_context(|| format!("Invalid settings file {}", path.display()))?;
    Ok(data.into())
}

pub fn write_settings(folder: &Path, path: &Path, settings: &Settings) -> Result<()> {
    info!(path = %path.display(), "writing settings");

    // Create the directory if it doesn't exist
    std::fs::create_dir_all(folder)?;

    // First write the data to a temporary file
    let write_file_path = temporary_write_file_path(folder);
    let mut file = std::fs::File::create(&write_file_path)?;
    serde_json::to_writer_pretty(&mut file, &PersistentSettings::V1(settings.clone()))?;
    file.sync_all()?;

    // Then move the temporary file to the final location
    // Makes things more robust against crashes
    std::fs::rename(&write_file_path, path)?;

    Ok(())
}

const SETTINGS_FILE_NAME: &str = "settings.json";

fn settings_folder() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "opentelemetry", "spantree")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn settings_file_path() -> Option<PathBuf> {
    settings_folder().map(|folder| folder.join(SETTINGS_FILE_NAME))
}

fn temporary_write_file_path(folder: &Path) -> PathBuf {
    let random_number: u64 = rand::random();
    folder.join(format!("temporary_settings{}.json", random_number))
}
