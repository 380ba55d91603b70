use std::path::PathBuf;

use spantree::settings::{read_settings, write_settings, Settings};

fn scratch_folder() -> PathBuf {
    let random_number: u64 = rand::random();
    std::env::temp_dir().join(format!("spantree_settings_test{random_number}"))
}

#[test]
fn test_missing_file_gives_defaults() {
    let path = scratch_folder().join("settings.json");
    assert_eq!(read_settings(&path).unwrap(), Settings::default());
}

#[test]
fn test_settings_survive_write_and_read() {
    let folder = scratch_folder();
    let path = folder.join("settings.json");
    let settings = Settings {
        log_level: "debug".to_string(),
        bar_width: 80,
        show_missing_spans: false,
        ..Settings::default()
    };

    write_settings(&folder, &path, &settings).unwrap();
    assert_eq!(read_settings(&path).unwrap(), settings);

    std::fs::remove_dir_all(&folder).unwrap();
}

#[test]
fn test_partial_file_is_completed_with_defaults() {
    let folder = scratch_folder();
    std::fs::create_dir_all(&folder).unwrap();
    let path = folder.join("settings.json");
    std::fs::write(&path, r#"{"V1": {"bar_width": 20}}"#).unwrap();

    let settings = read_settings(&path).unwrap();
    assert_eq!(settings.bar_width, 20);
    assert_eq!(settings.name_width, Settings::default().name_width);

    std::fs::write(&path, "{ broken").unwrap();
    assert!(read_settings(&path).is_err());

    std::fs::remove_dir_all(&folder).unwrap();
}
