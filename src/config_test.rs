use std::convert::TryFrom;

use super::*;

#[test]
fn test_config_defaults() {
    let config = Config::new(std::env::temp_dir().as_os_str());
    assert_eq!(config.durability, Durability::Batched);
    assert_eq!(config.page_size, buffer::PAGE_SIZE);
    assert_eq!(config.compactor, "noop");
    assert!(config.is_searchable("anything"));
}

#[test]
fn test_config_from_toml() {
    let text = r#"
        dir = "/tmp/plinth-config-test"
        durability = "synceach"
        page_size = 4096
        searchable = ["name", "bio"]
        compactor = "mergesort"
    "#;
    let config = Config::try_from(text).unwrap();

    assert_eq!(config.durability, Durability::SyncEach);
    assert_eq!(config.page_size, 4096);
    assert_eq!(config.compactor, "mergesort");
    assert!(config.is_searchable("name"));
    assert!(!config.is_searchable("age"));

    assert!(config.to_buffer_dir().to_str().unwrap().ends_with("buffer"));
    assert!(config
        .to_segments_dir()
        .to_str()
        .unwrap()
        .ends_with("segments"));
}

#[test]
fn test_config_rejects() {
    let text = r#"
        dir = "/tmp/x"
        page_size = 16
    "#;
    assert!(Config::try_from(text).is_err());

    let text = r#"
        dir = "/tmp/x"
        compactor = "frobnicate"
    "#;
    assert!(Config::try_from(text).is_err());
}
