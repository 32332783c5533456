use std::fs;

use super::*;
use crate::db::{Action, Identifier, Text, Value};

fn temp_dir(name: &str) -> ffi::OsString {
    let mut dir = std::env::temp_dir();
    dir.push("plinth-page-test");
    dir.push(name);
    fs::remove_dir_all(&dir).ok();
    dir.into_os_string()
}

fn sample_write(record: u64, version: u64) -> Write {
    Write::new(
        Text::from_str("name"),
        Value::from("someone"),
        Identifier(record),
        version,
        Action::Add,
    )
}

#[test]
fn test_page_append_and_reload() {
    let dir = temp_dir("reload");
    let mut page = Page::create(&dir, 7).unwrap();
    assert_eq!(page.to_id(), 7);
    assert!(page.is_empty());

    for i in 0..10_u64 {
        page.append(&sample_write(i, 100 + i), i % 2 == 0).unwrap();
    }
    page.sync().unwrap();
    assert_eq!(page.len(), 10);

    let location = page.to_location();
    std::mem::drop(page);

    let page = Page::load(&location).unwrap();
    assert_eq!(page.to_id(), 7);
    assert_eq!(page.len(), 10);
    assert_eq!(page.as_writes()[3], sample_write(3, 103));

    let sorted = page.to_sorted_writes();
    for pair in sorted.windows(2) {
        assert!(pair[0].version < pair[1].version);
    }
}

#[test]
fn test_page_sorted_view_bridges_late_arrivals() {
    let dir = temp_dir("bridge");
    let mut page = Page::create(&dir, 0).unwrap();

    // an out-of-order version, as a batch replay might produce.
    for version in [10_u64, 20, 15, 30].iter() {
        page.append(&sample_write(1, *version), false).unwrap();
    }

    let versions: Vec<u64> = page.to_sorted_writes().iter().map(|w| w.version).collect();
    assert_eq!(versions, vec![10, 15, 20, 30]);
    // insertion order is preserved separately.
    let versions: Vec<u64> = page.as_writes().iter().map(|w| w.version).collect();
    assert_eq!(versions, vec![10, 20, 15, 30]);
}

#[test]
fn test_page_reload_drops_torn_tail() {
    let dir = temp_dir("torn");
    let mut page = Page::create(&dir, 0).unwrap();
    for i in 0..5_u64 {
        page.append(&sample_write(i, i + 1), false).unwrap();
    }
    page.sync().unwrap();
    let location = page.to_location();
    std::mem::drop(page);

    // a torn append: half a write record at the tail.
    {
        let mut fd = crate::util::open_file_a(&location).unwrap();
        crate::util::sync_write(&mut fd, &[9_u8, 0, 0, 0, 1, 2]).unwrap();
    }

    let page = Page::load(&location).unwrap();
    assert_eq!(page.len(), 5);

    // the tail was truncated away; appends keep working after reload.
    let mut page = page;
    page.append(&sample_write(9, 100), true).unwrap();
    assert_eq!(page.len(), 6);
}

#[test]
fn test_page_load_rejects_bad_header() {
    let dir = temp_dir("badheader");
    let page = Page::create(&dir, 3).unwrap();
    let location = page.to_location();
    std::mem::drop(page);

    fs::write(&location, b"garbage").unwrap();
    assert!(Page::load(&location).is_err());

    fs::write(&location, vec![0_u8; PAGE_HEADER_SIZE]).unwrap();
    assert!(Page::load(&location).is_err());
}
