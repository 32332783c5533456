use std::fs;

use super::*;

#[test]
fn test_flusher() {
    let location = {
        let mut loc = std::env::temp_dir();
        loc.push("plinth-seg-flush-test");
        loc.push("flush.data");
        loc.into_os_string()
    };

    let mut flusher = Flusher::new(&location, 16).unwrap();
    assert_eq!(flusher.to_fpos(), Some(0));

    flusher.flush(b"hello".to_vec()).unwrap();
    flusher.flush(b" world".to_vec()).unwrap();
    assert_eq!(flusher.to_fpos(), Some(11));

    assert_eq!(flusher.close().unwrap(), 11);
    assert_eq!(fs::read(&location).unwrap(), b"hello world");
}

#[test]
fn test_flusher_empty() {
    let mut flusher = Flusher::empty();
    assert_eq!(flusher.to_fpos(), None);
    flusher.flush(b"ignored".to_vec()).unwrap();
    assert_eq!(flusher.close().unwrap(), 0);
}
