use std::fs;

use super::*;
use crate::db::{Action, Composite, Identifier, Text, Value};

fn temp_dir(name: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("plinth-seg-test");
    dir.push(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn locations(dir: &std::path::Path, name: &str) -> (ffi::OsString, ffi::OsString) {
    let seg = dir.join(format!("{}.seg", name)).into_os_string();
    let blm = dir.join(format!("{}.blm", name)).into_os_string();
    (seg, blm)
}

fn sample_write(record: u64, key: &str, value: &str, version: u64) -> Write {
    Write::new(
        Text::from_str(key),
        Value::from(value),
        Identifier(record),
        version,
        Action::Add,
    )
}

#[test]
fn test_mutable_acquire_and_read() {
    let dir = temp_dir("mutable");
    let (_seg_loc, blm_loc) = locations(&dir, "m1");

    let segment = Segment::new_mutable("m1", &blm_loc).unwrap();
    assert!(segment.is_mutable());

    let w1 = sample_write(1, "name", "jeff", 10);
    let receipt = segment.acquire(&w1, true).unwrap();
    assert_eq!(receipt.revisions.len(), 3); // table + index + 1 corpus word
    segment.acquire(&sample_write(2, "name", "ashleah", 11), true).unwrap();

    assert_eq!(segment.to_version_range(), (10, 11));

    // bloom answers for all three fingerprint arities.
    let fp = w1.fingerprint().unwrap();
    assert!(segment.might_contain(&fp.to_bytes()).unwrap());
    let lk = Composite::of2(&Identifier(1), &Text::from_str("name")).unwrap();
    assert!(segment.might_contain(&lk.to_bytes()).unwrap());
    let l = Composite::of(&Identifier(1)).unwrap();
    assert!(segment.might_contain(&l.to_bytes()).unwrap());

    // locator reads on the in-memory streams.
    let digest = receipt.revisions[0].locator_digest().unwrap();
    let revisions = segment.read_locator(db::Stream::Table, digest).unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0], receipt.revisions[0]);
}

#[test]
fn test_transfer_then_read_sealed() {
    let dir = temp_dir("transfer");
    let (seg_loc, blm_loc) = locations(&dir, "t1");

    let segment = Segment::new_mutable("t1", &blm_loc).unwrap();
    let mut receipts = vec![];
    for i in 0..50_u64 {
        let write = sample_write(i % 10, "name", &format!("user-{}", i), 100 + i);
        receipts.push(segment.acquire(&write, true).unwrap());
    }

    segment.transfer(&seg_loc).unwrap();
    assert!(!segment.is_mutable());
    assert_eq!(segment.to_version_range(), (100, 149));

    // acquire after seal is refused.
    assert!(segment.acquire(&sample_write(1, "k", "v", 1), false).is_err());

    // every write is still visible through the on-disk form.
    for receipt in receipts.iter() {
        let fp = receipt.write.fingerprint().unwrap();
        assert!(segment.might_contain(&fp.to_bytes()).unwrap());

        let digest = receipt.revisions[0].locator_digest().unwrap();
        let revisions = segment.read_locator(db::Stream::Table, digest).unwrap();
        assert!(revisions.contains(&receipt.revisions[0]));
    }

    // streams come back sorted.
    let table = segment.read_stream(db::Stream::Table).unwrap();
    assert_eq!(table.len(), 50);
    for pair in table.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn test_sealed_reopen_byte_identical() {
    let dir = temp_dir("reopen");
    let (seg_loc, blm_loc) = locations(&dir, "r1");

    let segment = Segment::new_mutable("r1", &blm_loc).unwrap();
    for i in 0..20_u64 {
        segment.acquire(&sample_write(i, "city", &format!("c{}", i), i + 1), true).unwrap();
    }

    // a save snapshot, then the seal; the seal rewrites the same bytes.
    segment.save(&seg_loc).unwrap();
    let saved = fs::read(&seg_loc).unwrap();
    segment.transfer(&seg_loc).unwrap();
    let sealed = fs::read(&seg_loc).unwrap();
    let crc32 = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    assert_eq!(crc32.checksum(&saved), crc32.checksum(&sealed));
    assert_eq!(saved, sealed);

    let reopened = Segment::open("r1", &seg_loc).unwrap();
    assert_eq!(reopened.to_version_range(), segment.to_version_range());
    assert_eq!(reopened.len_revisions(), segment.len_revisions());

    let a = reopened.read_stream(db::Stream::Table).unwrap();
    let b = segment.read_stream(db::Stream::Table).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_intersects_and_similarity() {
    let dir = temp_dir("similarity");

    let (_seg_a, blm_a) = locations(&dir, "a");
    let a = Segment::new_mutable("a", &blm_a).unwrap();
    let (_seg_b, blm_b) = locations(&dir, "b");
    let b = Segment::new_mutable("b", &blm_b).unwrap();

    for i in 0..10_u64 {
        let write = sample_write(i, "name", &format!("u{}", i), i + 1);
        a.acquire(&write, false).unwrap();
        if i < 6 {
            // same triples, later versions: same fingerprints, but not
            // shared revisions.
            let write = sample_write(i, "name", &format!("u{}", i), 100 + i);
            b.acquire(&write, false).unwrap();
        }
    }

    // 6 of 10 fingerprints shared -> jaccard 60.
    assert_eq!(a.similarity_with(&b).unwrap(), 60);
    assert!(!a.intersects(&b).unwrap());

    // a shared revision (identical version) makes them intersect.
    let dup = sample_write(0, "name", "u0", 1);
    b.acquire(&dup, false).unwrap();
    assert!(a.intersects(&b).unwrap());
}

#[test]
fn test_open_rejects_bad_magic() {
    let dir = temp_dir("badmagic");
    let loc = dir.join("bad.seg").into_os_string();
    fs::write(&loc, vec![0_u8; HEADER_SIZE]).unwrap();
    assert!(Segment::open("bad", &loc).is_err());

    // truncated header.
    fs::write(&loc, vec![0_u8; 10]).unwrap();
    assert!(Segment::open("bad", &loc).is_err());
}
