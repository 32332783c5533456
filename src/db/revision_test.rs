use super::*;

fn table_rev(record: u64, key: &str, value: &str, version: u64) -> Revision {
    Revision::Table {
        record: Identifier(record),
        key: Text::from_str(key),
        value: Value::from(value),
        version,
    }
}

#[test]
fn test_revision_roundtrip() {
    let revisions = vec![
        table_rev(1, "name", "jeff", 10),
        Revision::Index {
            key: Text::from_str("name"),
            value: Value::I64(42),
            record: Identifier(3),
            version: 11,
        },
        Revision::Corpus {
            key: Text::from_str("bio"),
            word: Text::from_str("engineer"),
            position: Position::new(Identifier(3), 7),
            version: 12,
        },
    ];

    for revision in revisions.into_iter() {
        let mut buf = vec![];
        let n = revision.encode(&mut buf).unwrap();
        assert_eq!(n, buf.len());

        let (out, m) = Revision::decode(revision.to_stream(), &buf).unwrap();
        assert_eq!(out, revision);
        assert_eq!(m, n);
    }
}

#[test]
fn test_revision_decode_rejects_truncation() {
    let revision = table_rev(1, "name", "jeff", 10);
    let mut buf = vec![];
    revision.encode(&mut buf).unwrap();

    for cut in [3, 7, buf.len() - 1].iter() {
        assert!(Revision::decode(Stream::Table, &buf[..*cut]).is_err());
    }
}

#[test]
fn test_revision_same_triple() {
    let a = table_rev(1, "name", "jeff", 10);
    let b = table_rev(1, "name", "jeff", 999);
    let c = table_rev(1, "name", "jeffery", 10);

    assert!(a.same_triple(&b));
    assert!(!a.same_triple(&c));

    // across streams, never the same triple.
    let d = Revision::Index {
        key: Text::from_str("name"),
        value: Value::from("jeff"),
        record: Identifier(1),
        version: 10,
    };
    assert!(!a.same_triple(&d));
}

#[test]
fn test_revision_sort_by_locator_then_version() {
    let mut revisions = vec![
        table_rev(2, "a", "x", 5),
        table_rev(1, "b", "x", 9),
        table_rev(1, "a", "x", 7),
        table_rev(1, "a", "x", 2),
    ];
    revisions.sort();

    assert_eq!(
        revisions,
        vec![
            table_rev(1, "a", "x", 2),
            table_rev(1, "a", "x", 7),
            table_rev(1, "b", "x", 9),
            table_rev(2, "a", "x", 5),
        ]
    );
}

#[test]
fn test_revision_fingerprints() {
    let a = table_rev(1, "name", "jeff", 10);
    let b = table_rev(1, "name", "jeff", 20);

    // versions do not participate in fingerprints.
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    assert_eq!(
        a.locator_key_fingerprint().unwrap(),
        b.locator_key_fingerprint().unwrap()
    );
    assert_eq!(
        a.locator_fingerprint().unwrap(),
        b.locator_fingerprint().unwrap()
    );

    // the three arities are distinct fingerprints.
    assert_ne!(a.fingerprint().unwrap(), a.locator_key_fingerprint().unwrap());
    assert_ne!(
        a.locator_key_fingerprint().unwrap(),
        a.locator_fingerprint().unwrap()
    );

    assert_eq!(a.locator_digest().unwrap(), b.locator_digest().unwrap());
}
