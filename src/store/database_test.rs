use super::*;
use crate::db::Action;

fn open_db(name: &str) -> Database {
    let mut dir = std::env::temp_dir();
    dir.push("plinth-database-test");
    dir.push(name);
    std::fs::remove_dir_all(&dir).ok();
    Database::open(&crate::Config::new(dir.as_os_str())).unwrap()
}

fn put(db: &Database, writes: &[Write]) {
    let receipts = {
        let mut guard = db.storage().lock().write();
        db.absorb(&mut guard, writes).unwrap()
    };
    db.apply_receipts(&receipts).unwrap();
}

fn write(key: &str, value: Value, record: u64, version: u64) -> Write {
    Write::new(
        Text::from_str(key),
        value,
        Identifier(record),
        version,
        Action::Add,
    )
}

fn ids(records: &[u64]) -> BTreeSet<Identifier> {
    records.iter().map(|r| Identifier(*r)).collect()
}

#[test]
fn test_verify_parity() {
    let db = open_db("verify");
    let (key, value) = (Text::from_str("name"), Value::from("jeff"));

    put(&db, &[write("name", value.clone(), 1, 10)]);
    assert!(db.verify(&key, &value, Identifier(1), NOW).unwrap());

    // an equal revision flips parity to absent; a third flips it back.
    put(&db, &[write("name", value.clone(), 1, 20)]);
    assert!(!db.verify(&key, &value, Identifier(1), NOW).unwrap());
    put(&db, &[write("name", value.clone(), 1, 30)]);
    assert!(db.verify(&key, &value, Identifier(1), NOW).unwrap());

    // point-in-time reads honour the version ceiling.
    assert!(db.verify(&key, &value, Identifier(1), 15).unwrap());
    assert!(!db.verify(&key, &value, Identifier(1), 25).unwrap());
    assert!(!db.verify(&key, &value, Identifier(1), 5).unwrap());

    assert!(!db.verify(&key, &value, Identifier(2), NOW).unwrap());
}

#[test]
fn test_select_and_browse() {
    let db = open_db("select");
    put(
        &db,
        &[
            write("name", Value::from("jeff"), 1, 10),
            write("age", Value::I64(30), 1, 11),
            write("age", Value::I64(31), 1, 12),
            write("name", Value::from("ashleah"), 2, 13),
            write("age", Value::I64(30), 2, 14),
        ],
    );

    let record = db.select(Identifier(1), NOW).unwrap();
    assert_eq!(record.len(), 2);
    assert_eq!(
        record[&Text::from_str("age")],
        [Value::I64(30), Value::I64(31)].iter().cloned().collect()
    );

    let values = db.select_key(&Text::from_str("age"), Identifier(1), NOW).unwrap();
    assert_eq!(values.len(), 2);
    // cached path answers the same.
    let values2 = db.select_key(&Text::from_str("age"), Identifier(1), NOW).unwrap();
    assert_eq!(values, values2);

    let browse = db.browse(&Text::from_str("age"), NOW).unwrap();
    assert_eq!(browse[&Value::I64(30)], ids(&[1, 2]));
    assert_eq!(browse[&Value::I64(31)], ids(&[1]));

    // unknown keys and records answer empty, not an error.
    assert!(db.select(Identifier(42), NOW).unwrap().is_empty());
    assert!(db.browse(&Text::from_str("nope"), NOW).unwrap().is_empty());
}

#[test]
fn test_find_operators() {
    let db = open_db("find");
    put(
        &db,
        &[
            write("age", Value::I64(25), 1, 10),
            write("age", Value::I64(30), 2, 11),
            write("age", Value::I64(35), 3, 12),
            write("name", Value::from("jeff"), 1, 13),
        ],
    );

    let key = Text::from_str("age");
    assert_eq!(
        db.find(&key, Operator::Eq, &[Value::I64(30)], NOW).unwrap(),
        ids(&[2])
    );
    assert_eq!(
        db.find(&key, Operator::Gt, &[Value::I64(25)], NOW).unwrap(),
        ids(&[2, 3])
    );
    assert_eq!(
        db.find(&key, Operator::Lte, &[Value::I64(30)], NOW).unwrap(),
        ids(&[1, 2])
    );
    let between = Operator::Between {
        low_inclusive: true,
        high_inclusive: false,
    };
    assert_eq!(
        db.find(&key, between, &[Value::I64(25), Value::I64(35)], NOW).unwrap(),
        ids(&[1, 2])
    );
    assert_eq!(
        db.find(&Text::from_str("name"), Operator::Like, &[Value::from("je%")], NOW)
            .unwrap(),
        ids(&[1])
    );
}

#[test]
fn test_search_prefix_survives_remove() {
    let db = open_db("search");
    let key = Text::from_str("name");

    put(
        &db,
        &[
            write("name", Value::from("jeff"), 1, 10),
            write("name", Value::from("jeffery"), 1, 11),
        ],
    );
    assert_eq!(db.search(&key, "jeff", NOW).unwrap(), ids(&[1]));

    // removing "jeff" leaves "jeffery", still a match for the query.
    put(
        &db,
        &[Write::new(
            key.clone(),
            Value::from("jeff"),
            Identifier(1),
            12,
            Action::Remove,
        )],
    );
    assert!(!db.verify(&key, &Value::from("jeff"), Identifier(1), NOW).unwrap());
    assert_eq!(db.search(&key, "jeff", NOW).unwrap(), ids(&[1]));

    // removing "jeffery" too clears the query.
    put(
        &db,
        &[Write::new(
            key.clone(),
            Value::from("jeffery"),
            Identifier(1),
            13,
            Action::Remove,
        )],
    );
    assert_eq!(db.search(&key, "jeff", NOW).unwrap(), ids(&[]));
}

#[test]
fn test_seg0_rolls_at_limit() {
    let mut dir = std::env::temp_dir();
    dir.push("plinth-database-test");
    dir.push("roll");
    std::fs::remove_dir_all(&dir).ok();
    let mut db = Database::open(&crate::Config::new(dir.as_os_str())).unwrap();
    db.set_seg0_limit(2048);

    for i in 0..100_u64 {
        put(&db, &[write("name", Value::from("somebody"), i, i + 1)]);
    }

    {
        let guard = db.storage().lock().read();
        assert!(guard.len() > 1, "{} segments", guard.len());
        // the mutable segment is always the tail, and only the tail.
        for segment in guard[..guard.len() - 1].iter() {
            assert!(!segment.is_mutable());
        }
        assert!(guard.last().unwrap().is_mutable());
    }

    // everything is still visible across the rolled segments.
    for i in 0..100_u64 {
        assert!(db
            .verify(&Text::from_str("name"), &Value::from("somebody"), Identifier(i), NOW)
            .unwrap());
    }
}

#[test]
fn test_repair_drops_duplicate_transport() {
    let db = open_db("repair");

    // a crash between seg0 persistence and page delete leaves the same
    // writes captured in two sealed segments.
    let writes: Vec<Write> = (0..10_u64)
        .map(|i| write("city", Value::from("kochi"), i, 100 + i))
        .collect();

    {
        let mut guard = db.storage().lock().write();
        for _copy in 0..2 {
            let segment = db.storage().new_segment().unwrap();
            for w in writes.iter() {
                segment.acquire(w, true).unwrap();
            }
            db.storage().transfer(&segment).unwrap();
            let at = guard.len() - 1; // before seg0
            guard.insert(at, segment);
        }
    }

    // duplicated parity reads as absent; repair reconciles it.
    let key = Text::from_str("city");
    assert!(!db.verify(&key, &Value::from("kochi"), Identifier(0), NOW).unwrap());

    let reconciled = db.repair().unwrap();
    assert_eq!(reconciled, 1);
    for i in 0..10_u64 {
        assert!(db.verify(&key, &Value::from("kochi"), Identifier(i), NOW).unwrap());
    }

    // the live list no longer intersects pairwise.
    let guard = db.storage().lock().read();
    for i in 0..guard.len() {
        for j in (i + 1)..guard.len() {
            assert!(!guard[i].intersects(&guard[j]).unwrap());
        }
    }
}

#[test]
fn test_restart_reloads_segments() {
    let mut dir = std::env::temp_dir();
    dir.push("plinth-database-test");
    dir.push("restart");
    std::fs::remove_dir_all(&dir).ok();
    let config = crate::Config::new(dir.as_os_str());

    {
        let db = Database::open(&config).unwrap();
        put(&db, &[write("name", Value::from("jeff"), 1, 10)]);
    }

    let db = Database::open(&config).unwrap();
    assert!(db
        .verify(&Text::from_str("name"), &Value::from("jeff"), Identifier(1), NOW)
        .unwrap());

    // corpus revisions survive the restart too.
    assert_eq!(db.search(&Text::from_str("name"), "jeff", NOW).unwrap(), ids(&[1]));
}
