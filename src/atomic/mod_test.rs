use super::*;
use crate::{db::Value, store::Store, Config};

fn open_store(name: &str) -> Store {
    let mut dir = std::env::temp_dir();
    dir.push("plinth-atomic-test");
    dir.push(name);
    std::fs::remove_dir_all(&dir).ok();
    Store::open(Config::new(dir.as_os_str())).unwrap()
}

#[test]
fn test_commit_then_finish() {
    let store = open_store("commit");
    let (key, value) = (Text::from_str("name"), Value::from("jeff"));

    let mut op = AtomicOperation::new(&store);
    op.add(key.clone(), value.clone(), Identifier(1)).unwrap();
    op.add(Text::from_str("age"), Value::I64(30), Identifier(1)).unwrap();

    assert!(matches!(op.commit(), Outcome::Ok));
    // locked between commit and finish, not yet applied.
    assert_eq!(store.locks().len(), 2);
    assert!(!store.verify(&key, &value, Identifier(1), NOW).unwrap());

    let versions = op.finish().unwrap();
    assert_eq!(versions.len(), 2);
    assert!(versions[0] < versions[1]);
    assert!(store.locks().is_empty());
    assert!(store.verify(&key, &value, Identifier(1), NOW).unwrap());

    std::mem::drop(op);
    store.close().unwrap();
}

#[test]
fn test_lock_conflict() {
    let store = open_store("conflict");
    let (key, value) = (Text::from_str("name"), Value::from("jeff"));

    let mut op1 = AtomicOperation::new(&store);
    op1.add(key.clone(), value.clone(), Identifier(1)).unwrap();
    assert!(matches!(op1.commit(), Outcome::Ok));

    // a second operation over the same fingerprint fails its commit.
    let mut op2 = AtomicOperation::new(&store);
    op2.add(key.clone(), value.clone(), Identifier(1)).unwrap();
    assert!(matches!(op2.commit(), Outcome::Conflict));

    op1.finish().unwrap();

    // retrying after the triple landed conflicts on the expectation.
    let mut op3 = AtomicOperation::new(&store);
    op3.add(key.clone(), value.clone(), Identifier(1)).unwrap();
    assert!(matches!(op3.commit(), Outcome::Conflict));

    // distinct fingerprints never contend.
    let mut op4 = AtomicOperation::new(&store);
    op4.add(key.clone(), value.clone(), Identifier(2)).unwrap();
    assert!(matches!(op4.commit(), Outcome::Ok));
    op4.finish().unwrap();

    std::mem::drop(op1);
    std::mem::drop(op2);
    std::mem::drop(op3);
    std::mem::drop(op4);
    store.close().unwrap();
}

#[test]
fn test_remove_expectation() {
    let store = open_store("expectation");
    let (key, value) = (Text::from_str("name"), Value::from("jeff"));

    // removing an absent triple is a conflict.
    {
        let mut op = AtomicOperation::new(&store);
        op.remove(key.clone(), value.clone(), Identifier(1)).unwrap();
        assert!(matches!(op.commit(), Outcome::Conflict));
        assert!(store.locks().is_empty());
    }

    store.add("name", value.clone(), Identifier(1)).unwrap();
    {
        let mut op = AtomicOperation::new(&store);
        op.remove(key.clone(), value.clone(), Identifier(1)).unwrap();
        assert!(matches!(op.commit(), Outcome::Ok));
        op.finish().unwrap();
    }
    assert!(!store.verify(&key, &value, Identifier(1), NOW).unwrap());

    store.close().unwrap();
}

#[test]
fn test_drop_and_abort_release_locks() {
    let store = open_store("release");
    let (key, value) = (Text::from_str("name"), Value::from("jeff"));

    {
        let mut op = AtomicOperation::new(&store);
        op.add(key.clone(), value.clone(), Identifier(1)).unwrap();
        assert!(matches!(op.commit(), Outcome::Ok));
        assert_eq!(store.locks().len(), 1);
        // dropped without finish.
    }
    assert!(store.locks().is_empty());

    let mut op = AtomicOperation::new(&store);
    op.add(key.clone(), value.clone(), Identifier(1)).unwrap();
    assert!(matches!(op.commit(), Outcome::Ok));
    op.abort();
    assert!(store.locks().is_empty());
    assert!(op.finish().is_err()); // aborted operations cannot finish
    std::mem::drop(op);

    // nothing was ever applied.
    assert!(!store.verify(&key, &value, Identifier(1), NOW).unwrap());

    store.close().unwrap();
}

#[test]
fn test_staged_mixed_operation() {
    let store = open_store("mixed");

    store.add("status", Value::from("active"), Identifier(5)).unwrap();

    // one atomic swap: retract the old status, assert the new one.
    let mut op = AtomicOperation::new(&store);
    op.remove(Text::from_str("status"), Value::from("active"), Identifier(5)).unwrap();
    op.add(Text::from_str("status"), Value::from("retired"), Identifier(5)).unwrap();
    assert!(matches!(op.commit(), Outcome::Ok));
    op.finish().unwrap();
    std::mem::drop(op);

    let values = store
        .select_key(&Text::from_str("status"), Identifier(5), NOW)
        .unwrap();
    assert_eq!(values, [Value::from("retired")].iter().cloned().collect());

    store.close().unwrap();
}
