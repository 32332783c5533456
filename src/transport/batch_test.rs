use std::sync::Arc;

use super::*;
use crate::{
    buffer::{BatchTransportable, Buffer},
    clock::TimeSource,
    db::{Action, Identifier, Text, Value},
    store::{Database, NOW},
    Durability,
};

#[test]
fn test_batch_transporter_drains_in_ordinal_order() {
    let dir = {
        let mut dir = std::env::temp_dir();
        dir.push("plinth-batch-test");
        dir.push("drain");
        std::fs::remove_dir_all(&dir).ok();
        dir
    };
    let time = TimeSource::new_local();
    let buffer = Buffer::open(
        dir.join("buffer").as_os_str(),
        1024,
        Durability::Batched,
        time,
    )
    .unwrap();
    let database = Arc::new(Database::open(&crate::Config::new(dir.as_os_str())).unwrap());

    let mut writes = vec![];
    for i in 0..120_u64 {
        writes.push(
            buffer
                .insert(
                    Text::from_str("bio"),
                    Value::from(format!("storage engineer {}", i).as_str()),
                    Identifier(i),
                    Action::Add,
                )
                .unwrap(),
        );
    }
    let n_pages = buffer.len_sealed_pages();
    assert!(n_pages > 1);

    let transporter = BatchTransporter::new(Arc::clone(&database));
    let n_batches = transporter.drain(&buffer).unwrap();
    assert_eq!(n_batches, n_pages);
    assert!(buffer.next_batch().unwrap().is_none());

    // merged segments sit before seg0, in ordinal (= version) order.
    {
        let guard = database.storage().lock().read();
        assert_eq!(guard.len(), n_batches + 1);
        assert!(guard.last().unwrap().is_mutable());
        for pair in guard[..guard.len() - 1].windows(2) {
            assert!(pair[0].to_version_range().0 < pair[1].to_version_range().0);
            assert!(!pair[0].is_mutable());
        }
    }

    // every transported write answers through the database, including
    // its corpus derivation.
    let write = &writes[0];
    assert!(database
        .verify(&write.key, &write.value, write.record, NOW)
        .unwrap());
    assert!(database
        .search(&Text::from_str("bio"), "storage", NOW)
        .unwrap()
        .contains(&Identifier(0)));
}
