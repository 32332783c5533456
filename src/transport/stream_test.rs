use std::{sync::Arc, thread, time};

use super::*;
use crate::{
    buffer::Buffer,
    clock::TimeSource,
    db::{Action, Identifier, Text, Value},
    store::{Database, NOW},
    Durability,
};

#[test]
fn test_streaming_transporter_drains() {
    let dir = {
        let mut dir = std::env::temp_dir();
        dir.push("plinth-stream-test");
        dir.push("drains");
        std::fs::remove_dir_all(&dir).ok();
        dir
    };
    let time = TimeSource::new_local();
    let buffer = Arc::new(
        Buffer::open(
            dir.join("buffer").as_os_str(),
            1024,
            Durability::Batched,
            time.clone(),
        )
        .unwrap(),
    );
    let database = Arc::new(Database::open(&crate::Config::new(dir.as_os_str())).unwrap());

    let transporter =
        StreamingTransporter::start(Arc::clone(&buffer), Arc::clone(&database), time).unwrap();

    let mut writes = vec![];
    for i in 0..200_u64 {
        writes.push(
            buffer
                .insert(
                    Text::from_str("name"),
                    Value::from("someone"),
                    Identifier(i),
                    Action::Add,
                )
                .unwrap(),
        );
    }
    assert!(buffer.len_sealed_pages() > 0);

    // the loop drains every sealed page without being prodded.
    let deadline = time::Instant::now() + time::Duration::from_secs(30);
    while buffer.len_sealed_pages() > 0 {
        assert!(time::Instant::now() < deadline, "transporter stalled");
        thread::sleep(time::Duration::from_millis(50));
    }

    // transported writes answer through the database alone.
    let write = &writes[0];
    assert!(database
        .verify(&write.key, &write.value, write.record, NOW)
        .unwrap());

    // productive cycles sped the cadence up from MAX_SLEEP.
    assert!(transporter.to_sleep_ms() < MAX_SLEEP_MS || buffer.len_sealed_pages() == 0);
    assert!(!transporter.has_ever_appeared_hung());

    buffer.close().unwrap();
    transporter.close().unwrap();
}

#[test]
fn test_transporter_close_while_parked() {
    let dir = {
        let mut dir = std::env::temp_dir();
        dir.push("plinth-stream-test");
        dir.push("parked");
        std::fs::remove_dir_all(&dir).ok();
        dir
    };
    let time = TimeSource::new_local();
    let buffer = Arc::new(
        Buffer::open(
            dir.join("buffer").as_os_str(),
            1 << 20,
            Durability::Os,
            time.clone(),
        )
        .unwrap(),
    );
    let database = Arc::new(Database::open(&crate::Config::new(dir.as_os_str())).unwrap());

    let transporter =
        StreamingTransporter::start(Arc::clone(&buffer), database, time).unwrap();

    // nothing to transport; closing the buffer wakes any parked loop
    // and close() joins promptly.
    thread::sleep(time::Duration::from_millis(100));
    buffer.close().unwrap();
    transporter.close().unwrap();
}
