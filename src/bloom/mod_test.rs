use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;
use crate::db::{Composite, Identifier, Text, Value};

fn temp_location(name: &str) -> ffi::OsString {
    let mut loc = std::env::temp_dir();
    loc.push("plinth-bloom-test");
    loc.push(name);
    loc.into_os_string()
}

#[test]
fn test_sizing() {
    // guava's reference values for n=500_000, fpp=3%.
    let bits = num_bits(500_000, 0.03);
    assert!((3_649_000..3_650_500).contains(&bits), "{}", bits);
    assert_eq!(num_hashes(500_000, bits), 5);

    assert!(num_bits(1, 0.5) >= 64);
    assert!(num_hashes(1_000_000, 64) >= 1);
}

#[test]
fn test_put_then_contains() {
    let location = temp_location("put-contains.blm");
    let filter = LoggingBloomFilter::create(&location, 10_000, 0.01).unwrap();

    assert!(filter.put(b"name:jeff:1").unwrap());
    assert!(filter.might_contain(b"name:jeff:1").unwrap());
    // a second put of the same bytes sets nothing new.
    assert!(!filter.put(b"name:jeff:1").unwrap());

    filter.purge().unwrap();
}

#[test]
fn test_persistence_across_reopen() {
    let seed: u64 = random();
    println!("test_persistence_across_reopen seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let location = temp_location("persistence.blm");
    let filter = LoggingBloomFilter::create(&location, 10_000, 0.01).unwrap();

    let mut fingerprints = vec![];
    for i in 0..1000_u64 {
        let composite = Composite::of3(
            &Identifier(i),
            &Text::from_str("name"),
            &Value::I64(rng.gen()),
        )
        .unwrap();
        fingerprints.push(composite.to_bytes());
    }

    for bytes in fingerprints.iter() {
        filter.put(bytes).unwrap();
    }
    let appended = filter.disk_sync().unwrap();
    assert!(appended > 0);
    assert_eq!(filter.disk_sync().unwrap(), 0); // drained
    let disk_size = filter.to_disk_size();
    assert_eq!(disk_size % 4, 0);

    std::mem::drop(filter);

    let filter = LoggingBloomFilter::open(&location, 10_000, 0.01).unwrap();
    assert_eq!(filter.to_disk_size(), disk_size);
    for bytes in fingerprints.iter() {
        assert!(filter.might_contain(bytes).unwrap());
    }

    // unrelated fingerprints mostly miss; fpp=1% over 1000 probes
    // leaves generous slack at 5%.
    let mut false_positives = 0;
    for i in 0..1000_u64 {
        let composite =
            Composite::of2(&Text::from_str("other"), &Identifier(i)).unwrap();
        if filter.might_contain(&composite.to_bytes()).unwrap() {
            false_positives += 1;
        }
    }
    assert!(false_positives < 50, "false_positives {}", false_positives);

    filter.purge().unwrap();
}

#[test]
fn test_reopen_tolerates_trailing_partial() {
    let location = temp_location("partial.blm");
    let filter = LoggingBloomFilter::create(&location, 1000, 0.03).unwrap();
    filter.put(b"alpha").unwrap();
    filter.put(b"beta").unwrap();
    filter.disk_sync().unwrap();
    std::mem::drop(filter);

    // crash mid-append: a torn trailing record.
    {
        let mut fd = util::open_file_a(&location).unwrap();
        util::sync_write(&mut fd, &[0x01, 0x02]).unwrap();
    }

    let filter = LoggingBloomFilter::open(&location, 1000, 0.03).unwrap();
    assert!(filter.might_contain(b"alpha").unwrap());
    assert!(filter.might_contain(b"beta").unwrap());

    filter.purge().unwrap();
}
