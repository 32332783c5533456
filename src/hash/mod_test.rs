use std::hash::{BuildHasher, Hash, Hasher};

use super::*;

#[test]
fn test_city_hasher() {
    let mut hasher1 = CityHasher::new().build_hasher();
    "hello world".hash(&mut hasher1);
    let digest1 = hasher1.finish();

    let mut hasher2 = CityHasher::new().build_hasher();
    "hello world".hash(&mut hasher2);
    assert_eq!(digest1, hasher2.finish());

    let mut hasher3 = CityHasher::new().build_hasher();
    "hello worle".hash(&mut hasher3);
    assert_ne!(digest1, hasher3.finish());
}

#[test]
fn test_murmur3_128() {
    let a = murmur3_128(b"name:jeff:1").unwrap();
    let b = murmur3_128(b"name:jeff:1").unwrap();
    let c = murmur3_128(b"name:jeff:2").unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(murmur3_128(b"").unwrap(), murmur3_128(b" ").unwrap());
}
