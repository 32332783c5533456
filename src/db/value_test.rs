use arbitrary::{Arbitrary, Unstructured};
use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_value_roundtrip() {
    let values = vec![
        Value::Bool(true),
        Value::Bool(false),
        Value::I32(-5),
        Value::I64(1 << 40),
        Value::F32(1.5),
        Value::F64(-0.25),
        Value::Link(Identifier(99)),
        Value::from("jeff"),
        Value::from(""),
    ];

    for value in values.into_iter() {
        let mut buf = vec![];
        let n = value.encode(&mut buf).unwrap();
        assert_eq!(n, buf.len());
        let (out, m) = Value::decode(&buf).unwrap();
        assert_eq!(out, value);
        assert_eq!(m, n);
    }
}

#[test]
fn test_value_roundtrip_fuzz() {
    let seed: u64 = random();
    println!("test_value_roundtrip_fuzz seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _i in 0..1000 {
        let value: Value = {
            let bytes = rng.gen::<[u8; 32]>();
            let mut uns = Unstructured::new(&bytes);
            uns.arbitrary().unwrap()
        };
        let mut buf = vec![];
        value.encode(&mut buf).unwrap();
        let (out, _) = Value::decode(&buf).unwrap();
        assert_eq!(out, value);
    }
}

#[test]
fn test_value_sentinels() {
    let values = vec![
        Value::Bool(false),
        Value::I64(i64::MIN),
        Value::F64(f64::NEG_INFINITY),
        Value::from("zzz"),
        Value::Link(Identifier(u64::MAX)),
    ];

    for value in values.iter() {
        assert!(Value::NegInfinity < *value, "{}", value);
        assert!(Value::PosInfinity > *value, "{}", value);
    }
    assert!(Value::NegInfinity < Value::PosInfinity);

    let mut buf = vec![];
    assert!(Value::NegInfinity.encode(&mut buf).is_err());
    assert!(Value::PosInfinity.encode(&mut buf).is_err());
}

#[test]
fn test_value_weak_typing() {
    // numeric pairs compare numerically, across types.
    assert!(Value::I32(2) < Value::I64(10));
    assert!(Value::F64(2.5) < Value::I32(3));
    assert!(Value::I64(-1) < Value::F32(0.0));

    // mixed pairs compare by string form: "10" < "9".
    assert!(Value::from("10") < Value::I32(9));
    assert!(Value::from("jeff") > Value::I32(9));

    // equal numerics of different types stay distinct but adjacent.
    let a = Value::I32(1);
    let b = Value::I64(1);
    assert_ne!(a, b);
    assert_eq!(a.cmp(&b), std::cmp::Ordering::Less);
    assert_eq!(b.cmp(&a), std::cmp::Ordering::Greater);
}

#[test]
fn test_value_numeric_order() {
    let seed: u64 = random();
    println!("test_value_numeric_order seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut values = vec![Value::NegInfinity, Value::PosInfinity];
    for _i in 0..100 {
        values.push(match rng.gen::<u8>() % 4 {
            0 => Value::I32(rng.gen()),
            1 => Value::I64(rng.gen::<i32>() as i64),
            2 => Value::F32(rng.gen::<i16>() as f32),
            _ => Value::F64(rng.gen::<i32>() as f64),
        });
    }

    values.sort();
    assert_eq!(values.first(), Some(&Value::NegInfinity));
    assert_eq!(values.last(), Some(&Value::PosInfinity));
    for pair in values.windows(2).skip(1).take(values.len() - 3) {
        assert!(pair[0].is_numeric() && pair[1].is_numeric());
        assert!(pair[0] <= pair[1]);
    }
}
