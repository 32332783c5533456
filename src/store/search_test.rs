use super::*;
use crate::db::Identifier;

#[test]
fn test_boyer_moore() {
    let matcher = BoyerMoore::new("eff");
    assert!(matcher.is_substring_of("jeff"));
    assert!(matcher.is_substring_of("jeffery"));
    assert!(matcher.is_substring_of("eff"));
    assert!(!matcher.is_substring_of("ef"));
    assert!(!matcher.is_substring_of("fee"));
    assert!(!matcher.is_substring_of(""));

    assert!(BoyerMoore::new("").is_substring_of("anything"));
    assert!(BoyerMoore::new("aaa").is_substring_of("aaaa"));
    assert!(!BoyerMoore::new("aaa").is_substring_of("aabaab"));
}

fn postings(
    entries: &[(&str, u64, u32)],
) -> BTreeMap<Text, BTreeSet<Position>> {
    let mut map: BTreeMap<Text, BTreeSet<Position>> = BTreeMap::new();
    for (word, record, index) in entries.iter() {
        map.entry(Text::from_str(word))
            .or_insert_with(BTreeSet::new)
            .insert(Position::new(Identifier(*record), *index));
    }
    map
}

fn ids(records: &[u64]) -> BTreeSet<Identifier> {
    records.iter().map(|r| Identifier(*r)).collect()
}

#[test]
fn test_single_token_prefix_and_infix() {
    let postings = postings(&[
        ("jeff", 1, 0),
        ("jeffery", 2, 0),
        ("geoff", 3, 0),
        ("mcjefferson", 4, 2),
    ]);

    assert_eq!(matching_records(&postings, "jeff"), ids(&[1, 2, 4]));
    assert_eq!(matching_records(&postings, "eff"), ids(&[1, 2, 3, 4]));
    assert_eq!(matching_records(&postings, "zzz"), ids(&[]));
    assert_eq!(matching_records(&postings, "  "), ids(&[]));
}

#[test]
fn test_multi_token_adjacency() {
    // record 1: "senior storage engineer"; record 2: "storage senior".
    let postings = postings(&[
        ("senior", 1, 0),
        ("storage", 1, 1),
        ("engineer", 1, 2),
        ("storage", 2, 0),
        ("senior", 2, 1),
    ]);

    assert_eq!(matching_records(&postings, "senior storage"), ids(&[1]));
    assert_eq!(matching_records(&postings, "storage senior"), ids(&[2]));
    assert_eq!(matching_records(&postings, "senior engineer"), ids(&[]));
    assert_eq!(
        matching_records(&postings, "senior storage engineer"),
        ids(&[1])
    );

    // tokens match by substring at each position.
    assert_eq!(matching_records(&postings, "sen stor"), ids(&[1]));
}
