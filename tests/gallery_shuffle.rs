// tests/gallery_shuffle.rs
//
// Shuffle must be a permutation and uniform over all orderings.

use std::collections::HashMap;

use gallery_resolver::gallery::shuffle::{shuffle, shuffle_with};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn shuffle_is_a_permutation() {
    let mut v: Vec<u32> = (0..100).collect();
    shuffle(&mut v);
    let mut sorted = v.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..100).collect::<Vec<_>>());
}

#[test]
fn all_orderings_are_equally_likely() {
    let mut rng = StdRng::seed_from_u64(42);
    let trials = 60_000;
    let mut counts: HashMap<[u8; 3], usize> = HashMap::new();

    for _ in 0..trials {
        let mut v = [0u8, 1, 2];
        shuffle_with(&mut v, &mut rng);
        *counts.entry(v).or_default() += 1;
    }

    assert_eq!(counts.len(), 6);
    let expected = trials as f64 / 6.0;
    let chi2: f64 = counts
        .values()
        .map(|&c| {
            let d = c as f64 - expected;
            d * d / expected
        })
        .sum();
    // 5 degrees of freedom; 20.5 is the 0.1% critical value
    assert!(chi2 < 20.5, "chi-square too large: {chi2} ({counts:?})");
}
