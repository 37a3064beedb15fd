// src/gallery/shuffle.rs
use rand::seq::SliceRandom;
use rand::Rng;

/// Uniform in-place shuffle (Fisher–Yates via `SliceRandom`).
pub fn shuffle_with<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    items.shuffle(rng);
}

/// Shuffle with the thread-local generator.
pub fn shuffle<T>(items: &mut [T]) {
    shuffle_with(items, &mut rand::rng());
}
