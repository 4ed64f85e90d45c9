//! Desired or observed partitioning of one GPU
//!
//! A [`MigConfig`] maps each partition shape to the number of partitions of
//! that shape that should (or do) exist on a GPU. It is a multiset: two
//! configs are equal when they hold the same shapes with the same non-zero
//! counts, regardless of insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::MigProfile;

/// A multiset of partition shapes on one GPU
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigConfig(BTreeMap<MigProfile, usize>);

impl MigConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion
    pub fn with(mut self, profile: MigProfile, count: usize) -> Self {
        self.set(profile, count);
        self
    }

    /// Set the count for a shape, replacing any previous count
    pub fn set(&mut self, profile: MigProfile, count: usize) {
        self.0.insert(profile, count);
    }

    /// Add `n` partitions of a shape to the config
    pub fn add(&mut self, profile: MigProfile, n: usize) {
        *self.0.entry(profile).or_insert(0) += n;
    }

    /// Number of partitions of a shape
    pub fn count(&self, profile: &MigProfile) -> usize {
        self.0.get(profile).copied().unwrap_or(0)
    }

    /// Total number of partitions across all shapes
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Shapes with a non-zero count, with their counts
    pub fn iter(&self) -> impl Iterator<Item = (&MigProfile, usize)> {
        self.0.iter().filter(|(_, &c)| c > 0).map(|(p, &c)| (p, c))
    }

    /// The config as an ordered sequence of shapes, each repeated by its
    /// count.
    ///
    /// Order within the sequence carries no meaning (the reconciler searches
    /// over permutations) but is deterministic for a given config: larger GPU
    /// instances first, then larger compute instances, then smaller memory.
    pub fn flatten(&self) -> Vec<MigProfile> {
        let mut shapes: Vec<(&MigProfile, usize)> = self.iter().collect();
        shapes.sort_by(|(a, _), (b, _)| {
            b.gi_slices
                .cmp(&a.gi_slices)
                .then(b.ci_slices.cmp(&a.ci_slices))
                .then(a.memory_mb.cmp(&b.memory_mb))
        });

        let mut flat = Vec::with_capacity(self.total());
        for (profile, count) in shapes {
            flat.extend(std::iter::repeat(*profile).take(count));
        }
        flat
    }
}

impl PartialEq for MigConfig {
    /// Multiset equality: zero-count entries do not distinguish configs
    fn eq(&self, other: &Self) -> bool {
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x == y => continue,
                _ => return false,
            }
        }
    }
}

impl Eq for MigConfig {}

impl FromIterator<(MigProfile, usize)> for MigConfig {
    fn from_iter<I: IntoIterator<Item = (MigProfile, usize)>>(iter: I) -> Self {
        let mut config = MigConfig::new();
        for (profile, count) in iter {
            config.add(profile, count);
        }
        config
    }
}
