//! Usage-ranked eviction
//!
//! Bounds the in-process index by removing the least-used entries when the
//! configured capacity is exceeded. Favors cheap memory reclamation over
//! strict LRU precision: ranking uses cumulative usage counts, ids with no
//! usage record rank lowest, and ties fall back to insertion order. The
//! durable tier is untouched, so an evicted id can repopulate memory on its
//! next read.

use std::collections::HashMap;

/// Eviction policy configuration
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    /// Capacity of the in-process id index
    pub max_size: usize,
    /// Fraction of cached ids removed per pass, rounded up
    pub fraction: f64,
}

impl EvictionPolicy {
    pub fn new(max_size: usize, fraction: f64) -> Self {
        Self { max_size, fraction }
    }

    /// Whether a pass should run for an index of `len` entries
    pub fn over_capacity(&self, len: usize) -> bool {
        len > self.max_size
    }

    /// Number of ids one pass removes from an index of `len` entries
    pub fn pass_size(&self, len: usize) -> usize {
        (len as f64 * self.fraction).ceil() as usize
    }

    /// Select the ids to evict
    ///
    /// `population` pairs each cached id with its insertion sequence number;
    /// `counts` holds cumulative usage (missing ids count as zero). Returns
    /// the bottom `pass_size` ids, lowest usage first, ties broken by
    /// insertion order.
    pub fn victims(&self, population: &[(String, u64)], counts: &HashMap<String, u64>) -> Vec<String> {
        if !self.over_capacity(population.len()) {
            return Vec::new();
        }

        let mut ranked: Vec<(&String, u64, u64)> = population
            .iter()
            .map(|(id, seq)| (id, counts.get(id).copied().unwrap_or(0), *seq))
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)));

        ranked
            .into_iter()
            .take(self.pass_size(population.len()))
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
