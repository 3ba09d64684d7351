//! Grouped aggregation over ordered maps
//!
//! Every engine is some form of group-by-key then reduce. Keys live in a
//! `BTreeMap` so output order is deterministic (ascending key) regardless
//! of input order.

use std::collections::BTreeMap;

/// Fold `items` into one accumulator per key
///
/// Items for which `key` returns `None` are skipped.
pub fn group_fold<T, K, A, F, G>(items: impl IntoIterator<Item = T>, key: F, mut fold: G) -> BTreeMap<K, A>
where
    K: Ord,
    A: Default,
    F: Fn(&T) -> Option<K>,
    G: FnMut(&mut A, T),
{
    let mut groups: BTreeMap<K, A> = BTreeMap::new();
    for item in items {
        if let Some(k) = key(&item) {
            fold(groups.entry(k).or_default(), item);
        }
    }
    groups
}

/// Sum of `value` per key
pub fn group_sum<T, K>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> Option<K>,
    value: impl Fn(&T) -> f64,
) -> BTreeMap<K, f64>
where
    K: Ord,
{
    group_fold(items, key, |acc: &mut f64, item| *acc += value(&item))
}

/// Running numeric statistics for one group
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericStats {
    min: f64,
    max: f64,
    sum: f64,
    count: usize,
}

impl NumericStats {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn avg(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }
}

/// `numerator / denominator` when the denominator is strictly positive
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        let r = numerator / denominator;
        r.is_finite().then_some(r)
    } else {
        None
    }
}
