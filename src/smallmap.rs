//! A linear-scan map for small collections (rule tables, pool tables).
//!
//! Manifests rarely define more than a handful of pools or rules per scope,
//! so a `Vec<(K, V)>` scanned linearly beats a hash map in practice and
//! keeps insertion order, which default-target and diagnostic output rely
//! on.

#[derive(Debug, Clone, Default)]
pub struct SmallMap<K, V> {
    entries: Vec<(K, V)>,
}

impl<K: PartialEq, V> SmallMap<K, V> {
    pub fn new() -> Self {
        SmallMap {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        SmallMap {
            entries: Vec::with_capacity(cap),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: K, val: V) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = val,
            None => self.entries.push((key, val)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, V)> {
        self.entries.iter()
    }
}

impl<K, V> IntoIterator for SmallMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
