//! Owned per-output handles
//!
//! Every mounted layer lives here under the stable name of its output, so
//! the host never keeps a handle anywhere else. Teardown is `remove` plus
//! dropping the value.

use crate::error::AnimError;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct SurfaceRegistry<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for SurfaceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SurfaceRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Store `value` under `id`. An id can only be populated once.
    pub fn register(&mut self, id: impl Into<String>, value: T) -> Result<&mut T, AnimError> {
        use std::collections::btree_map::Entry;
        match self.entries.entry(id.into()) {
            Entry::Occupied(e) => Err(AnimError::DuplicateSurface { id: e.key().clone() }),
            Entry::Vacant(e) => Ok(e.insert(value)),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.entries.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.entries.remove(id)
    }

    /// First entry matching `pred`, with its id
    pub fn find_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<(&str, &mut T)> {
        self.entries
            .iter_mut()
            .find(|(_, v)| pred(v))
            .map(|(k, v)| (k.as_str(), v))
    }

    #[cfg(test)]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, in id order
    pub fn drain(&mut self) -> Vec<(String, T)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}
