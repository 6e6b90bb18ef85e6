//! Dependency index: which keys must go when a given key is invalidated.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct DependencyIndex {
    /// dependency key -> dependent keys
    dependents: Mutex<HashMap<String, HashSet<String>>>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` depends on each of `dependencies`.
    pub fn register(&self, key: &str, dependencies: &[String]) {
        if dependencies.is_empty() {
            return;
        }
        if let Ok(mut index) = self.dependents.lock() {
            for dependency in dependencies {
                index
                    .entry(dependency.clone())
                    .or_default()
                    .insert(key.to_string());
            }
        }
    }

    /// Remove and return the dependents of every key in `invalidated`.
    ///
    /// Keys that are themselves in `invalidated` are left out.
    pub fn take_dependents<'a, I>(&self, invalidated: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let Ok(mut index) = self.dependents.lock() else {
            return Vec::new();
        };
        let invalidated: HashSet<&String> = invalidated.into_iter().collect();
        let mut dependents = BTreeSet::new();
        for key in &invalidated {
            if let Some(keys) = index.remove(*key) {
                dependents.extend(keys);
            }
        }
        dependents
            .into_iter()
            .filter(|key| !invalidated.contains(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.dependents.lock().map(|index| index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut index) = self.dependents.lock() {
            index.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_take() {
        let index = DependencyIndex::new();
        index.register("page:1", &["user:1".to_string(), "theme".to_string()]);
        index.register("page:2", &["user:1".to_string()]);

        let dependents = index.take_dependents(&["user:1".to_string()]);
        assert_eq!(dependents, vec!["page:1".to_string(), "page:2".to_string()]);

        // Taken once only
        assert!(index.take_dependents(&["user:1".to_string()]).is_empty());
        assert_eq!(
            index.take_dependents(&["theme".to_string()]),
            vec!["page:1".to_string()]
        );
    }

    #[test]
    fn test_invalidated_keys_are_not_returned() {
        let index = DependencyIndex::new();
        index.register("b", &["a".to_string()]);
        let invalidated = vec!["a".to_string(), "b".to_string()];
        assert!(index.take_dependents(&invalidated).is_empty());
    }

    #[test]
    fn test_empty_dependencies_ignored() {
        let index = DependencyIndex::new();
        index.register("k", &[]);
        assert!(index.is_empty());
    }
}
